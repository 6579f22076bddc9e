//! Dependency removal.

use super::error::PkgError;
use super::manifest::Manifest;
use super::spec::validate_name;
use crate::config::Config;
use crate::paths::module_dir;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Result of removing one dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UninstallOutcome {
    pub name: String,
    /// The specifier the manifest held.
    pub version: String,
    /// Whether an installed directory was found and removed.
    pub removed_dir: bool,
}

/// Remove `name` from the module directory and from the manifest.
///
/// A missing module directory is not an error; the manifest entry is what
/// decides whether the package is installed.
///
/// # Errors
/// Returns `PKG_NOT_INSTALLED` if the manifest has no such entry, a manifest
/// error if the manifest cannot be loaded or saved, and `PKG_CONFLICT` if the
/// directory cannot be removed. The manifest is untouched on any error.
pub fn uninstall_one(config: &Config, name: &str) -> Result<UninstallOutcome, PkgError> {
    let mut manifest = Manifest::load(&config.manifest_path)?;

    let Some(version) = manifest.get(name).map(str::to_string) else {
        return Err(PkgError::not_installed(name));
    };

    // Hand-edited manifests can hold anything; never build a path from a bad name
    validate_name(name)?;

    let dir = module_dir(&config.modules_dir, name);
    let removed_dir = remove_link_or_dir(&dir)?;

    if let Some(scope_dir) = dir.parent().filter(|p| *p != config.modules_dir) {
        if flight_util::fs::remove_dir_if_empty(scope_dir) {
            debug!(dir = %scope_dir.display(), "Removed empty scope directory");
        }
    }

    manifest.remove(name);
    manifest.save(&config.manifest_path)?;

    info!(name, version = %version, removed_dir, "Uninstalled");

    Ok(UninstallOutcome {
        name: name.to_string(),
        version,
        removed_dir,
    })
}

/// Remove whatever sits at `path`. Symlinks are unlinked, never followed.
///
/// Returns whether anything was there.
fn remove_link_or_dir(path: &Path) -> Result<bool, PkgError> {
    let Ok(metadata) = fs::symlink_metadata(path) else {
        return Ok(false);
    };

    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    result.map_err(|e| {
        PkgError::conflict(format!("Failed to remove {}: {e}", path.display()))
    })?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::error::codes;
    use tempfile::tempdir;

    fn setup(deps: &str) -> (tempfile::TempDir, Config) {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("package.json"),
            format!(r#"{{"name": "app", "version": "1.0.0", "dependencies": {deps}}}"#),
        )
        .unwrap();
        let config = Config::new(dir.path().to_path_buf());
        (dir, config)
    }

    #[test]
    fn test_uninstall_removes_dir_and_entry() {
        let (dir, config) = setup(r#"{"left-pad": "1.3.0", "chalk": "5.0.0"}"#);
        let pkg_dir = dir.path().join("node_modules").join("left-pad");
        fs::create_dir_all(&pkg_dir).unwrap();
        fs::write(pkg_dir.join("index.js"), "module.exports = 1;").unwrap();

        let outcome = uninstall_one(&config, "left-pad").unwrap();

        assert_eq!(outcome.version, "1.3.0");
        assert!(outcome.removed_dir);
        assert!(!pkg_dir.exists());

        let manifest = Manifest::load(&config.manifest_path).unwrap();
        assert!(!manifest.contains("left-pad"));
        assert_eq!(manifest.get("chalk"), Some("5.0.0"));
    }

    #[test]
    fn test_uninstall_preserves_other_fields() {
        let (_dir, config) = setup(r#"{"left-pad": "1.3.0"}"#);

        uninstall_one(&config, "left-pad").unwrap();

        let content = fs::read_to_string(&config.manifest_path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["name"], "app");
        assert_eq!(value["version"], "1.0.0");
        assert_eq!(value["dependencies"], serde_json::json!({}));
    }

    #[test]
    fn test_uninstall_without_dir_still_updates_manifest() {
        let (_dir, config) = setup(r#"{"left-pad": "1.3.0"}"#);

        let outcome = uninstall_one(&config, "left-pad").unwrap();

        assert!(!outcome.removed_dir);
        let manifest = Manifest::load(&config.manifest_path).unwrap();
        assert!(manifest.is_empty());
    }

    #[test]
    fn test_uninstall_unknown_is_not_installed() {
        let (_dir, config) = setup(r#"{"left-pad": "1.3.0"}"#);
        let before = fs::read_to_string(&config.manifest_path).unwrap();

        // A directory on disk that the manifest does not list stays put
        let chalk = config.modules_dir.join("chalk");
        fs::create_dir_all(chalk.join("lib")).unwrap();
        fs::write(chalk.join("index.js"), "module.exports = 'chalk';").unwrap();
        fs::write(chalk.join("lib").join("util.js"), [0u8, 7, 255]).unwrap();
        let left_pad = config.modules_dir.join("left-pad");
        fs::create_dir_all(&left_pad).unwrap();
        fs::write(left_pad.join("index.js"), "module.exports = 'left-pad';").unwrap();

        let err = uninstall_one(&config, "chalk").unwrap_err();

        assert_eq!(err.code(), codes::PKG_NOT_INSTALLED);
        assert_eq!(fs::read_to_string(&config.manifest_path).unwrap(), before);
        assert_eq!(
            fs::read_to_string(chalk.join("index.js")).unwrap(),
            "module.exports = 'chalk';"
        );
        assert_eq!(fs::read(chalk.join("lib").join("util.js")).unwrap(), [0u8, 7, 255]);
        assert_eq!(
            fs::read_to_string(left_pad.join("index.js")).unwrap(),
            "module.exports = 'left-pad';"
        );
        assert_eq!(fs::read_dir(&config.modules_dir).unwrap().count(), 2);
    }

    #[test]
    fn test_uninstall_missing_manifest() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf());

        let err = uninstall_one(&config, "left-pad").unwrap_err();
        assert_eq!(err.code(), codes::PKG_MANIFEST_NOT_FOUND);
    }

    #[test]
    fn test_uninstall_scoped_prunes_empty_scope() {
        let (dir, config) = setup(r#"{"@types/node": "20.0.0", "@types/react": "18.0.0"}"#);
        let scope = dir.path().join("node_modules").join("@types");
        fs::create_dir_all(scope.join("node")).unwrap();
        fs::create_dir_all(scope.join("react")).unwrap();

        uninstall_one(&config, "@types/node").unwrap();
        assert!(scope.join("react").exists());

        uninstall_one(&config, "@types/react").unwrap();
        assert!(!scope.exists());
        assert!(dir.path().join("node_modules").exists());
    }

    #[test]
    fn test_uninstall_rejects_traversal_names() {
        let (dir, config) = setup(r#"{"../outside": "1.0.0"}"#);
        let victim = dir.path().join("outside");
        fs::create_dir_all(&victim).unwrap();

        let err = uninstall_one(&config, "../outside").unwrap_err();

        assert_eq!(err.code(), codes::PKG_SPEC_INVALID);
        assert!(victim.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_uninstall_unlinks_symlink_without_following() {
        let (dir, config) = setup(r#"{"linked": "1.0.0"}"#);
        let target = dir.path().join("target");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("keep.txt"), "keep").unwrap();

        let modules = dir.path().join("node_modules");
        fs::create_dir_all(&modules).unwrap();
        std::os::unix::fs::symlink(&target, modules.join("linked")).unwrap();

        let outcome = uninstall_one(&config, "linked").unwrap();

        assert!(outcome.removed_dir);
        assert!(fs::symlink_metadata(modules.join("linked")).is_err());
        assert!(target.join("keep.txt").exists());
    }
}
