use crate::pkg::manifest::MANIFEST_NAME;
use std::path::{Path, PathBuf};

/// Directory (under the project) that receives installed packages.
pub const MODULES_DIR_NAME: &str = "node_modules";

/// Directory (under the project) used for downloads in flight.
pub const STAGING_DIR_NAME: &str = ".flight";

/// Find the project root by walking up from `cwd` looking for a manifest.
///
/// Returns the first directory containing one, or `None` if none is found.
#[must_use]
pub fn project_root(cwd: &Path) -> Option<PathBuf> {
    let mut current = cwd.to_path_buf();

    loop {
        if current.join(MANIFEST_NAME).is_file() {
            return Some(current);
        }

        if !current.pop() {
            return None;
        }
    }
}

#[must_use]
pub fn manifest_path(project_dir: &Path) -> PathBuf {
    project_dir.join(MANIFEST_NAME)
}

#[must_use]
pub fn modules_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(MODULES_DIR_NAME)
}

#[must_use]
pub fn staging_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(STAGING_DIR_NAME)
}

/// Location of the installed directory for `name` under `modules_dir`.
///
/// Scoped names nest: `@scope/name` -> `<modules>/@scope/name`.
/// The name must already have been validated.
#[must_use]
pub fn module_dir(modules_dir: &Path, name: &str) -> PathBuf {
    match name.split_once('/') {
        Some((scope, pkg)) if name.starts_with('@') => modules_dir.join(scope).join(pkg),
        _ => modules_dir.join(name),
    }
}
