//! Package spec parsing and package-name handling.
//!
//! Parses specifications like:
//! - `left-pad`
//! - `left-pad@1.3.0`
//! - `left-pad@next`
//! - `@types/node`
//! - `@types/node@20.0.0`
//!
//! Names end up as directory and file names, so they are validated before
//! anything touches the filesystem.

use super::error::PkgError;
use std::fmt;

/// What the caller asked for beyond the package name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionHint {
    /// A concrete version (`1.3.0`).
    Exact(String),
    /// A dist-tag (`latest`, `next`).
    Tag(String),
}

impl VersionHint {
    /// Classify a specifier: anything that parses as a semver version is exact,
    /// everything else is treated as a dist-tag.
    #[must_use]
    pub fn classify(spec: &str) -> Self {
        let spec = spec.trim();
        let bare = spec.strip_prefix('v').unwrap_or(spec);
        if semver::Version::parse(bare).is_ok() {
            Self::Exact(bare.to_string())
        } else {
            Self::Tag(spec.to_string())
        }
    }

    /// The raw specifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Exact(v) | Self::Tag(v) => v,
        }
    }
}

impl fmt::Display for VersionHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed package specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    /// Full package name (e.g., "@scope/name" or "name").
    pub name: String,
    /// Requested version or tag (None means the default dist-tag).
    pub version: Option<VersionHint>,
}

impl PackageSpec {
    /// Parse a package specification string.
    ///
    /// # Errors
    /// Returns an error if the spec is invalid.
    pub fn parse(input: &str) -> Result<Self, PkgError> {
        let input = input.trim();

        if input.is_empty() {
            return Err(PkgError::spec_invalid("Empty package spec"));
        }

        // For scoped names the version delimiter is the first '@' after the scope
        let search_from = usize::from(input.starts_with('@'));
        let (name, version) = match input[search_from..].find('@') {
            Some(pos) => {
                let at = search_from + pos;
                let version = &input[at + 1..];
                if version.is_empty() {
                    return Err(PkgError::spec_invalid(format!(
                        "Invalid package spec: empty version in '{input}'"
                    )));
                }
                (&input[..at], Some(VersionHint::classify(version)))
            }
            None => (input, None),
        };

        validate_name(name)?;

        Ok(Self {
            name: name.to_string(),
            version,
        })
    }
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}@{v}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Validate a package name (scoped or unscoped).
///
/// # Errors
/// Returns an error if the name is empty, malformed, or could escape the
/// module directory when used as a path.
pub fn validate_name(name: &str) -> Result<(), PkgError> {
    if name.is_empty() {
        return Err(PkgError::spec_invalid("Empty package name"));
    }

    if let Some(rest) = name.strip_prefix('@') {
        let Some((scope, pkg)) = rest.split_once('/') else {
            return Err(PkgError::spec_invalid(format!(
                "Invalid scoped package: missing '/' in '{name}'"
            )));
        };
        if scope.is_empty() {
            return Err(PkgError::spec_invalid(format!(
                "Invalid scoped package: empty scope in '{name}'"
            )));
        }
        if pkg.is_empty() {
            return Err(PkgError::spec_invalid(format!(
                "Invalid scoped package: empty name in '{name}'"
            )));
        }
        validate_segment(scope, name)?;
        validate_segment(pkg, name)
    } else {
        validate_segment(name, name)
    }
}

fn validate_segment(segment: &str, full: &str) -> Result<(), PkgError> {
    if segment.starts_with('.') {
        return Err(PkgError::spec_invalid(format!(
            "Package name '{full}' must not start with '.'"
        )));
    }

    for c in segment.chars() {
        if !c.is_alphanumeric() && c != '-' && c != '_' && c != '.' {
            return Err(PkgError::spec_invalid(format!(
                "Invalid character '{c}' in package name '{full}'"
            )));
        }
    }

    Ok(())
}

/// Get the unscoped portion of a name: `@scope/name` -> `name`.
#[must_use]
pub fn unscoped_name(name: &str) -> &str {
    if name.starts_with('@') {
        name.split_once('/').map_or(name, |(_, pkg)| pkg)
    } else {
        name
    }
}

/// Encode a name for use in a registry URL path or a flat file name.
///
/// For scoped packages, encodes the `/` as `%2F`.
#[must_use]
pub fn encoded_name(name: &str) -> String {
    name.replace('/', "%2F")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let spec = PackageSpec::parse("left-pad").unwrap();
        assert_eq!(spec.name, "left-pad");
        assert_eq!(spec.version, None);
    }

    #[test]
    fn test_parse_with_version() {
        let spec = PackageSpec::parse("left-pad@1.3.0").unwrap();
        assert_eq!(spec.name, "left-pad");
        assert_eq!(spec.version, Some(VersionHint::Exact("1.3.0".to_string())));
    }

    #[test]
    fn test_parse_with_tag() {
        let spec = PackageSpec::parse("react@next").unwrap();
        assert_eq!(spec.name, "react");
        assert_eq!(spec.version, Some(VersionHint::Tag("next".to_string())));
    }

    #[test]
    fn test_parse_scoped() {
        let spec = PackageSpec::parse("@types/node").unwrap();
        assert_eq!(spec.name, "@types/node");
        assert_eq!(spec.version, None);
    }

    #[test]
    fn test_parse_scoped_with_version() {
        let spec = PackageSpec::parse("@types/node@20.0.0").unwrap();
        assert_eq!(spec.name, "@types/node");
        assert_eq!(spec.version, Some(VersionHint::Exact("20.0.0".to_string())));
        assert_eq!(spec.to_string(), "@types/node@20.0.0");
    }

    #[test]
    fn test_parse_empty_fails() {
        assert!(PackageSpec::parse("").is_err());
        assert!(PackageSpec::parse("   ").is_err());
    }

    #[test]
    fn test_parse_scope_only_fails() {
        assert!(PackageSpec::parse("@").is_err());
        assert!(PackageSpec::parse("@scope").is_err());
        assert!(PackageSpec::parse("@scope/").is_err());
        assert!(PackageSpec::parse("@/pkg").is_err());
    }

    #[test]
    fn test_parse_empty_version_fails() {
        assert!(PackageSpec::parse("react@").is_err());
        assert!(PackageSpec::parse("@types/node@").is_err());
    }

    #[test]
    fn test_rejects_path_like_names() {
        assert!(validate_name("..").is_err());
        assert!(validate_name(".hidden").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("@scope/..").is_err());
        assert!(validate_name("@scope/a/b").is_err());
        assert!(validate_name("has space").is_err());
    }

    #[test]
    fn test_classify_version_hint() {
        assert_eq!(
            VersionHint::classify("1.3.0"),
            VersionHint::Exact("1.3.0".to_string())
        );
        assert_eq!(
            VersionHint::classify("v2.0.0-beta.1"),
            VersionHint::Exact("2.0.0-beta.1".to_string())
        );
        assert_eq!(
            VersionHint::classify("latest"),
            VersionHint::Tag("latest".to_string())
        );
        // Ranges are not versions; they fall through to tag lookup and fail there
        assert_eq!(
            VersionHint::classify("^1.0.0"),
            VersionHint::Tag("^1.0.0".to_string())
        );
    }

    #[test]
    fn test_unscoped_name() {
        assert_eq!(unscoped_name("react"), "react");
        assert_eq!(unscoped_name("@types/node"), "node");
    }

    #[test]
    fn test_encoded_name() {
        assert_eq!(encoded_name("react"), "react");
        assert_eq!(encoded_name("@types/node"), "@types%2Fnode");
    }
}
