//! Package manager error types.

use std::fmt;
use std::path::Path;

/// Package manager error codes.
pub mod codes {
    pub const PKG_SPEC_INVALID: &str = "PKG_SPEC_INVALID";

    // Manifest (fatal to the whole run)
    pub const PKG_MANIFEST_NOT_FOUND: &str = "PKG_MANIFEST_NOT_FOUND";
    pub const PKG_MANIFEST_INVALID: &str = "PKG_MANIFEST_INVALID";
    pub const PKG_MANIFEST_WRITE_FAILED: &str = "PKG_MANIFEST_WRITE_FAILED";

    // Registry
    pub const PKG_NOT_FOUND: &str = "PKG_NOT_FOUND";
    pub const PKG_NETWORK_ERROR: &str = "PKG_NETWORK_ERROR";
    pub const PKG_MALFORMED_RESPONSE: &str = "PKG_MALFORMED_RESPONSE";

    // Local placement
    pub const PKG_EXTRACT_FAILED: &str = "PKG_EXTRACT_FAILED";
    pub const PKG_CONFLICT: &str = "PKG_CONFLICT";

    pub const PKG_NOT_INSTALLED: &str = "PKG_NOT_INSTALLED";
}

/// Package manager error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkgError {
    code: &'static str,
    message: String,
}

impl PkgError {
    /// Create a new error with the given code and message.
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Get the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Get the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether this error concerns the manifest itself.
    ///
    /// Manifest errors abort the whole run rather than a single package.
    #[must_use]
    pub fn is_manifest_error(&self) -> bool {
        matches!(
            self.code,
            codes::PKG_MANIFEST_NOT_FOUND
                | codes::PKG_MANIFEST_INVALID
                | codes::PKG_MANIFEST_WRITE_FAILED
        )
    }

    /// Create a spec invalid error.
    pub fn spec_invalid(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_SPEC_INVALID, msg)
    }

    /// Create a manifest not found error.
    #[must_use]
    pub fn manifest_not_found(path: &Path) -> Self {
        Self::new(
            codes::PKG_MANIFEST_NOT_FOUND,
            format!("Manifest not found: {}", path.display()),
        )
    }

    /// Create a manifest invalid error.
    pub fn manifest_invalid(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_MANIFEST_INVALID, msg)
    }

    /// Create a manifest write failed error.
    pub fn manifest_write_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_MANIFEST_WRITE_FAILED, msg)
    }

    /// Create a package not found error.
    #[must_use]
    pub fn not_found(name: &str) -> Self {
        Self::new(codes::PKG_NOT_FOUND, format!("Package not found: {name}"))
    }

    /// Create a version not found error.
    #[must_use]
    pub fn version_not_found(name: &str, version: &str) -> Self {
        Self::new(
            codes::PKG_NOT_FOUND,
            format!("Version {version} of {name} not found in registry"),
        )
    }

    /// Create a network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_NETWORK_ERROR, msg)
    }

    /// Create a malformed registry response error.
    pub fn malformed_response(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_MALFORMED_RESPONSE, msg)
    }

    /// Create an extraction failed error.
    pub fn extract_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_EXTRACT_FAILED, msg)
    }

    /// Create a placement conflict error.
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_CONFLICT, msg)
    }

    /// Create a not installed error.
    #[must_use]
    pub fn not_installed(name: &str) -> Self {
        Self::new(
            codes::PKG_NOT_INSTALLED,
            format!("{name} is not listed in the manifest dependencies"),
        )
    }
}

impl fmt::Display for PkgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PkgError {}

impl From<reqwest::Error> for PkgError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::network(format!("Request timed out: {e}"))
        } else if e.is_connect() {
            Self::network(format!("Connection failed: {e}"))
        } else {
            Self::network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        let err = PkgError::spec_invalid("bad spec");
        assert_eq!(err.code(), codes::PKG_SPEC_INVALID);
        assert!(err.to_string().contains(codes::PKG_SPEC_INVALID));
        assert_eq!(err.message(), "bad spec");
    }

    #[test]
    fn test_manifest_errors_are_fatal() {
        assert!(PkgError::manifest_not_found(Path::new("package.json")).is_manifest_error());
        assert!(PkgError::manifest_invalid("x").is_manifest_error());
        assert!(PkgError::manifest_write_failed("x").is_manifest_error());

        assert!(!PkgError::not_found("a").is_manifest_error());
        assert!(!PkgError::network("x").is_manifest_error());
        assert!(!PkgError::extract_failed("x").is_manifest_error());
        assert!(!PkgError::not_installed("a").is_manifest_error());
    }

    #[test]
    fn test_version_not_found_shares_not_found_code() {
        let err = PkgError::version_not_found("left-pad", "9.9.9");
        assert_eq!(err.code(), codes::PKG_NOT_FOUND);
        assert!(err.message().contains("9.9.9"));
    }

    #[test]
    fn test_error_codes_uppercase() {
        let all_codes = [
            codes::PKG_SPEC_INVALID,
            codes::PKG_MANIFEST_NOT_FOUND,
            codes::PKG_MANIFEST_INVALID,
            codes::PKG_MANIFEST_WRITE_FAILED,
            codes::PKG_NOT_FOUND,
            codes::PKG_NETWORK_ERROR,
            codes::PKG_MALFORMED_RESPONSE,
            codes::PKG_EXTRACT_FAILED,
            codes::PKG_CONFLICT,
            codes::PKG_NOT_INSTALLED,
        ];

        for code in all_codes {
            assert!(
                code.chars().all(|c| c.is_uppercase() || c == '_'),
                "Error code '{code}' should be SCREAMING_SNAKE_CASE"
            );
        }
    }
}
