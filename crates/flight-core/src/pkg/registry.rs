//! npm-compatible registry client.
//!
//! The registry is untrusted input: packuments are decoded into typed
//! structs and validated before any field is used. Shape problems surface as
//! `PKG_MALFORMED_RESPONSE`, never as a panic.

use super::error::PkgError;
use super::spec::{encoded_name, unscoped_name, VersionHint};
use crate::config::{Config, Timeouts};
use reqwest::{Client, StatusCode};
use serde::de::IgnoredAny;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

/// Default registry URL.
pub const DEFAULT_REGISTRY: &str = "https://registry.yarnpkg.com/";

/// Environment variable to override registry URL.
pub const REGISTRY_ENV: &str = "FLIGHT_REGISTRY";

/// Maximum packument size (64 MB).
pub const MAX_PACKUMENT_SIZE: u64 = 64 * 1024 * 1024;

/// Dist-tag used when no version is requested.
pub const DEFAULT_TAG: &str = "latest";

/// Package metadata as served by `GET /{name}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Packument {
    pub name: String,
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: BTreeMap<String, String>,
    /// Published versions; only the keys are inspected.
    #[serde(default)]
    pub versions: Option<BTreeMap<String, IgnoredAny>>,
}

impl Packument {
    /// Decode and validate a packument body for `expected_name`.
    ///
    /// # Errors
    /// Returns a malformed-response error if the body is not JSON, has fields
    /// of the wrong shape, or names a different package.
    pub fn from_slice(body: &[u8], expected_name: &str) -> Result<Self, PkgError> {
        let packument: Self = serde_json::from_slice(body).map_err(|e| {
            PkgError::malformed_response(format!("Invalid packument for '{expected_name}': {e}"))
        })?;

        if packument.name != expected_name {
            return Err(PkgError::malformed_response(format!(
                "Registry returned packument for '{}' when '{expected_name}' was requested",
                packument.name
            )));
        }

        Ok(packument)
    }

    /// Look up the version a dist-tag points at.
    ///
    /// # Errors
    /// Returns a malformed-response error if the tag is missing or does not
    /// point at a valid version.
    pub fn tagged_version(&self, tag: &str) -> Result<&str, PkgError> {
        let version = self.dist_tags.get(tag).ok_or_else(|| {
            PkgError::malformed_response(format!(
                "Packument for '{}' has no '{tag}' dist-tag",
                self.name
            ))
        })?;

        if semver::Version::parse(version).is_err() {
            return Err(PkgError::malformed_response(format!(
                "Dist-tag '{tag}' of '{}' points at invalid version '{version}'",
                self.name
            )));
        }

        Ok(version)
    }

    /// Whether the registry lists `version`. Registries that omit the
    /// `versions` map are taken at their word.
    #[must_use]
    pub fn has_version(&self, version: &str) -> bool {
        self.versions
            .as_ref()
            .map_or(true, |versions| versions.contains_key(version))
    }

    /// Pick the concrete version for a request.
    ///
    /// # Errors
    /// Returns not-found for an unknown exact version, malformed-response for
    /// a missing tag.
    pub fn select_version(
        &self,
        hint: Option<&VersionHint>,
        default_tag: &str,
    ) -> Result<String, PkgError> {
        match hint {
            None => self.tagged_version(default_tag).map(str::to_string),
            Some(VersionHint::Tag(tag)) => self.tagged_version(tag).map(str::to_string),
            Some(VersionHint::Exact(version)) => {
                if self.has_version(version) {
                    Ok(version.clone())
                } else {
                    Err(PkgError::version_not_found(&self.name, version))
                }
            }
        }
    }
}

/// A package resolved to a concrete version and archive location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    pub name: String,
    pub version: String,
    pub tarball_url: String,
}

/// Registry client for fetching package metadata.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: Url,
    http: Client,
    default_tag: String,
    max_packument_bytes: u64,
}

impl RegistryClient {
    /// Create a new registry client with the given base URL.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be created.
    pub fn new(base_url: &str, timeouts: &Timeouts) -> Result<Self, PkgError> {
        let base_url = parse_base_url(base_url)?;

        let http = Client::builder()
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.request)
            .user_agent(concat!("flight/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PkgError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            http,
            default_tag: DEFAULT_TAG.to_string(),
            max_packument_bytes: MAX_PACKUMENT_SIZE,
        })
    }

    /// Create a client from the run configuration.
    ///
    /// # Errors
    /// Returns an error if the client cannot be created.
    pub fn from_config(config: &Config) -> Result<Self, PkgError> {
        Ok(Self::new(&config.registry_url, &config.timeouts)?.with_default_tag(&config.default_tag))
    }

    /// Use a different dist-tag when no version is requested.
    #[must_use]
    pub fn with_default_tag(mut self, tag: &str) -> Self {
        self.default_tag = tag.to_string();
        self
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Get the HTTP client (for reuse in archive downloads).
    #[must_use]
    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Fetch and validate the packument for a package.
    ///
    /// # Errors
    /// Returns not-found on 404, a network error on transport failure or other
    /// non-success status, and malformed-response on an invalid or oversized
    /// body.
    pub async fn fetch_packument(&self, name: &str) -> Result<Packument, PkgError> {
        let url = self
            .base_url
            .join(&encoded_name(name))
            .map_err(|e| PkgError::network(format!("Failed to build URL for '{name}': {e}")))?;

        debug!(name, url = %url, "Fetching packument");

        let mut response = self.http.get(url.as_str()).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(PkgError::not_found(name));
        }

        if !response.status().is_success() {
            return Err(PkgError::network(format!(
                "Registry returned status {} for '{name}'",
                response.status()
            )));
        }

        let max = self.max_packument_bytes;
        if response.content_length().is_some_and(|len| len > max) {
            return Err(packument_too_large(name, max));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if (body.len() + chunk.len()) as u64 > max {
                return Err(packument_too_large(name, max));
            }
            body.extend_from_slice(&chunk);
        }

        Packument::from_slice(&body, name)
    }

    /// Resolve `name` through the default dist-tag.
    ///
    /// # Errors
    /// See [`RegistryClient::fetch_packument`]; also malformed-response if the
    /// tag is missing.
    pub async fn resolve_latest(&self, name: &str) -> Result<ResolvedPackage, PkgError> {
        self.resolve(name, None).await
    }

    /// Resolve `name` through a caller-supplied dist-tag.
    ///
    /// # Errors
    /// See [`RegistryClient::resolve`].
    pub async fn resolve_tag(&self, name: &str, tag: &str) -> Result<ResolvedPackage, PkgError> {
        self.resolve(name, Some(&VersionHint::Tag(tag.to_string())))
            .await
    }

    /// Resolve `name` at a caller-supplied version or dist-tag.
    ///
    /// The packument is still fetched so an unknown package is reported as
    /// not found rather than as a failed download.
    ///
    /// # Errors
    /// See [`RegistryClient::resolve`].
    pub async fn resolve_exact(
        &self,
        name: &str,
        version: &str,
    ) -> Result<ResolvedPackage, PkgError> {
        self.resolve(name, Some(&VersionHint::classify(version)))
            .await
    }

    /// Resolve `name` with an optional version hint.
    ///
    /// # Errors
    /// Returns the registry error kinds described on the individual steps.
    pub async fn resolve(
        &self,
        name: &str,
        hint: Option<&VersionHint>,
    ) -> Result<ResolvedPackage, PkgError> {
        let packument = self.fetch_packument(name).await?;
        let version = packument.select_version(hint, &self.default_tag)?;
        let tarball_url = self.tarball_url(name, &version)?;

        debug!(name, version = %version, "Resolved version");

        Ok(ResolvedPackage {
            name: name.to_string(),
            version,
            tarball_url,
        })
    }

    /// Build the archive URL: `{base}/{name}/-/{basename}-{version}.tgz`.
    ///
    /// # Errors
    /// Returns a network error if the URL cannot be built.
    pub fn tarball_url(&self, name: &str, version: &str) -> Result<String, PkgError> {
        let path = format!("{name}/-/{}-{version}.tgz", unscoped_name(name));
        self.base_url
            .join(&path)
            .map(String::from)
            .map_err(|e| PkgError::network(format!("Failed to build archive URL for '{name}': {e}")))
    }
}

fn packument_too_large(name: &str, max: u64) -> PkgError {
    PkgError::malformed_response(format!(
        "Packument for '{name}' is larger than {max} bytes"
    ))
}

/// Parse a registry base URL, forcing a trailing slash so relative joins
/// append rather than replace the last path segment.
fn parse_base_url(base_url: &str) -> Result<Url, PkgError> {
    let normalized = if base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{base_url}/")
    };

    let url = Url::parse(&normalized)
        .map_err(|e| PkgError::network(format!("Invalid registry URL '{base_url}': {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(PkgError::network(format!(
            "Invalid registry URL '{base_url}': unsupported scheme '{}'",
            url.scheme()
        )));
    }

    Ok(url)
}
