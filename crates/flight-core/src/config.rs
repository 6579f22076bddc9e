use crate::error::Error;
use crate::paths;
use crate::pkg::registry::{DEFAULT_REGISTRY, DEFAULT_TAG};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default number of packages installed concurrently.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Timeouts bounding every blocking step of an install.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// TCP connect timeout for registry and archive requests.
    pub connect: Duration,
    /// Whole-request timeout for registry metadata.
    pub request: Duration,
    /// Whole-request timeout for one archive download.
    pub download: Duration,
    /// Upper bound on extracting and placing one archive.
    pub extract: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            request: Duration::from_secs(15),
            download: Duration::from_secs(60),
            extract: Duration::from_secs(120),
        }
    }
}

/// Runtime configuration for flight.
///
/// Every component receives its paths from here; nothing reads the process
/// working directory on its own.
#[derive(Debug, Clone)]
pub struct Config {
    /// Project directory (holds the manifest).
    pub project_dir: PathBuf,

    /// Path to the manifest file.
    pub manifest_path: PathBuf,

    /// Root directory for installed packages.
    pub modules_dir: PathBuf,

    /// Directory for in-flight downloads and extractions.
    pub staging_dir: PathBuf,

    /// Registry base URL.
    pub registry_url: String,

    /// Dist-tag resolved when no version is requested.
    pub default_tag: String,

    /// Maximum number of packages processed at once.
    pub concurrency: usize,

    pub timeouts: Timeouts,

    /// Whether `install` keeps manifest entries whose install failed.
    pub keep_failed: bool,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,
}

impl Config {
    /// Create a config rooted at `project_dir` with default layout.
    #[must_use]
    pub fn new(project_dir: PathBuf) -> Self {
        Self {
            manifest_path: paths::manifest_path(&project_dir),
            modules_dir: paths::modules_dir(&project_dir),
            staging_dir: paths::staging_dir(&project_dir),
            project_dir,
            registry_url: DEFAULT_REGISTRY.to_string(),
            default_tag: DEFAULT_TAG.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            timeouts: Timeouts::default(),
            keep_failed: true,
            json_logs: false,
            verbosity: 0,
        }
    }

    /// Create a config for the project containing `cwd`.
    ///
    /// Walks up to the nearest directory with a manifest; falls back to `cwd`
    /// itself so commands report a missing manifest there.
    #[must_use]
    pub fn discover(cwd: &Path) -> Self {
        let cwd = dunce::canonicalize(cwd).unwrap_or_else(|_| cwd.to_path_buf());
        let root = paths::project_root(&cwd).unwrap_or(cwd);
        Self::new(root)
    }

    /// Set the registry base URL.
    #[must_use]
    pub fn with_registry(mut self, url: impl Into<String>) -> Self {
        self.registry_url = url.into();
        self
    }

    /// Set the default dist-tag.
    #[must_use]
    pub fn with_default_tag(mut self, tag: impl Into<String>) -> Self {
        self.default_tag = tag.into();
        self
    }

    /// Set the concurrency limit.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set whether failed manifest entries are kept.
    #[must_use]
    pub fn with_keep_failed(mut self, keep: bool) -> Self {
        self.keep_failed = keep;
        self
    }

    /// Set the module root.
    #[must_use]
    pub fn with_modules_dir(mut self, dir: PathBuf) -> Self {
        self.modules_dir = dir;
        self
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }

    /// Check values that would otherwise fail deep inside a run.
    ///
    /// # Errors
    /// Returns an error for a zero concurrency limit, an empty default tag,
    /// or a registry URL that is not absolute http(s).
    pub fn validate(&self) -> Result<(), Error> {
        if self.concurrency == 0 {
            return Err(Error::InvalidConcurrency);
        }

        if self.default_tag.trim().is_empty() {
            return Err(Error::other("default dist-tag must not be empty"));
        }

        let url = url::Url::parse(&self.registry_url).map_err(|source| Error::RegistryUrl {
            url: self.registry_url.clone(),
            source,
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::other(format!(
                "registry URL must use http or https: {}",
                self.registry_url
            )));
        }

        Ok(())
    }
}
