//! Dependency install orchestration.
//!
//! Each package goes through resolve -> fetch -> extract/place as one unit of
//! work. Units run on a bounded pool; their outcomes flow back to a single
//! aggregator, which is the only code that mutates the manifest and writes it
//! once at the end of the batch.

use super::error::PkgError;
use super::fetch::{fetch_archive, MAX_TARBALL_SIZE};
use super::manifest::Manifest;
use super::registry::{RegistryClient, ResolvedPackage};
use super::spec::{validate_name, PackageSpec, VersionHint};
use super::tarball::{install_archive, PlacementGate};
use crate::config::Config;
use crate::error::Error;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};

/// Result of one package's install attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum InstallStatus {
    Ok,
    Failed { code: &'static str, message: String },
    /// Not started because the run was cancelled.
    Skipped,
}

/// Outcome for one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallOutcome {
    pub name: String,
    /// Resolved version on success, otherwise the requested specifier if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(flatten)]
    pub status: InstallStatus,
}

impl InstallOutcome {
    #[must_use]
    pub fn ok(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: Some(version.into()),
            status: InstallStatus::Ok,
        }
    }

    #[must_use]
    pub fn failed(name: impl Into<String>, requested: Option<String>, error: &PkgError) -> Self {
        Self {
            name: name.into(),
            version: requested,
            status: InstallStatus::Failed {
                code: error.code(),
                message: error.message().to_string(),
            },
        }
    }

    #[must_use]
    pub fn skipped(name: impl Into<String>, requested: Option<String>) -> Self {
        Self {
            name: name.into(),
            version: requested,
            status: InstallStatus::Skipped,
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self.status, InstallStatus::Ok)
    }

    /// The error code, for failed outcomes.
    #[must_use]
    pub fn error_code(&self) -> Option<&'static str> {
        match &self.status {
            InstallStatus::Failed { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// Outcomes of a batch, sorted by package name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InstallReport {
    pub outcomes: Vec<InstallOutcome>,
    /// Whether the manifest file was rewritten.
    pub manifest_written: bool,
}

impl InstallReport {
    fn new(mut outcomes: Vec<InstallOutcome>, manifest_written: bool) -> Self {
        outcomes.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            outcomes,
            manifest_written,
        }
    }

    /// True when every package installed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(InstallOutcome::is_ok)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &InstallOutcome> {
        self.outcomes.iter().filter(|o| o.is_ok())
    }

    pub fn unsuccessful(&self) -> impl Iterator<Item = &InstallOutcome> {
        self.outcomes.iter().filter(|o| !o.is_ok())
    }
}

/// One queued unit of work.
#[derive(Debug, Clone)]
struct Job {
    name: String,
    hint: Option<VersionHint>,
}

/// Installs dependencies into the configured module directory.
#[derive(Debug, Clone)]
pub struct Installer {
    config: Config,
    registry: RegistryClient,
    cancel: Arc<AtomicBool>,
}

impl Installer {
    /// Create an installer for `config`.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: Config) -> Result<Self, Error> {
        config.validate()?;
        let registry = RegistryClient::from_config(&config)?;
        Ok(Self {
            config,
            registry,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Share a stop flag; once set, packages not yet started are skipped.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = flag;
        self
    }

    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Install every dependency listed in the manifest, once each, at the
    /// version the manifest pins.
    ///
    /// Failed entries stay in the manifest (they are still wanted) unless
    /// `Config::keep_failed` is off. Skipped entries always stay. The manifest
    /// is only rewritten when its mapping changed.
    ///
    /// # Errors
    /// Returns a manifest error if the manifest cannot be loaded or saved.
    /// Per-package failures are reported in the outcomes.
    pub async fn install_all(&self) -> Result<InstallReport, PkgError> {
        let mut manifest = Manifest::load(&self.config.manifest_path)?;

        let jobs: Vec<Job> = manifest
            .dependencies()
            .map(|(name, spec)| Job {
                name: name.to_string(),
                hint: Some(VersionHint::classify(spec)),
            })
            .collect();

        info!(count = jobs.len(), "Installing manifest dependencies");

        let outcomes = self.run_batch(jobs).await;

        let mut changed = false;
        for outcome in &outcomes {
            match &outcome.status {
                InstallStatus::Ok | InstallStatus::Skipped => {}
                InstallStatus::Failed { code, .. } if self.config.keep_failed => {
                    warn!(
                        name = %outcome.name,
                        code,
                        "Keeping dependency in manifest although it is not installed"
                    );
                }
                InstallStatus::Failed { code, .. } => {
                    warn!(name = %outcome.name, code, "Dropping failed dependency from manifest");
                    changed |= manifest.remove(&outcome.name).is_some();
                }
            }
        }

        let manifest_written = self.finish(&manifest, changed)?;
        Ok(InstallReport::new(outcomes, manifest_written))
    }

    /// Install the given packages and record them in the manifest.
    ///
    /// Plain names resolve through the default dist-tag; `name@version` and
    /// `name@tag` are honoured. Each success records `name -> resolvedVersion`.
    /// Repeated names are installed once.
    ///
    /// # Errors
    /// Returns a manifest error if the manifest cannot be loaded or saved.
    pub async fn install_named<S: AsRef<str>>(
        &self,
        specs: &[S],
    ) -> Result<InstallReport, PkgError> {
        let mut manifest = Manifest::load(&self.config.manifest_path)?;

        let mut outcomes = Vec::new();
        let mut jobs = Vec::new();
        let mut seen = HashSet::new();

        for raw in specs {
            let raw = raw.as_ref();
            match PackageSpec::parse(raw) {
                Ok(spec) => {
                    if seen.insert(spec.name.clone()) {
                        jobs.push(Job {
                            name: spec.name,
                            hint: spec.version,
                        });
                    } else {
                        debug!(name = %spec.name, "Ignoring repeated package");
                    }
                }
                Err(e) => {
                    warn!(spec = raw, error = %e, "Invalid package spec");
                    outcomes.push(InstallOutcome::failed(raw, None, &e));
                }
            }
        }

        outcomes.extend(self.run_batch(jobs).await);

        let mut changed = false;
        for outcome in outcomes.iter().filter(|o| o.is_ok()) {
            if let Some(version) = &outcome.version {
                let previous = manifest.insert(outcome.name.clone(), version.clone());
                changed |= previous.as_deref() != Some(version.as_str());
            }
        }

        let manifest_written = self.finish(&manifest, changed)?;
        Ok(InstallReport::new(outcomes, manifest_written))
    }

    /// Install one package: resolve, fetch, extract and place.
    ///
    /// Never fails as a whole; errors become a `Failed` outcome carrying the
    /// originating code.
    pub async fn install_one(&self, name: &str, hint: Option<&VersionHint>) -> InstallOutcome {
        let span = info_span!("install", name, version = hint.map(VersionHint::as_str));

        match self.try_install_one(name, hint).instrument(span).await {
            Ok(resolved) => {
                info!(name, version = %resolved.version, "Installed");
                InstallOutcome::ok(resolved.name, resolved.version)
            }
            Err(e) => {
                warn!(name, code = e.code(), error = %e.message(), "Install failed");
                InstallOutcome::failed(name, hint.map(ToString::to_string), &e)
            }
        }
    }

    async fn try_install_one(
        &self,
        name: &str,
        hint: Option<&VersionHint>,
    ) -> Result<ResolvedPackage, PkgError> {
        validate_name(name)?;

        let resolved = self.registry.resolve(name, hint).await?;

        let staged = fetch_archive(
            self.registry.http(),
            &resolved.tarball_url,
            &self.config.staging_dir,
            name,
            MAX_TARBALL_SIZE,
            self.config.timeouts.download,
        )
        .await?;

        let gate = Arc::new(PlacementGate::new());
        let worker_gate = Arc::clone(&gate);
        let staging_dir = self.config.staging_dir.clone();
        let modules_dir = self.config.modules_dir.clone();
        let pkg_name = name.to_string();
        let mut task = tokio::task::spawn_blocking(move || {
            install_archive(staged, &staging_dir, &modules_dir, &pkg_name, &worker_gate)
        });

        let joined = match tokio::time::timeout(self.config.timeouts.extract, &mut task).await {
            Ok(joined) => joined,
            Err(_) if gate.claim() => {
                // The worker sees the claim and stops without placing anything
                return Err(PkgError::extract_failed(format!(
                    "Extraction timed out after {}ms",
                    self.config.timeouts.extract.as_millis()
                )));
            }
            Err(_) => {
                debug!(name, "Extraction timed out while placing, waiting for it to finish");
                task.await
            }
        };

        match joined {
            Ok(result) => {
                result?;
            }
            Err(join_err) => {
                return Err(PkgError::extract_failed(format!(
                    "Extraction task failed: {join_err}"
                )));
            }
        }

        Ok(resolved)
    }

    /// Run jobs on a pool bounded by the concurrency limit and collect every
    /// outcome. Jobs that have not started when the stop flag is set are
    /// reported as skipped.
    async fn run_batch(&self, jobs: Vec<Job>) -> Vec<InstallOutcome> {
        let limit = self.config.concurrency.max(1);

        stream::iter(jobs)
            .map(|job| async move {
                if self.is_cancelled() {
                    debug!(name = %job.name, "Skipping, run cancelled");
                    return InstallOutcome::skipped(job.name, job.hint.map(|h| h.to_string()));
                }
                self.install_one(&job.name, job.hint.as_ref()).await
            })
            .buffer_unordered(limit)
            .collect()
            .await
    }

    /// Persist the manifest if it changed and tidy the staging directory.
    fn finish(&self, manifest: &Manifest, changed: bool) -> Result<bool, PkgError> {
        let _ = flight_util::fs::remove_dir_if_empty(&self.config.staging_dir);

        if !changed {
            debug!("Manifest unchanged");
            return Ok(false);
        }

        manifest.save(&self.config.manifest_path)?;
        debug!(path = %self.config.manifest_path.display(), "Wrote manifest");
        Ok(true)
    }
}
