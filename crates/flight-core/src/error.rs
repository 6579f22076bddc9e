use crate::pkg::PkgError;
use thiserror::Error;

/// Core error type for run-level failures.
///
/// Per-package failures never surface here; they are reported in outcomes.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid registry URL '{url}': {source}")]
    RegistryUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Concurrency limit must be at least 1")]
    InvalidConcurrency,

    #[error(transparent)]
    Pkg(#[from] PkgError),

    #[error("{0}")]
    Other(String),
}

impl Error {
    #[must_use]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}
