//! Archive download into the staging directory.

use super::error::PkgError;
use super::spec::encoded_name;
use reqwest::Client;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Maximum archive size (200 MB).
pub const MAX_TARBALL_SIZE: u64 = 200 * 1024 * 1024;

/// A downloaded archive waiting to be extracted.
///
/// The file is removed when this value is dropped, whatever happened to it.
#[derive(Debug)]
pub struct StagedArchive {
    path: PathBuf,
    size: u64,
}

impl StagedArchive {
    /// Take ownership of an existing file as a staged archive.
    #[must_use]
    pub fn adopt(path: PathBuf) -> Self {
        let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        Self { path, size }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of bytes written.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for StagedArchive {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Staged file location for `name`: `<staging>/<encoded-name>.tgz`.
#[must_use]
pub fn staged_archive_path(staging_dir: &Path, name: &str) -> PathBuf {
    staging_dir.join(format!("{}.tgz", encoded_name(name)))
}

/// Stream an archive from `url` into the staging directory.
///
/// The body is written chunk by chunk; at no point is the whole archive held
/// in memory.
///
/// # Errors
/// Returns a network error on transport failure, timeout, non-success status,
/// or a body larger than `max_bytes`, and an extraction error when the staged
/// file cannot be written locally. A partial file is removed.
pub async fn fetch_archive(
    client: &Client,
    url: &str,
    staging_dir: &Path,
    name: &str,
    max_bytes: u64,
    timeout: Duration,
) -> Result<StagedArchive, PkgError> {
    let mut response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| PkgError::network(format!("Failed to download '{url}': {e}")))?;

    if !response.status().is_success() {
        return Err(PkgError::network(format!(
            "Download failed with status {} for '{url}'",
            response.status()
        )));
    }

    if let Some(len) = response.content_length() {
        if len > max_bytes {
            return Err(PkgError::network(format!(
                "Archive too large: {len} bytes (max: {max_bytes})"
            )));
        }
    }

    tokio::fs::create_dir_all(staging_dir).await.map_err(|e| {
        PkgError::extract_failed(format!(
            "Failed to create staging directory {}: {e}",
            staging_dir.display()
        ))
    })?;

    // The guard is declared before the handle so the handle is closed first
    // and the file removed on any early return
    let mut staged = StagedArchive {
        path: staged_archive_path(staging_dir, name),
        size: 0,
    };
    let mut file = tokio::fs::File::create(&staged.path).await.map_err(|e| {
        PkgError::extract_failed(format!("Failed to create {}: {e}", staged.path.display()))
    })?;

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| PkgError::network(format!("Failed to read response body: {e}")))?
    {
        staged.size += chunk.len() as u64;
        if staged.size > max_bytes {
            return Err(PkgError::network(format!(
                "Archive too large: more than {max_bytes} bytes"
            )));
        }

        file.write_all(&chunk)
            .await
            .map_err(|e| PkgError::extract_failed(format!("Failed to write staged archive: {e}")))?;
    }

    file.flush()
        .await
        .map_err(|e| PkgError::extract_failed(format!("Failed to write staged archive: {e}")))?;

    debug!(name, size = staged.size, path = %staged.path.display(), "Downloaded archive");

    Ok(staged)
}
