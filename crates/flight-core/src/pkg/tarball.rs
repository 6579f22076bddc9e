//! Archive extraction and placement into the module directory.
//!
//! An archive is always unpacked into a fresh temporary directory first.
//! Only once that has fully succeeded is the package moved into
//! `<modules>/<name>`, and any previous directory for that name is set aside
//! rather than deleted until the move has gone through.
//!
//! Extraction runs on a blocking thread that its caller may stop waiting
//! for. A [`PlacementGate`] settles that race: whichever side claims it first
//! wins, so a package is either placed or reported as failed, never both.

use super::error::PkgError;
use super::fetch::StagedArchive;
use super::spec::{encoded_name, unscoped_name};
use crate::paths::module_dir;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tar::Archive;
use tempfile::TempDir;
use tracing::debug;

/// Name of the backed-up previous install inside its holding directory.
const BACKUP_ENTRY: &str = "previous";

/// One-shot claim shared by an extraction and the task waiting on it.
///
/// The extraction claims it just before touching the module directory. A
/// waiter that gives up claims it to abandon the extraction. Only the first
/// claim succeeds.
#[derive(Debug, Default)]
pub struct PlacementGate {
    claimed: AtomicBool,
}

impl PlacementGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the gate. Returns false if the other side already holds it.
    pub fn claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[must_use]
    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }
}

/// Extract a staged archive and install it as `<modules_dir>/<name>`.
///
/// Consumes the staged archive; it is deleted when this returns, as is the
/// temporary extraction directory. Extraction stops early once `gate` has
/// been claimed by someone else, and the package is only placed if this call
/// wins the gate.
///
/// # Errors
/// Returns `PKG_EXTRACT_FAILED` if the archive is corrupt, empty, or contains
/// unsafe paths, or if the extraction was abandoned, and `PKG_CONFLICT` if the
/// extracted package cannot be moved into place. In every case an existing
/// install of `name` is left as it was.
pub fn install_archive(
    staged: StagedArchive,
    staging_dir: &Path,
    modules_dir: &Path,
    name: &str,
    gate: &PlacementGate,
) -> Result<PathBuf, PkgError> {
    debug!(name, bytes = staged.size(), "Extracting archive");

    fs::create_dir_all(staging_dir).map_err(|e| {
        PkgError::extract_failed(format!(
            "Failed to create staging directory {}: {e}",
            staging_dir.display()
        ))
    })?;

    let extract_dir = tempfile::Builder::new()
        .prefix(&format!(".extract-{}-", encoded_name(name)))
        .tempdir_in(staging_dir)
        .map_err(|e| PkgError::extract_failed(format!("Failed to create temp directory: {e}")))?;

    extract_tgz_file(staged.path(), extract_dir.path(), gate)?;

    let content_root = find_content_root(extract_dir.path())?;
    let dest = module_dir(modules_dir, name);

    if !gate.claim() {
        return Err(abandoned(name));
    }
    place_package(&content_root, &dest, name)?;

    debug!(name, path = %dest.display(), "Installed package");

    Ok(dest)
}

/// Unpack a gzip-compressed tar file into `dest`.
///
/// # Errors
/// Returns an extraction error for unreadable or corrupt archives, for
/// entries that would land outside `dest`, and when `gate` is claimed
/// before the last entry is written.
pub fn extract_tgz_file(
    archive_path: &Path,
    dest: &Path,
    gate: &PlacementGate,
) -> Result<(), PkgError> {
    let file = File::open(archive_path).map_err(|e| {
        PkgError::extract_failed(format!("Failed to open {}: {e}", archive_path.display()))
    })?;

    let gz = GzDecoder::new(BufReader::new(file));
    let mut archive = Archive::new(gz);

    for entry in archive
        .entries()
        .map_err(|e| PkgError::extract_failed(format!("Failed to read archive entries: {e}")))?
    {
        if gate.is_claimed() {
            return Err(PkgError::extract_failed("Extraction abandoned"));
        }

        let mut entry = entry
            .map_err(|e| PkgError::extract_failed(format!("Failed to read archive entry: {e}")))?;

        let path = entry
            .path()
            .map_err(|e| PkgError::extract_failed(format!("Failed to read entry path: {e}")))?
            .into_owned();
        let path_str = path.to_string_lossy();

        if path.is_absolute() {
            return Err(PkgError::extract_failed(format!(
                "Archive contains absolute path: {path_str}"
            )));
        }

        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(PkgError::extract_failed(format!(
                "Archive contains path traversal: {path_str}"
            )));
        }

        let dest_path = dest.join(&path);
        if !dest_path.starts_with(dest) {
            return Err(PkgError::extract_failed(format!(
                "Archive entry escapes destination: {path_str}"
            )));
        }

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            fs::create_dir_all(&dest_path).map_err(|e| extract_io_error(&dest_path, &e))?;
        } else if entry_type.is_file() {
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent).map_err(|e| extract_io_error(parent, &e))?;
            }

            let expected = entry.header().size().unwrap_or(0);
            let mut file = File::create(&dest_path).map_err(|e| extract_io_error(&dest_path, &e))?;
            let written = io::copy(&mut entry, &mut file).map_err(|e| {
                PkgError::extract_failed(format!("Failed to extract {path_str}: {e}"))
            })?;
            if written != expected {
                return Err(PkgError::extract_failed(format!(
                    "Archive truncated: {path_str} has {written} of {expected} bytes"
                )));
            }

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Ok(mode) = entry.header().mode() {
                    // Owner must keep read/write or the package cannot be replaced later
                    let perms = fs::Permissions::from_mode((mode & 0o777) | 0o600);
                    let _ = fs::set_permissions(&dest_path, perms);
                }
            }
        }
        // Symlinks, hard links and special entries are skipped
    }

    // Read the rest of the gzip stream so a missing or bad trailer is caught
    io::copy(&mut archive.into_inner(), &mut io::sink())
        .map_err(|e| PkgError::extract_failed(format!("Corrupt archive: {e}")))?;

    Ok(())
}

/// Locate the package content inside an extraction directory.
///
/// Registries wrap content in one top-level directory (usually `package/`).
/// If that is what we find, it is the content root; if the archive put files
/// at its top level, the extraction directory itself is.
fn find_content_root(extract_dir: &Path) -> Result<PathBuf, PkgError> {
    let entries: Vec<_> = fs::read_dir(extract_dir)
        .map_err(|e| PkgError::extract_failed(format!("Failed to read extracted dir: {e}")))?
        .filter_map(Result::ok)
        .collect();

    match entries.as_slice() {
        [] => Err(PkgError::extract_failed("Archive does not contain any files")),
        [only] if only.file_type().is_ok_and(|ft| ft.is_dir()) => Ok(only.path()),
        _ => Ok(extract_dir.to_path_buf()),
    }
}

/// Move `content_root` to `dest`, replacing what is there only after the move
/// has succeeded.
fn place_package(content_root: &Path, dest: &Path, name: &str) -> Result<(), PkgError> {
    let parent = dest
        .parent()
        .ok_or_else(|| PkgError::conflict(format!("Invalid module path for {name}")))?;

    fs::create_dir_all(parent).map_err(|e| {
        PkgError::conflict(format!(
            "Failed to create module directory {}: {e}",
            parent.display()
        ))
    })?;

    // Set any previous install aside in a hidden holder next to it. The holder
    // is a TempDir, so the old contents go away when it drops.
    let previous = if fs::symlink_metadata(dest).is_ok() {
        let holder = tempfile::Builder::new()
            .prefix(&format!(".{}.previous-", unscoped_name(name)))
            .tempdir_in(parent)
            .map_err(|e| {
                PkgError::conflict(format!(
                    "Failed to stage replacement of {}: {e}",
                    dest.display()
                ))
            })?;

        let backup = holder.path().join(BACKUP_ENTRY);
        fs::rename(dest, &backup).map_err(|e| {
            PkgError::conflict(format!(
                "Package \"{name}\" already exists and could not be replaced: {e}"
            ))
        })?;

        debug!(name, backup = %backup.display(), "Set previous install aside");
        Some(holder)
    } else {
        None
    };

    match move_dir(content_root, dest) {
        Ok(()) => {
            // Dropping the holder removes the previous install
            drop(previous);
            Ok(())
        }
        Err(e) => {
            if let Some(holder) = previous {
                restore_previous(holder, dest);
            }
            Err(PkgError::conflict(format!(
                "Failed to move {name} into {}: {e}",
                dest.display()
            )))
        }
    }
}

/// Rename, falling back to a copy when the rename is refused (for example
/// across filesystems). A partial copy is removed.
fn move_dir(src: &Path, dst: &Path) -> io::Result<()> {
    let Err(rename_err) = fs::rename(src, dst) else {
        return Ok(());
    };

    debug!(error = %rename_err, "Rename failed, falling back to copy");

    if let Err(copy_err) = flight_util::fs::copy_dir_all(src, dst) {
        let _ = fs::remove_dir_all(dst);
        return Err(io::Error::other(format!(
            "rename={rename_err}, copy={copy_err}"
        )));
    }

    Ok(())
}

fn restore_previous(holder: TempDir, dest: &Path) {
    let backup = holder.path().join(BACKUP_ENTRY);
    if fs::symlink_metadata(dest).is_ok() {
        let _ = fs::remove_dir_all(dest);
    }
    if let Err(e) = fs::rename(&backup, dest) {
        // Keep the holder on disk so the old copy is not lost
        let kept = holder.keep();
        tracing::warn!(
            error = %e,
            backup = %kept.join(BACKUP_ENTRY).display(),
            "Failed to restore previous install"
        );
    }
}

fn abandoned(name: &str) -> PkgError {
    PkgError::extract_failed(format!("Extraction of {name} abandoned before placement"))
}

fn extract_io_error(path: &Path, e: &io::Error) -> PkgError {
    PkgError::extract_failed(format!("Failed to write {}: {e}", path.display()))
}
