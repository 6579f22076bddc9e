pub mod install;
pub mod uninstall;
pub mod version;

use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::Path;

/// Print a command result as pretty JSON on stdout.
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}

/// Print a fatal error on stderr. Manifest problems also name the manifest
/// the run was using.
fn print_error(message: &str, manifest: Option<&Path>) {
    eprintln!("error: {message}");
    if let Some(path) = manifest {
        eprintln!("  manifest: {}", path.display());
    }
}
