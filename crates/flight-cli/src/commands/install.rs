//! `flight install` command implementation.

use super::{print_error, print_json};
use flight_core::pkg::{InstallReport, InstallStatus, Installer};
use flight_core::Config;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Install result for JSON output: `{ ok, install, error? }`.
#[derive(Serialize)]
struct InstallJsonResult {
    ok: bool,
    install: Option<InstallReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Run the install command. With no specs every manifest dependency is
/// installed; otherwise only the named packages, which are then recorded.
pub fn run(config: Config, specs: &[String], json: bool) -> Result<()> {
    let installer = match Installer::new(config) {
        Ok(installer) => installer,
        Err(e) => return fail(&e.to_string(), None, json),
    };

    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    let result = runtime.block_on(async {
        spawn_interrupt_handler(installer.cancel_flag());

        if specs.is_empty() {
            installer.install_all().await
        } else {
            installer.install_named(specs).await
        }
    });

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            let manifest = e
                .is_manifest_error()
                .then_some(installer.config().manifest_path.as_path());
            return fail(&e.to_string(), manifest, json);
        }
    };

    let ok = report.is_success();
    if json {
        print_json(&InstallJsonResult {
            ok,
            install: Some(report),
            error: None,
        })?;
    } else {
        print_report(&report, specs.is_empty());
    }

    // Exit with code 2 if any package did not install
    if !ok {
        std::process::exit(2);
    }
    Ok(())
}

fn print_report(report: &InstallReport, from_manifest: bool) {
    if report.outcomes.is_empty() && from_manifest {
        println!("No dependencies to install");
        return;
    }

    for outcome in &report.outcomes {
        let version = outcome.version.as_deref().unwrap_or("");
        match &outcome.status {
            InstallStatus::Ok => println!("+ {}@{version}", outcome.name),
            InstallStatus::Failed { code, message } => {
                eprintln!("! {}: {code} {message}", outcome.name);
            }
            InstallStatus::Skipped => eprintln!("~ {} skipped", outcome.name),
        }
    }

    let installed = report.succeeded().count();
    let total = report.outcomes.len();
    if installed == total {
        println!("{installed} installed");
    } else {
        println!("{installed} of {total} installed");
    }
}

fn fail(message: &str, manifest: Option<&Path>, json: bool) -> Result<()> {
    if json {
        print_json(&InstallJsonResult {
            ok: false,
            install: None,
            error: Some(message.to_string()),
        })?;
    } else {
        print_error(message, manifest);
    }
    std::process::exit(1);
}

/// First Ctrl+C stops new packages from starting; the second exits at once.
fn spawn_interrupt_handler(cancel: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupted, finishing packages already in progress (Ctrl+C again to abort)");
        cancel.store(true, Ordering::Relaxed);

        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}
