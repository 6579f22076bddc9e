//! `flight uninstall` command implementation.

use super::{print_error, print_json};
use flight_core::pkg::{uninstall_one, UninstallOutcome};
use flight_core::Config;
use miette::Result;
use serde::Serialize;

/// Uninstall result for JSON output: `{ ok, uninstall, error? }`.
#[derive(Serialize)]
struct UninstallJsonResult {
    ok: bool,
    uninstall: Option<UninstallOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn run(config: &Config, name: &str, json: bool) -> Result<()> {
    match uninstall_one(config, name) {
        Ok(outcome) => {
            if json {
                print_json(&UninstallJsonResult {
                    ok: true,
                    uninstall: Some(outcome),
                    error: None,
                })?;
            } else {
                println!("- {}@{}", outcome.name, outcome.version);
            }
            Ok(())
        }
        Err(e) => {
            if json {
                print_json(&UninstallJsonResult {
                    ok: false,
                    uninstall: None,
                    error: Some(e.to_string()),
                })?;
            } else {
                let manifest = e
                    .is_manifest_error()
                    .then_some(config.manifest_path.as_path());
                print_error(&e.to_string(), manifest);
            }
            std::process::exit(1);
        }
    }
}
