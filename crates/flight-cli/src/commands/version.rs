use super::print_json;
use flight_core::version::version_string;
use flight_core::VERSION;
use miette::Result;
use serde::Serialize;

#[derive(Serialize)]
struct VersionJsonResult {
    ok: bool,
    version: &'static str,
}

pub fn run(json: bool) -> Result<()> {
    if json {
        return print_json(&VersionJsonResult {
            ok: true,
            version: VERSION,
        });
    }

    println!("{}", version_string());
    Ok(())
}
