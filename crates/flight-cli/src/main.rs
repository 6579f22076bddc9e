#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

mod commands;
mod logging;

use clap::Parser;
use flight_core::pkg::REGISTRY_ENV;
use flight_core::Config;
use miette::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "flight")]
#[command(author, version, about = "A minimal package dependency installer", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the working directory
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    /// Registry base URL
    #[arg(long, global = true, value_name = "URL", env = REGISTRY_ENV)]
    registry: Option<String>,

    /// Maximum number of packages installed at once
    #[arg(short = 'j', long, global = true, value_name = "N")]
    concurrency: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Install packages (all manifest dependencies when none are given)
    Install {
        /// Packages to install: name, name@version or name@tag
        specs: Vec<String>,

        /// Dist-tag used for names given without a version
        #[arg(long, value_name = "TAG")]
        tag: Option<String>,

        /// Remove manifest entries whose install failed
        #[arg(long)]
        prune_failed: bool,
    },

    /// Remove an installed package
    Uninstall {
        /// Package name
        name: String,
    },

    /// Print version information
    Version,
}

impl Cli {
    /// Configuration for commands that act on a project. Also sets up logging.
    fn project_config(&self) -> Config {
        let cwd = self
            .cwd
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        let mut config = Config::discover(&cwd)
            .with_verbosity(self.verbose)
            .with_json_logs(self.json);
        if let Some(registry) = &self.registry {
            config = config.with_registry(registry);
        }
        if let Some(concurrency) = self.concurrency {
            config = config.with_concurrency(concurrency);
        }

        logging::init(config.verbosity, config.json_logs);
        config
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Version => commands::version::run(cli.json),
        Commands::Install {
            specs,
            tag,
            prune_failed,
        } => {
            let mut config = cli.project_config().with_keep_failed(!*prune_failed);
            if let Some(tag) = tag {
                config = config.with_default_tag(tag.clone());
            }
            commands::install::run(config, specs, cli.json)
        }
        Commands::Uninstall { name } => {
            commands::uninstall::run(&cli.project_config(), name, cli.json)
        }
    }
}
