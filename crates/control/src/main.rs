//! `benchctl`: the controller CLI.
//!
//! Manages the persisted benchmark configuration and drives runners.
//! Exit code 0 on success, 1 on any validation or runtime failure.

use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod config_cmd;
mod error;
mod run_cmd;

use config_cmd::ConfigStore;
use error::Result;

/// Controller for kvbench benchmark runs.
#[derive(Debug, Parser)]
#[command(name = "benchctl", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Manage the persisted configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Run a benchmark through the runner at the given address.
    Run {
        /// Runner address, `ip:port`.
        client_addr: String,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Create the default configuration if none exists.
    Init,
    /// Overwrite the configuration with the defaults.
    Reset,
    /// Set one field, e.g. `benchctl config set seed=12345`.
    Set {
        /// `field=value` assignment; fields use their JSON names.
        assignment: String,
    },
    /// Print one field.
    Get {
        /// Field name as it appears in the JSON document.
        field: String,
    },
    /// Validate and adopt an external configuration file.
    LoadFile {
        /// Path to a JSON configuration document.
        path: PathBuf,
    },
    /// Print the configuration.
    View,
    /// List all fields with types and current values.
    List,
}

async fn dispatch(cli: Cli) -> Result<()> {
    let store = ConfigStore::from_env()?;
    match cli.command {
        Command::Config { action } => match action {
            ConfigAction::Init => config_cmd::init(&store),
            ConfigAction::Reset => config_cmd::reset(&store),
            ConfigAction::Set { assignment } => config_cmd::set(&store, &assignment),
            ConfigAction::Get { field } => config_cmd::get(&store, &field),
            ConfigAction::LoadFile { path } => config_cmd::load_file(&store, &path),
            ConfigAction::View => config_cmd::view(&store),
            ConfigAction::List => config_cmd::list(&store),
        },
        Command::Run { client_addr } => run_cmd::run(&store, &client_addr).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
