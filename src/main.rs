//! stackup CLI entry point.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use stackup::commands;

/// Bring up the local development stack in dependency order.
#[derive(Parser)]
#[command(name = "stackup", version, about)]
struct Cli {
    /// Run the gateway's test command and exit with its result.
    #[arg(long, short = 't')]
    test: bool,

    /// Start one database instance per service before the stack comes up.
    #[arg(long, short = 'p')]
    provision_databases: bool,

    /// Path to the stack manifest.
    #[arg(long, value_name = "PATH", default_value = "stackup.toml")]
    config: PathBuf,
}

fn main() -> ExitCode {
    init_logging();

    let cli = Cli::parse();
    match commands::up::execute(&cli.config, cli.test, cli.provision_databases) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}
