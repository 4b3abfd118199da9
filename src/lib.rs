pub mod core;

mod cli;
mod commands;

use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Parse arguments, initialise logging and run the requested command.
pub async fn run() -> ExitCode {
    let cli = cli::Cli::parse();

    // Logs go to stderr; stdout carries status lines and JSON output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,craftsync_lib=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("craftsync {} starting...", env!("CARGO_PKG_VERSION"));

    match commands::execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if err.is_configuration() => {
            error!("Configuration error: {}", err);
            ExitCode::from(2)
        }
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}
