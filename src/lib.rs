pub mod commands;
pub mod config;
pub mod element;
pub mod errors;
pub mod executor;
pub mod perception;
pub mod structure;

#[cfg(test)]
mod testing;

use std::process::ExitCode;

use clap::Parser;

use crate::commands::Cli;

/// CLI entry point. Exit status 1 means "not found", 2 a hard failure.
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match commands::execute(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            tracing::error!(error = %e, "markethand aborted");
            ExitCode::from(2)
        }
    }
}
