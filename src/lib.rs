pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod provenance;
pub mod readiness;
pub mod session;
pub mod status;
pub mod views;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Installs the log subscriber. Logs go to stderr so command output stays
/// pipeable.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();
}

pub fn run() -> ExitCode {
    init_tracing();
    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
    cli::run(cli::Cli::parse())
}
