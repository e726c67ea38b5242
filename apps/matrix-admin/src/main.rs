//! `matrix-admin` entry point.

mod app;
mod cli;
mod logging;
mod progress;
mod prompt;

use clap::Parser;

use crate::logging::{Logging, LoggingConfig};

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let _logging = Logging::install(&LoggingConfig::from_env());

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), command = ?cli.command, "starting matrix-admin");

    // The command future runs on this thread, inside the logging scope.
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(cli))
}
