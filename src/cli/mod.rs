//! CLI module providing command-line interface functionality
//!
//! This module handles argument parsing and routes each command to its
//! handler. The process stays single-threaded until a handler asks for a
//! runtime, so `daemon start --detach` can fork safely.

pub mod commands;
pub mod context;
pub mod handlers;

use anyhow::{Context, Result};
use clap::Parser;

pub use commands::{Cli, Commands, ConfigAction, DaemonAction};
pub use context::CliContext;
pub use handlers::CommandHandler;

/// Runtime used by every command that needs async IO
pub(crate) fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build async runtime")
}

/// Main CLI application following the CliContext pattern
pub struct CliApp;

impl CliApp {
    /// Parse command line arguments and execute the requested command
    pub fn run() -> Result<()> {
        let cli = Cli::parse();

        let context = CliContext::new(cli.config, cli.verbose)?;
        let handler = CommandHandler::new(context);

        handler.handle_command(cli.command)
    }
}
