//! Command handlers for all CLI operations
//!
//! This module routes parsed commands to the handler responsible for them.

pub mod config;
pub mod daemon;
pub mod send;
pub(crate) mod traits;

use super::{build_runtime, CliContext, Commands};
use anyhow::Result;
use config::ConfigHandler;
use daemon::DaemonHandler;
use send::{SendHandler, SendRequest};
use traits::HandlerFactory;

/// Coordinates all command handling operations with dependency injection via CliContext
pub struct CommandHandler {
    context: CliContext,
}

impl CommandHandler {
    /// Create a new command handler instance with the provided context
    pub fn new(context: CliContext) -> Self {
        Self { context }
    }

    /// Route commands to their appropriate handlers
    pub fn handle_command(&self, command: Commands) -> Result<()> {
        match command {
            // the daemon decides for itself when logging starts
            Commands::Daemon { action } => DaemonHandler::create(&self.context).handle_daemon(action),
            Commands::Send {
                program,
                title,
                details,
                tag,
                level,
                server,
                backup,
                no_ack,
            } => {
                let _log_guard = self.context.init_logging(false)?;
                let request = SendRequest {
                    program,
                    title,
                    details,
                    tag,
                    level,
                    server,
                    backup,
                    no_ack,
                };
                build_runtime()?.block_on(SendHandler::create(&self.context).handle_send(request))
            }
            Commands::Config { action } => {
                let _log_guard = self.context.init_logging(false)?;
                ConfigHandler::create(&self.context).handle_config(action)
            }
            Commands::Init { force } => {
                let _log_guard = self.context.init_logging(false)?;
                ConfigHandler::create(&self.context).handle_init(force)
            }
        }
    }
}
