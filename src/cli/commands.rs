//! Command definitions and structures for the CLI
//!
//! This module contains all the clap-based command line argument definitions,
//! including the main CLI structure and all subcommands.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Main CLI structure
#[derive(Parser)]
#[command(name = "notify-relay")]
#[command(about = "Alerting relay: TCP notification daemon and client")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ~/.notify-relay/config.toml)
    #[arg(short, long, global = true, env = "NOTIFY_RELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Relay daemon management
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },

    /// Send one notification through the relay
    Send {
        /// Name of the emitting program
        #[arg(short, long)]
        program: String,

        /// Notification title
        #[arg(short, long)]
        title: String,

        /// Free-form details
        #[arg(short, long, default_value = "")]
        details: String,

        /// Tag carried with the event
        #[arg(long)]
        tag: Option<String>,

        /// Severity: debug, info or error
        #[arg(short, long, default_value = "info")]
        level: String,

        /// Primary relay address (host:port)
        #[arg(long)]
        server: Option<String>,

        /// Backup relay address (host:port)
        #[arg(long)]
        backup: Option<String>,

        /// Do not wait for the acknowledgement
        #[arg(long)]
        no_ack: bool,
    },

    /// Configuration inspection
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Write the default configuration file
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Configuration actions
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration (file plus environment)
    Show,
}

/// Daemon management actions
#[derive(Subcommand)]
pub enum DaemonAction {
    /// Start the relay
    Start {
        /// Run in detached mode (background)
        #[arg(short = 'd', long)]
        detach: bool,
    },

    /// Stop the relay recorded in the PID file
    Stop,

    /// Check relay status
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_send() {
        let cli = Cli::try_parse_from([
            "notify-relay",
            "send",
            "--program",
            "svc-a",
            "--title",
            "disk full",
            "--level",
            "error",
            "--server",
            "127.0.0.1:9123",
        ])
        .unwrap();

        match cli.command {
            Commands::Send {
                program,
                level,
                server,
                no_ack,
                ..
            } => {
                assert_eq!(program, "svc-a");
                assert_eq!(level, "error");
                assert_eq!(server.as_deref(), Some("127.0.0.1:9123"));
                assert!(!no_ack);
            }
            _ => panic!("expected send command"),
        }
    }

    #[test]
    fn test_parse_daemon_start_detached() {
        let cli = Cli::try_parse_from(["notify-relay", "daemon", "start", "--detach"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Daemon {
                action: DaemonAction::Start { detach: true }
            }
        ));
    }
}
