//! CLI Context for dependency injection and shared state
//!
//! This module provides the CliContext abstraction that centralizes
//! configuration management and diagnostic logging setup for the handlers.

use crate::config::ConfigManager;
use crate::shared::config::Config;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Diagnostic log name used when none is configured
const FALLBACK_DIAGNOSTIC_LOG: &str = "notify-relay.log";

/// CLI execution context containing shared dependencies and configuration
#[derive(Clone)]
pub struct CliContext {
    pub config_path: Option<PathBuf>,
    pub verbose: bool,
    pub config_manager: Arc<ConfigManager>,
}

impl CliContext {
    /// Load configuration and anchor its relative paths at the current directory
    pub fn new(config_path: Option<PathBuf>, verbose: bool) -> Result<Self> {
        let manager = ConfigManager::load(config_path.clone())?;
        let base = std::env::current_dir().context("Failed to get current directory")?;
        Ok(Self::with_manager(manager, &base, config_path, verbose))
    }

    /// Context around an already assembled configuration
    pub fn from_config(config: Config, verbose: bool) -> Self {
        Self {
            config_path: None,
            verbose,
            config_manager: Arc::new(ConfigManager::from_config(PathBuf::from("config.toml"), config)),
        }
    }

    fn with_manager(
        manager: ConfigManager,
        base: &Path,
        config_path: Option<PathBuf>,
        verbose: bool,
    ) -> Self {
        let path = manager.config_path().to_path_buf();
        let mut config = manager.into_config();
        config.resolve_paths(base);

        Self {
            config_path,
            verbose,
            config_manager: Arc::new(ConfigManager::from_config(path, config)),
        }
    }

    pub fn config(&self) -> &Config {
        self.config_manager.config()
    }

    fn env_filter(&self) -> EnvFilter {
        let log_level = if self.verbose {
            "debug"
        } else {
            self.config().daemon.log_level.as_str()
        };
        EnvFilter::from_default_env()
            .add_directive(log_level.parse().unwrap_or(tracing::Level::INFO.into()))
    }

    /// Where diagnostic logs go, if anywhere besides stderr
    ///
    /// A detached relay has no stderr, so it falls back to
    /// `notify-relay.log` next to the event log.
    pub fn diagnostic_log_path(&self, background: bool) -> Option<PathBuf> {
        let config = self.config();
        config.daemon.diagnostic_log.clone().or_else(|| {
            background.then(|| {
                config
                    .log
                    .path
                    .parent()
                    .unwrap_or_else(|| Path::new("."))
                    .join(FALLBACK_DIAGNOSTIC_LOG)
            })
        })
    }

    /// Initialize diagnostic logging
    ///
    /// With a diagnostic log path, logs go to a daily rolling file, and
    /// additionally to the console unless `background` is set. The returned
    /// guard must stay alive for the file writer to flush.
    pub fn init_logging(&self, background: bool) -> Result<Option<WorkerGuard>> {
        use tracing_subscriber::prelude::*;

        let Some(log_path) = self.diagnostic_log_path(background) else {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(self.env_filter())
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
            return Ok(None);
        };

        let directory = log_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(directory).context("Failed to create log directory")?;

        let file_appender = tracing_appender::rolling::daily(
            directory,
            log_path
                .file_name()
                .unwrap_or_else(|| std::ffi::OsStr::new(FALLBACK_DIAGNOSTIC_LOG)),
        );
        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false);
        // console output only while attached to a terminal
        let console_layer =
            (!background).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

        tracing_subscriber::registry()
            .with(self.env_filter())
            .with(file_layer)
            .with(console_layer)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

        info!("Diagnostic log at {}", log_path.display());
        Ok(Some(guard))
    }
}
