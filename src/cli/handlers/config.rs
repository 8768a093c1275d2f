//! Configuration management handler
//!
//! Shows the effective configuration and writes the default file.

use super::super::{CliContext, ConfigAction};
use crate::config::{Config, ConfigManager};
use anyhow::{Context, Result};

/// Handler for configuration operations
pub struct ConfigHandler<'a> {
    context: &'a CliContext,
}

impl<'a> ConfigHandler<'a> {
    /// Create new configuration handler
    pub fn new(context: &'a CliContext) -> Self {
        Self { context }
    }

    /// Write the built-in defaults to the configuration file
    pub fn handle_init(&self, force: bool) -> Result<()> {
        let config_path = self.context.config_manager.config_path().to_path_buf();

        if config_path.exists() && !force {
            println!("Configuration already initialized at: {}", config_path.display());
            println!("Use --force to overwrite");
            return Ok(());
        }

        ConfigManager::from_config(config_path.clone(), Config::default())
            .save()
            .context("Failed to write configuration")?;
        println!("Configuration initialized successfully at: {}", config_path.display());
        Ok(())
    }

    /// Handle configuration management
    pub fn handle_config(&self, action: ConfigAction) -> Result<()> {
        match action {
            ConfigAction::Show => {
                println!("{}", toml::to_string_pretty(self.context.config())?);
            }
        }
        Ok(())
    }
}

super::traits::impl_context_handler!(ConfigHandler<'a>);
