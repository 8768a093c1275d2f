//! How the server process runs: attached to the terminal, or as a
//! background service.
//!
//! Entering a mode must happen before the tokio runtime is built, since a
//! fork only carries the calling thread into the child.

use crate::errors::{AppError, AppResult};
use crate::shared::config::DaemonConfig;
use std::path::PathBuf;

pub trait ServiceMode {
    fn name(&self) -> &'static str;

    /// Whether standard streams are gone after [`ServiceMode::enter`]
    fn is_background(&self) -> bool;

    /// Switch the current process into this mode
    fn enter(&self) -> AppResult<()>;
}

/// Stay attached to the invoking terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct Foreground;

impl ServiceMode for Foreground {
    fn name(&self) -> &'static str {
        "foreground"
    }

    fn is_background(&self) -> bool {
        false
    }

    fn enter(&self) -> AppResult<()> {
        Ok(())
    }
}

/// Classic Unix daemon: fork, new session, stable working directory,
/// standard streams on the null device.
///
/// The invoking process exits inside [`ServiceMode::enter`]; only the
/// detached child returns from it.
#[derive(Debug, Clone)]
pub struct ForkDetach {
    working_directory: PathBuf,
    umask: u32,
}

impl ForkDetach {
    pub fn from_config(config: &DaemonConfig) -> Self {
        Self {
            working_directory: config.working_directory.clone(),
            umask: 0o027,
        }
    }
}

impl ServiceMode for ForkDetach {
    fn name(&self) -> &'static str {
        "background"
    }

    fn is_background(&self) -> bool {
        true
    }

    fn enter(&self) -> AppResult<()> {
        daemonize::Daemonize::new()
            .working_directory(&self.working_directory)
            .umask(self.umask)
            .start()
            .map_err(|e| AppError::detach_with_source("daemonize failed", e))
    }
}

/// Mode for `daemon start`, with or without `--detach`
pub fn service_mode(detach: bool, config: &DaemonConfig) -> Box<dyn ServiceMode> {
    if detach {
        Box::new(ForkDetach::from_config(config))
    } else {
        Box::new(Foreground)
    }
}
