//! Daemon management handler
//!
//! Start runs the relay in this process (optionally after detaching), stop
//! and status work from the PID file alone.

use super::super::{build_runtime, CliContext, DaemonAction};
use crate::daemon::{
    is_process_running, running_pid, service_mode, shutdown_on_signal, RelayServer,
    ServerContext,
};
use crate::errors::AppError;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// How long `stop` waits for the daemon to exit
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Handler for daemon operations
pub struct DaemonHandler<'a> {
    context: &'a CliContext,
}

impl<'a> DaemonHandler<'a> {
    /// Create new daemon handler
    pub fn new(context: &'a CliContext) -> Self {
        Self { context }
    }

    /// Handle daemon management operations
    pub fn handle_daemon(&self, action: DaemonAction) -> Result<()> {
        match action {
            // start sets up logging itself, after detaching
            DaemonAction::Start { detach } => self.handle_daemon_start(detach),
            DaemonAction::Stop => {
                let _log_guard = self.context.init_logging(false)?;
                self.handle_daemon_stop()
            }
            DaemonAction::Status => self.handle_daemon_status(),
        }
    }

    /// Run the relay until a termination signal arrives
    ///
    /// Must be called before any runtime or thread exists: detaching forks.
    pub fn handle_daemon_start(&self, detach: bool) -> Result<()> {
        let config = Arc::new(self.context.config().clone());

        // refuse before forking so the operator still sees the error
        if let Some(pid) = running_pid(&config.daemon.pid_file)? {
            return Err(AppError::AlreadyRunning { pid }.into());
        }

        let mode = service_mode(detach, &config.daemon);
        if mode.is_background() {
            println!(
                "Starting relay in background (PID file: {})",
                config.daemon.pid_file.display()
            );
            if let Some(log_path) = self.context.diagnostic_log_path(true) {
                println!("Diagnostics are written to {}", log_path.display());
            }
        }
        mode.enter()?;

        let _log_guard = self.context.init_logging(mode.is_background())?;
        info!("Starting relay in {} mode", mode.name());

        let shutdown = shutdown_on_signal()?;
        let runtime = build_runtime()?;
        runtime.block_on(async move {
            let context = ServerContext::start(config)
                .await
                .inspect_err(|e| error!("Failed to start relay: {}", e))?;
            RelayServer::new(context, shutdown)
                .run()
                .await
                .inspect_err(|e| error!("Relay stopped with an error: {}", e))
        })?;

        Ok(())
    }

    /// Send SIGTERM to the recorded daemon and wait for it to exit
    pub fn handle_daemon_stop(&self) -> Result<()> {
        let pid_file = &self.context.config().daemon.pid_file;
        let Some(pid) = running_pid(pid_file)? else {
            println!("Relay daemon is not running");
            return Ok(());
        };

        info!("Sending SIGTERM to relay daemon (PID: {})", pid);
        // SAFETY: plain signal delivery to a pid read from our own PID file
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error())
                .with_context(|| format!("Failed to signal relay daemon (PID: {})", pid));
        }

        let started = Instant::now();
        while started.elapsed() < STOP_TIMEOUT {
            if !is_process_running(pid) {
                println!("Relay daemon stopped");
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        warn!("Relay daemon (PID: {}) still running after {:?}", pid, STOP_TIMEOUT);
        anyhow::bail!(
            "Relay daemon (PID: {}) did not stop within {} seconds",
            pid,
            STOP_TIMEOUT.as_secs()
        )
    }

    /// Report whether a relay is running
    pub fn handle_daemon_status(&self) -> Result<()> {
        let config = self.context.config();
        match running_pid(&config.daemon.pid_file)? {
            Some(pid) => {
                let host = hostname::get()
                    .map(|h| h.to_string_lossy().into_owned())
                    .unwrap_or_else(|_| "localhost".to_string());
                println!("Relay daemon is running (PID: {})", pid);
                println!("  Host: {}", host);
                println!("  Listen address: {}", config.server.listen_address());
                println!("  Event log: {}", config.log.path.display());
                println!("  PID file: {}", config.daemon.pid_file.display());
            }
            None => println!("Relay daemon is not running"),
        }
        Ok(())
    }
}

// Implement the handler factory trait to reduce boilerplate
super::traits::impl_context_handler!(DaemonHandler<'a>);
