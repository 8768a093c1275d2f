//! Common test utilities and helpers
//!
//! Reusable pieces for the integration tests: an in-process relay with a
//! recording sink, and a command builder around the `notify-relay` binary.
#![allow(dead_code)]

use assert_cmd::Command;
use async_trait::async_trait;
use notify_relay::daemon::templates::RenderedMessage;
use notify_relay::daemon::{DeliveryReceipt, DeliverySink, RelayServer, ServerContext, ServerState};
use notify_relay::{AppError, AppResult, Config};
use predicates::prelude::*;
use std::net::{SocketAddr, TcpListener};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::task::JoinHandle;

/// Sink that remembers every message it was asked to deliver
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<RenderedMessage>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<RenderedMessage> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn deliver(&self, message: &RenderedMessage) -> AppResult<DeliveryReceipt> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(DeliveryReceipt::to_recipients(vec!["ops@example.com".to_string()]))
    }
}

/// Sink that always fails
pub struct FailingSink;

#[async_trait]
impl DeliverySink for FailingSink {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn deliver(&self, _message: &RenderedMessage) -> AppResult<DeliveryReceipt> {
        Err(AppError::delivery("failing", "mailbox unavailable"))
    }
}

/// A port nothing listens on (at the time of the call)
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Configuration rooted in `dir`, bound to loopback
pub fn test_config(dir: &Path, port: u16) -> Config {
    let mut config = Config::default();
    config.server.bind = "127.0.0.1".to_string();
    config.server.port = port;
    config.server.read_timeout_ms = 500;
    config.log.path = dir.join("events.log");
    config.daemon.pid_file = dir.join("relay.pid");
    // no mail server in tests
    config.delivery.mail.enabled = false;
    config
}

/// A relay running inside the test process
pub struct TestRelay {
    pub dir: TempDir,
    pub config: Arc<Config>,
    pub addr: SocketAddr,
    shutdown: flume::Sender<()>,
    task: JoinHandle<AppResult<()>>,
}

impl TestRelay {
    pub async fn start(sink: Arc<dyn DeliverySink>) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let config = test_config(dir.path(), 0);
        Self::start_with(dir, config, sink).await
    }

    pub async fn start_with(dir: TempDir, config: Config, sink: Arc<dyn DeliverySink>) -> Self {
        let config = Arc::new(config);
        let context = ServerContext::start_with_sink(Arc::clone(&config), sink)
            .await
            .expect("Failed to start relay");
        let (shutdown, shutdown_rx) = flume::bounded(1);
        let server = RelayServer::new(context, shutdown_rx);
        let addr = server.local_addr();
        let mut state = server.subscribe();
        let task = tokio::spawn(server.run());
        state
            .wait_for(|s| *s == ServerState::Listening)
            .await
            .expect("Relay never started listening");

        Self {
            dir,
            config,
            addr,
            shutdown,
            task,
        }
    }

    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    pub fn log_contents(&self) -> String {
        std::fs::read_to_string(&self.config.log.path).unwrap_or_default()
    }

    pub fn pid_file(&self) -> PathBuf {
        self.config.daemon.pid_file.clone()
    }

    /// Signal shutdown and wait for the server to finish
    pub async fn stop(self) -> (TempDir, Arc<Config>) {
        let _ = self.shutdown.send(());
        self.task
            .await
            .expect("Relay task panicked")
            .expect("Relay returned an error");
        (self.dir, self.config)
    }
}

/// Test command builder for the notify-relay CLI
pub struct TestCommand {
    cmd: Command,
}

impl TestCommand {
    /// Create a new test command for the notify-relay binary
    pub fn new() -> Self {
        let mut cmd = Command::cargo_bin("notify-relay").expect("Failed to find notify-relay binary");
        // keep the caller's environment from steering the client or the config
        for key in [
            "NOTIFY_RELAY_CONFIG",
            "NOTIFICATION_SERVER_HOST",
            "NOTIFICATION_SERVER_PORT",
            "NOTIFICATION_SERVER_BACKUP_HOST",
            "NOTIFICATION_SERVER_BACKUP_PORT",
            "NF_BIND",
            "NF_PORT",
            "NF_PID_FILE",
            "NF_LOG_FILE",
            "NF_DELIVERY",
            "NF_ENABLE_MAIL",
            "NF_SMTP_HOST",
            "NF_SMTP_TLS",
        ] {
            cmd.env_remove(key);
        }
        Self { cmd }
    }

    /// Add arguments to the command
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for arg in args {
            self.cmd.arg(arg.as_ref());
        }
        self
    }

    /// Add a single argument to the command
    pub fn arg<S: AsRef<str>>(mut self, arg: S) -> Self {
        self.cmd.arg(arg.as_ref());
        self
    }

    /// Point the command at a configuration file
    pub fn config(self, path: &Path) -> Self {
        self.arg("--config").arg(path.to_string_lossy())
    }

    /// Execute and expect success
    pub fn expect_success(mut self) -> TestAssertion {
        let assert = self.cmd.assert().success();
        TestAssertion { assert }
    }

    /// Execute and expect failure
    pub fn expect_failure(mut self) -> TestAssertion {
        let assert = self.cmd.assert().failure();
        TestAssertion { assert }
    }
}

impl Default for TestCommand {
    fn default() -> Self {
        Self::new()
    }
}

/// Test assertion wrapper with convenient methods
pub struct TestAssertion {
    assert: assert_cmd::assert::Assert,
}

impl TestAssertion {
    /// Assert stdout contains text
    pub fn stdout_contains<S: AsRef<str>>(self, text: S) -> Self {
        let assert = self.assert.stdout(predicate::str::contains(text.as_ref()));
        Self { assert }
    }

    /// Assert stderr contains text
    pub fn stderr_contains<S: AsRef<str>>(self, text: S) -> Self {
        let assert = self.assert.stderr(predicate::str::contains(text.as_ref()));
        Self { assert }
    }

    /// Finish the assertion
    pub fn done(self) -> assert_cmd::assert::Assert {
        self.assert
    }
}
