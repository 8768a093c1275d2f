//! Process-wide server state
//!
//! [`ServerContext`] is the single owner of the listening socket, the PID
//! file and the event log. It is built once by [`ServerContext::start`] and
//! torn down once by [`ServerContext::teardown`].

use super::event_log::EventLog;
use super::handler::ConnectionHandler;
use super::pid_file::{self, PidFile};
use super::sinks::{build_sink, DeliverySink};
use super::templates::MessageRenderer;
use crate::errors::{AppError, AppResult};
use crate::shared::config::Config;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

pub struct ServerContext {
    config: Arc<Config>,
    listener: TcpListener,
    local_addr: SocketAddr,
    pid_file: PidFile,
    handler: ConnectionHandler,
}

impl ServerContext {
    /// Start with the sink selected in the configuration
    pub async fn start(config: Arc<Config>) -> AppResult<Self> {
        let renderer = Arc::new(MessageRenderer::new()?);
        let sink = build_sink(&config.delivery, Arc::clone(&renderer))?;
        Self::start_with_parts(config, sink, renderer).await
    }

    /// Start with an explicit delivery sink
    pub async fn start_with_sink(config: Arc<Config>, sink: Arc<dyn DeliverySink>) -> AppResult<Self> {
        let renderer = Arc::new(MessageRenderer::new()?);
        Self::start_with_parts(config, sink, renderer).await
    }

    /// Start with a sink and the renderer it shares with the handler
    pub async fn start_with_parts(
        config: Arc<Config>,
        sink: Arc<dyn DeliverySink>,
        renderer: Arc<MessageRenderer>,
    ) -> AppResult<Self> {
        // refuse early so a second instance never touches the socket
        if let Some(pid) = pid_file::running_pid(&config.daemon.pid_file)? {
            return Err(AppError::AlreadyRunning { pid });
        }

        let log = Arc::new(EventLog::open(&config.log)?);

        let address = config.server.listen_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| AppError::transport_with_source(&address, "bind", e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| AppError::transport_with_source(&address, "query local address", e))?;

        let pid_file = PidFile::acquire(&config.daemon.pid_file)?;

        info!(
            "Relay listening on {} (delivery: {}, {} mode)",
            local_addr,
            sink.name(),
            if config.server.concurrent { "concurrent" } else { "serial" }
        );

        let handler = ConnectionHandler::new(&config.server, log, sink, renderer);
        Ok(Self {
            config,
            listener,
            local_addr,
            pid_file,
            handler,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn listener(&self) -> &TcpListener {
        &self.listener
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn pid(&self) -> u32 {
        self.pid_file.pid()
    }

    pub fn handler(&self) -> &ConnectionHandler {
        &self.handler
    }

    /// Close the listening socket, then remove the PID file
    pub fn teardown(self) -> AppResult<()> {
        let Self {
            listener,
            local_addr,
            pid_file,
            ..
        } = self;

        drop(listener);
        info!("Stopped listening on {}", local_addr);

        if let Err(e) = pid_file.release() {
            warn!("Failed to remove PID file: {}", e);
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::config::SinkKind;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.server.bind = "127.0.0.1".to_string();
        config.server.port = 0;
        config.log.path = dir.path().join("events.log");
        config.daemon.pid_file = dir.path().join("relay.pid");
        config.delivery.sink = SinkKind::Mail;
        config
    }

    #[tokio::test]
    async fn test_start_and_teardown() {
        let dir = TempDir::new().unwrap();
        let config = Arc::new(test_config(&dir));

        let context = ServerContext::start(Arc::clone(&config)).await.unwrap();
        assert_ne!(context.local_addr().port(), 0);
        assert!(config.daemon.pid_file.exists());
        assert!(config.log.path.exists());
        assert_eq!(context.pid(), std::process::id());

        let addr = context.local_addr();
        context.teardown().unwrap();
        assert!(!config.daemon.pid_file.exists());
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_sink_and_handler_share_one_renderer() {
        let dir = TempDir::new().unwrap();
        let config = Arc::new(test_config(&dir));

        let context = ServerContext::start(config).await.unwrap();
        // held by the handler and by the mail sink
        assert_eq!(Arc::strong_count(context.handler().renderer()), 2);

        let renderer = Arc::new(MessageRenderer::new().unwrap());
        let dir = TempDir::new().unwrap();
        let config = Arc::new(test_config(&dir));
        let sink = build_sink(&config.delivery, Arc::clone(&renderer)).unwrap();
        let other = ServerContext::start_with_parts(config, sink, Arc::clone(&renderer))
            .await
            .unwrap();
        assert!(Arc::ptr_eq(other.handler().renderer(), &renderer));

        context.teardown().unwrap();
        other.teardown().unwrap();
    }

    #[tokio::test]
    async fn test_live_pid_file_blocks_start() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);

        let mut child = std::process::Command::new("sleep").arg("5").spawn().unwrap();
        std::fs::write(&config.daemon.pid_file, child.id().to_string()).unwrap();

        let result = ServerContext::start(Arc::new(config)).await;
        assert!(matches!(result, Err(AppError::AlreadyRunning { .. })));

        child.kill().unwrap();
        child.wait().unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_is_transport_error() {
        let dir = TempDir::new().unwrap();
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut config = test_config(&dir);
        config.server.port = occupied.local_addr().unwrap().port();

        let err = ServerContext::start(Arc::new(config.clone())).await.err().unwrap();
        assert_eq!(err.category(), "transport");
        assert!(!config.daemon.pid_file.exists());
    }
}
