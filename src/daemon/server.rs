use super::context::ServerContext;
use super::handler::{ConnectionHandler, HandleOutcome};
use crate::errors::AppResult;
use flume::Receiver;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Lifecycle of the relay server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Starting,
    Listening,
    Handling,
    ShuttingDown,
    Stopped,
}

/// The accept loop
///
/// Runs until a shutdown request arrives on its channel (or every sender of
/// that channel is gone). Teardown of the [`ServerContext`] happens on
/// every exit path, including a panic inside the loop.
pub struct RelayServer {
    context: ServerContext,
    shutdown_receiver: Receiver<()>,
    state: watch::Sender<ServerState>,
    concurrent: bool,
    poll_interval: Duration,
}

impl RelayServer {
    pub fn new(context: ServerContext, shutdown_receiver: Receiver<()>) -> Self {
        let (state, _) = watch::channel(ServerState::Starting);
        let concurrent = context.config().server.concurrent;
        let poll_interval = context.config().server.poll_interval();

        Self {
            context,
            shutdown_receiver,
            state,
            concurrent,
            poll_interval,
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.context.local_addr()
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    pub async fn run(self) -> AppResult<()> {
        let Self {
            context,
            shutdown_receiver,
            state,
            concurrent,
            poll_interval,
        } = self;

        let context = scopeguard::guard(context, |context| {
            warn!("Accept loop exited abnormally, tearing down");
            if let Err(e) = context.teardown() {
                error!("Teardown failed: {}", e);
            }
        });

        let mut in_flight = JoinSet::new();
        state.send_replace(ServerState::Listening);
        info!("Relay server started (PID: {})", context.pid());

        loop {
            tokio::select! {
                biased;

                _ = shutdown_receiver.recv_async() => {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }

                accepted = context.listener().accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            // per-connection failures never end the loop
                            warn!("Failed to accept connection: {}", e);
                            tokio::time::sleep(poll_interval).await;
                            continue;
                        }
                    };
                    debug!("Accepted connection from {}", peer);

                    if concurrent {
                        while in_flight.try_join_next().is_some() {}
                        let handler = context.handler().clone();
                        in_flight.spawn(async move {
                            serve(&handler, stream, peer).await;
                        });
                        continue;
                    }

                    state.send_replace(ServerState::Handling);
                    tokio::select! {
                        biased;

                        _ = shutdown_receiver.recv_async() => {
                            info!("Shutdown requested, abandoning connection from {}", peer);
                            break;
                        }

                        _ = serve(context.handler(), stream, peer) => {}
                    }
                    state.send_replace(ServerState::Listening);
                }
            }
        }

        state.send_replace(ServerState::ShuttingDown);
        if !in_flight.is_empty() {
            info!("Abandoning {} in-flight connection(s)", in_flight.len());
            in_flight.abort_all();
        }

        let context = scopeguard::ScopeGuard::into_inner(context);
        let result = context.teardown();
        state.send_replace(ServerState::Stopped);
        info!("Relay server stopped");
        result
    }
}

async fn serve(handler: &ConnectionHandler, stream: TcpStream, peer: SocketAddr) {
    let peer = peer.to_string();
    match handler.handle(stream, &peer).await {
        Ok(HandleOutcome::Responded(ack)) => {
            debug!("{}: acknowledged with {:?}", peer, ack.status)
        }
        Ok(HandleOutcome::Abandoned(reason)) => debug!("{}: abandoned ({:?})", peer, reason),
        Err(e) => warn!("{}: {}", peer, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::sinks::{DeliveryReceipt, DeliverySink};
    use crate::daemon::templates::RenderedMessage;
    use crate::shared::config::Config;
    use crate::shared::protocol::Acknowledgement;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    struct NullSink;

    #[async_trait]
    impl DeliverySink for NullSink {
        fn name(&self) -> &'static str {
            "null"
        }

        async fn deliver(&self, _message: &RenderedMessage) -> AppResult<DeliveryReceipt> {
            Ok(DeliveryReceipt::default())
        }
    }

    async fn start(dir: &TempDir, concurrent: bool) -> (RelayServer, Arc<Config>, flume::Sender<()>) {
        let mut config = Config::default();
        config.server.bind = "127.0.0.1".to_string();
        config.server.port = 0;
        config.server.concurrent = concurrent;
        config.log.path = dir.path().join("events.log");
        config.daemon.pid_file = dir.path().join("relay.pid");
        let config = Arc::new(config);

        let context = ServerContext::start_with_sink(Arc::clone(&config), Arc::new(NullSink))
            .await
            .unwrap();
        let (shutdown_tx, shutdown_rx) = flume::unbounded();
        (RelayServer::new(context, shutdown_rx), config, shutdown_tx)
    }

    async fn send_line(addr: SocketAddr, line: &str) -> Acknowledgement {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(line.as_bytes()).await.unwrap();
        let mut reply = String::new();
        BufReader::new(stream).read_line(&mut reply).await.unwrap();
        Acknowledgement::decode(&reply).unwrap()
    }

    #[tokio::test]
    async fn test_serves_until_shutdown() {
        for concurrent in [false, true] {
            let dir = TempDir::new().unwrap();
            let (server, config, shutdown_tx) = start(&dir, concurrent).await;
            let addr = server.local_addr();
            let mut state = server.subscribe();
            let task = tokio::spawn(server.run());

            state.wait_for(|s| *s == ServerState::Listening).await.unwrap();
            for i in 0..3 {
                let ack = send_line(addr, &format!("{{\"program_name\":\"svc\",\"title\":\"n{i}\"}}\n")).await;
                assert!(ack.is_success());
            }

            shutdown_tx.send(()).unwrap();
            task.await.unwrap().unwrap();

            assert_eq!(*state.borrow(), ServerState::Stopped);
            assert!(!config.daemon.pid_file.exists());
            assert!(TcpStream::connect(addr).await.is_err());
            let log = std::fs::read_to_string(&config.log.path).unwrap();
            assert_eq!(log.lines().count(), 3);
        }
    }

    #[tokio::test]
    async fn test_shutdown_abandons_stalled_connection() {
        let dir = TempDir::new().unwrap();
        let (server, config, shutdown_tx) = start(&dir, false).await;
        let addr = server.local_addr();
        let mut state = server.subscribe();
        let task = tokio::spawn(server.run());

        // a client that connects and never sends keeps the loop in Handling
        let _stalled = TcpStream::connect(addr).await.unwrap();
        state.wait_for(|s| *s == ServerState::Handling).await.unwrap();

        let started = std::time::Instant::now();
        shutdown_tx.send(()).unwrap();
        task.await.unwrap().unwrap();

        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(!config.daemon.pid_file.exists());
    }

    #[tokio::test]
    async fn test_dropped_shutdown_sender_stops_server() {
        let dir = TempDir::new().unwrap();
        let (server, config, shutdown_tx) = start(&dir, false).await;
        drop(shutdown_tx);
        server.run().await.unwrap();
        assert!(!config.daemon.pid_file.exists());
    }
}
