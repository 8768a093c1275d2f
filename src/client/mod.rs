//! Client SDK for emitting notifications to the relay
//!
//! [`RelayClient`] encodes one event, connects to the primary address and,
//! only if that connection cannot be established, tries the backup address
//! once. Every step is bounded by its own timeout, so a call never blocks
//! its caller for longer than the configured connect/send/receive windows.
//!
//! ```rust,no_run
//! use notify_relay::client::RelayClient;
//! use notify_relay::shared::protocol::{Level, NotificationEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let client = RelayClient::from_env().unwrap();
//! let event = NotificationEvent::new("backup-job", "nightly backup failed")
//!     .with_details("rsync exited with 23")
//!     .with_level(Level::Error);
//! if !client.notify(&event).await {
//!     eprintln!("relay unreachable");
//! }
//! # }
//! ```

pub mod blocking;

pub use blocking::BlockingRelayClient;

use crate::config::apply_env_overrides;
use crate::errors::{AppError, AppResult};
use crate::shared::config::{ClientConfig, Config};
use crate::shared::protocol::{Acknowledgement, NotificationEvent};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Result of a send that reached a server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyOutcome {
    /// The address that accepted the connection
    pub address: String,
    /// The decoded reply; `None` when it was not awaited, missing or malformed
    pub acknowledgement: Option<Acknowledgement>,
}

impl NotifyOutcome {
    /// Whether the server positively confirmed the event
    pub fn confirmed(&self) -> bool {
        self.acknowledgement
            .as_ref()
            .map(Acknowledgement::is_success)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct RelayClient {
    primary: Option<String>,
    backup: Option<String>,
    connect_timeout: Duration,
    send_timeout: Duration,
    receive_timeout: Duration,
    await_ack: bool,
}

impl RelayClient {
    pub fn from_config(config: &ClientConfig) -> Self {
        fn non_empty(address: &Option<String>) -> Option<String> {
            address
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
        }

        Self {
            primary: non_empty(&config.primary),
            backup: non_empty(&config.backup),
            connect_timeout: config.connect_timeout(),
            send_timeout: config.send_timeout(),
            receive_timeout: config.receive_timeout(),
            await_ack: config.await_ack,
        }
    }

    /// Client configured only from `NOTIFICATION_SERVER_*` variables
    pub fn from_env() -> AppResult<Self> {
        let mut config = Config::default();
        apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
        Ok(Self::from_config(&config.client))
    }

    pub fn primary(&self) -> Option<&str> {
        self.primary.as_deref()
    }

    pub fn backup(&self) -> Option<&str> {
        self.backup.as_deref()
    }

    /// Send `event` and report where it went
    ///
    /// # Errors
    ///
    /// `NotConfigured` without any I/O when no address is set; otherwise the
    /// error of the last connection attempt, or the send failure on the
    /// connection that was established.
    pub async fn send(&self, event: &NotificationEvent) -> AppResult<NotifyOutcome> {
        let addresses: Vec<&str> = self
            .primary
            .as_deref()
            .into_iter()
            .chain(self.backup.as_deref())
            .collect();
        if addresses.is_empty() {
            return Err(AppError::NotConfigured);
        }

        let line = event.encode()?;
        let mut last_error = None;

        for address in addresses {
            let stream = match self.connect(address).await {
                Ok(stream) => stream,
                Err(e) if e.triggers_failover() => {
                    warn!("Relay at {} unreachable: {}", address, e);
                    last_error = Some(e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let acknowledgement = self.exchange(stream, address, &line).await?;
            return Ok(NotifyOutcome {
                address: address.to_string(),
                acknowledgement,
            });
        }

        Err(last_error.unwrap_or(AppError::NotConfigured))
    }

    /// Send `event`, reporting only whether it could be handed to a server
    pub async fn notify(&self, event: &NotificationEvent) -> bool {
        match self.send(event).await {
            Ok(outcome) => {
                debug!("Notification handed to {}", outcome.address);
                true
            }
            Err(e) => {
                warn!("Notification not sent: {}", e);
                false
            }
        }
    }

    async fn connect(&self, address: &str) -> AppResult<TcpStream> {
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(address)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(AppError::connect_with_source(address, e)),
            Err(_) => Err(AppError::connect_timeout(address, self.connect_timeout)),
        }
    }

    /// Write the request and read back at most one reply line
    async fn exchange(
        &self,
        mut stream: TcpStream,
        address: &str,
        line: &str,
    ) -> AppResult<Option<Acknowledgement>> {
        match tokio::time::timeout(self.send_timeout, stream.write_all(line.as_bytes())).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(AppError::transport_with_source(address, "send event", e)),
            Err(_) => return Err(AppError::timeout("sending event", self.send_timeout)),
        }

        if !self.await_ack {
            let _ = stream.shutdown().await;
            return Ok(None);
        }

        let mut reply = String::new();
        let mut reader = BufReader::new(stream);
        match tokio::time::timeout(self.receive_timeout, reader.read_line(&mut reply)).await {
            Ok(Ok(n)) if n > 0 => match Acknowledgement::decode(&reply) {
                Ok(ack) => Ok(Some(ack)),
                Err(e) => {
                    debug!("Unreadable acknowledgement from {}: {}", address, e);
                    Ok(None)
                }
            },
            Ok(Ok(_)) => {
                debug!("{} closed the connection without a reply", address);
                Ok(None)
            }
            Ok(Err(e)) => {
                debug!("Failed to read acknowledgement from {}: {}", address, e);
                Ok(None)
            }
            Err(_) => {
                debug!("No acknowledgement from {} within {:?}", address, self.receive_timeout);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::protocol::AckStatus;
    use std::time::Instant;
    use tokio::net::TcpListener;

    fn config(primary: Option<String>, backup: Option<String>) -> ClientConfig {
        ClientConfig {
            primary,
            backup,
            connect_timeout_ms: 300,
            send_timeout_ms: 300,
            receive_timeout_ms: 300,
            await_ack: true,
        }
    }

    /// Address nothing listens on
    async fn closed_address() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr.to_string()
    }

    /// Accept one connection, read the request line, answer with `reply`
    async fn one_shot_server(reply: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(stream);
            let mut request = String::new();
            reader.read_line(&mut request).await.unwrap();
            reader.get_mut().write_all(reply.as_bytes()).await.unwrap();
            request
        });
        (addr, handle)
    }

    fn event() -> NotificationEvent {
        NotificationEvent::new("svc-a", "disk full")
    }

    #[tokio::test]
    async fn test_not_configured_fails_immediately() {
        let client = RelayClient::from_config(&config(None, Some("  ".to_string())));
        let started = Instant::now();
        assert!(matches!(client.send(&event()).await, Err(AppError::NotConfigured)));
        assert!(!client.notify(&event()).await);
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_sends_to_primary() {
        let (addr, server) = one_shot_server(
            "{\"status\":\"success\",\"message\":\"Notification sent successfully\",\"timestamp\":\"2024-01-01 00:00:00\"}\n",
        )
        .await;
        let client = RelayClient::from_config(&config(Some(addr.clone()), None));

        let outcome = client.send(&event()).await.unwrap();
        assert_eq!(outcome.address, addr);
        assert!(outcome.confirmed());

        let request = server.await.unwrap();
        assert!(request.ends_with('\n'));
        assert!(NotificationEvent::decode(&request).unwrap().timestamp.is_some());
    }

    #[tokio::test]
    async fn test_fails_over_to_backup() {
        let (backup, server) = one_shot_server(
            "{\"status\":\"error\",\"message\":\"Delivery via mail failed\",\"timestamp\":\"2024-01-01 00:00:00\"}\n",
        )
        .await;
        let client = RelayClient::from_config(&config(Some(closed_address().await), Some(backup.clone())));

        let outcome = client.send(&event()).await.unwrap();
        assert_eq!(outcome.address, backup);
        // reached, but not confirmed
        assert_eq!(outcome.acknowledgement.unwrap().status, AckStatus::Error);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_both_unreachable_fails_within_bound() {
        let client = RelayClient::from_config(&config(
            Some(closed_address().await),
            Some(closed_address().await),
        ));

        let started = Instant::now();
        let err = client.send(&event()).await.unwrap_err();
        assert!(err.triggers_failover());
        assert!(started.elapsed() < Duration::from_millis(600));
    }

    #[tokio::test]
    async fn test_malformed_ack_still_counts_as_sent() {
        let (addr, server) = one_shot_server("garbage\n").await;
        let client = RelayClient::from_config(&config(Some(addr), None));

        let outcome = client.send(&event()).await.unwrap();
        assert_eq!(outcome.acknowledgement, None);
        assert!(!outcome.confirmed());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_silent_server_times_out_receive_only() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
            drop(stream);
        });

        let client = RelayClient::from_config(&config(Some(addr), None));
        let started = Instant::now();
        assert!(client.notify(&event()).await);
        assert!(started.elapsed() < Duration::from_millis(900));
        server.abort();
    }
}
