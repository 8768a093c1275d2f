//! Per-connection request handling
//!
//! One connection carries exactly one request line and receives exactly one
//! acknowledgement line, except when the client never completes its request
//! in time; such connections are dropped without a reply.

use super::event_log::{EventLog, LogEntry};
use super::sinks::{DeliveryReceipt, DeliverySink};
use super::templates::MessageRenderer;
use crate::errors::{AppError, AppResult, ErrorContextExt};
use crate::shared::config::ServerConfig;
use crate::shared::protocol::{Acknowledgement, NotificationEvent};
use futures::StreamExt;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::{debug, error, info, warn};

/// What happened to one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    /// An acknowledgement was written back
    Responded(Acknowledgement),
    /// The connection was dropped without a reply
    Abandoned(AbandonReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    ReadTimeout,
    ClosedEarly,
    ReadFailed,
}

/// Shared state every connection needs; cheap to clone
#[derive(Clone)]
pub struct ConnectionHandler {
    log: Arc<EventLog>,
    sink: Arc<dyn DeliverySink>,
    renderer: Arc<MessageRenderer>,
    read_timeout: Duration,
    delivery_timeout: Duration,
    buffer_size: usize,
}

impl ConnectionHandler {
    pub fn new(
        config: &ServerConfig,
        log: Arc<EventLog>,
        sink: Arc<dyn DeliverySink>,
        renderer: Arc<MessageRenderer>,
    ) -> Self {
        Self {
            log,
            sink,
            renderer,
            read_timeout: config.read_timeout(),
            delivery_timeout: config.delivery_timeout(),
            buffer_size: config.buffer_size.max(1),
        }
    }

    pub fn renderer(&self) -> &Arc<MessageRenderer> {
        &self.renderer
    }

    /// Serve one connection to completion
    pub async fn handle<S>(&self, mut stream: S, peer: &str) -> AppResult<HandleOutcome>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        // a final line without `\n` is still a request once the peer closes
        let mut framed =
            FramedRead::new(&mut stream, LinesCodec::new_with_max_length(self.buffer_size));
        let read = tokio::time::timeout(self.read_timeout, framed.next()).await;
        drop(framed);

        let ack = match read {
            Err(_) => {
                debug!("{}: no complete request within {:?}", peer, self.read_timeout);
                return Ok(HandleOutcome::Abandoned(AbandonReason::ReadTimeout));
            }
            Ok(None) => {
                debug!("{}: connection closed without a request", peer);
                return Ok(HandleOutcome::Abandoned(AbandonReason::ClosedEarly));
            }
            Ok(Some(Ok(line))) if line.trim().is_empty() => {
                debug!("{}: connection closed without a request", peer);
                return Ok(HandleOutcome::Abandoned(AbandonReason::ClosedEarly));
            }
            Ok(Some(Ok(line))) => self.process(&line, peer).await,
            Ok(Some(Err(LinesCodecError::MaxLineLengthExceeded))) => {
                warn!("{}: request exceeds {} bytes", peer, self.buffer_size);
                Acknowledgement::error(AppError::protocol("request too large").to_string())
            }
            Ok(Some(Err(LinesCodecError::Io(e)))) if e.kind() == io::ErrorKind::InvalidData => {
                let e = AppError::protocol_with_source("request is not valid UTF-8", e);
                warn!("{}: rejected request: {}", peer, e);
                Acknowledgement::error(e.ack_message())
            }
            Ok(Some(Err(LinesCodecError::Io(e)))) => {
                warn!("{}: failed to read request: {}", peer, e);
                return Ok(HandleOutcome::Abandoned(AbandonReason::ReadFailed));
            }
        };

        self.respond(&mut stream, &ack, peer).await?;
        Ok(HandleOutcome::Responded(ack))
    }

    /// Decode, log, deliver and build the acknowledgement
    async fn process(&self, line: &str, peer: &str) -> Acknowledgement {
        let event = match NotificationEvent::decode(line) {
            Ok(event) => event,
            Err(e) => {
                warn!("{}: rejected request: {}", peer, e);
                return Acknowledgement::error(e.ack_message());
            }
        };

        // a failed append is reported, but delivery is still attempted
        let logged = self.append_to_log(line.trim_end()).await;
        if let Err(e) = &logged {
            error!("{}: {}", peer, e.ack_message());
        }

        let delivered = self.deliver(&event).await;
        if let Err(e) = &delivered {
            error!("{}: {}", peer, e.ack_message());
        }

        match (logged, delivered) {
            (Err(e), _) | (Ok(()), Err(e)) => Acknowledgement::error(e.ack_message()),
            (Ok(()), Ok(receipt)) => {
                info!(
                    "{}: [{}] [{}] {} accepted",
                    peer, event.source, event.level, event.title
                );
                Acknowledgement::success(receipt.recipients)
            }
        }
    }

    async fn append_to_log(&self, raw: &str) -> AppResult<()> {
        let log = Arc::clone(&self.log);
        let entry = LogEntry::new(raw);
        tokio::task::spawn_blocking(move || log.append(&entry))
            .await
            .with_context("event log writer")?
    }

    async fn deliver(&self, event: &NotificationEvent) -> AppResult<DeliveryReceipt> {
        let message = self.renderer.render(event);
        match tokio::time::timeout(self.delivery_timeout, self.sink.deliver(&message)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::delivery(self.sink.name(), "delivery timed out")),
        }
    }

    async fn respond<W>(&self, stream: &mut W, ack: &Acknowledgement, peer: &str) -> AppResult<()>
    where
        W: AsyncWrite + Unpin,
    {
        let line = ack.encode()?;
        stream
            .write_all(line.as_bytes())
            .await
            .map_err(|e| AppError::transport_with_source(peer, "write acknowledgement", e))?;
        stream
            .flush()
            .await
            .map_err(|e| AppError::transport_with_source(peer, "flush acknowledgement", e))?;
        // the peer may already be gone; the reply was written either way
        let _ = stream.shutdown().await;
        Ok(())
    }
}
