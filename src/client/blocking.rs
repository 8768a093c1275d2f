use super::{NotifyOutcome, RelayClient};
use crate::errors::{AppError, AppResult};
use crate::shared::config::ClientConfig;
use crate::shared::protocol::NotificationEvent;
use std::future::Future;
use tokio::runtime::{Handle, RuntimeFlavor};

/// Blocking wrapper around [`RelayClient`] for synchronous callers
#[derive(Debug, Clone)]
pub struct BlockingRelayClient {
    inner: RelayClient,
}

impl BlockingRelayClient {
    pub fn new(inner: RelayClient) -> Self {
        Self { inner }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(RelayClient::from_config(config))
    }

    pub fn from_env() -> AppResult<Self> {
        Ok(Self::new(RelayClient::from_env()?))
    }

    pub fn inner(&self) -> &RelayClient {
        &self.inner
    }

    /// Send an event (blocking)
    pub fn send(&self, event: &NotificationEvent) -> AppResult<NotifyOutcome> {
        block_on(self.inner.send(event))?
    }

    /// Send an event, reporting success as a flag (blocking)
    pub fn notify(&self, event: &NotificationEvent) -> bool {
        block_on(self.inner.notify(event)).unwrap_or(false)
    }
}

/// Drive `future` to completion from synchronous code
fn block_on<F>(future: F) -> AppResult<F::Output>
where
    F: Future + Send,
    F::Output: Send,
{
    match Handle::try_current() {
        // Use block_in_place if we're in a multi-threaded runtime
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            Ok(tokio::task::block_in_place(|| handle.block_on(future)))
        }
        // A current-thread runtime cannot be blocked; run on a helper thread instead
        Ok(_) => std::thread::scope(|scope| {
            scope
                .spawn(|| -> AppResult<F::Output> { Ok(fresh_runtime()?.block_on(future)) })
                .join()
                .map_err(|_| AppError::Other {
                    message: "client worker thread panicked".to_string(),
                    source: None,
                })?
        }),
        // Not in a tokio runtime, create a new one
        Err(_) => Ok(fresh_runtime()?.block_on(future)),
    }
}

fn fresh_runtime() -> AppResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| AppError::Other {
            message: "Failed to create runtime".to_string(),
            source: Some(Box::new(e)),
        })
}
