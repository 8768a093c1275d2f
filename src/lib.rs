//! Notify Relay Library
//!
//! A small alerting relay: a TCP daemon that records every notification
//! event in a rotating log and delivers it by mail, sound or webhook, plus
//! a client SDK that fails over from a primary to a backup relay.

pub mod cli;
pub mod client;
pub mod config;
pub mod daemon;
pub mod errors;
pub mod shared;

// Re-export commonly used types for convenience
pub use client::{BlockingRelayClient, NotifyOutcome, RelayClient};
pub use config::{Config, ConfigManager};
pub use errors::{AppError, AppResult};
pub use shared::protocol::{Acknowledgement, Level, NotificationEvent};
