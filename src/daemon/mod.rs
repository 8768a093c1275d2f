//! Relay server
//!
//! This module provides:
//! - The process-wide server context (socket, PID file, event log)
//! - The accept loop and per-connection handling
//! - The bounded event log
//! - Delivery sinks and message rendering
//! - Background-service and signal plumbing

pub mod context;
pub mod detach;
pub mod event_log;
pub mod handler;
pub mod pid_file;
pub mod server;
pub mod signals;
pub mod sinks;
pub mod templates;

// Re-export commonly used types
pub use context::ServerContext;
pub use detach::{service_mode, ForkDetach, Foreground, ServiceMode};
pub use event_log::{EventLog, LogEntry};
pub use handler::{ConnectionHandler, HandleOutcome};
pub use pid_file::{is_process_running, running_pid, PidFile};
pub use server::{RelayServer, ServerState};
pub use signals::shutdown_on_signal;
pub use sinks::{build_sink, DeliveryReceipt, DeliverySink};
pub use templates::{MessageRenderer, RenderedMessage};
