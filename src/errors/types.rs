//! Error types for the notification relay
//!
//! Errors are grouped by the component that raises them so the connection
//! handler can decide what ends up in an acknowledgement and the client can
//! decide when to fail over to the backup address.

use std::path::PathBuf;
use thiserror::Error;

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    // Wire protocol errors
    #[error("Invalid data: {reason}")]
    Protocol {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Event log errors
    #[error("Failed to write event log '{path}': {operation}")]
    Persistence {
        path: PathBuf,
        operation: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Delivery sink errors
    #[error("Delivery via {sink} failed: {reason}")]
    Delivery {
        sink: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Listener errors
    #[error("Transport error on {address}: {operation}")]
    Transport {
        address: String,
        operation: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Client-side connection errors
    #[error("Failed to connect to {address}")]
    Connect {
        address: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Timed out after {timeout_ms} ms connecting to {address}")]
    ConnectTimeout {
        address: String,
        timeout_ms: u64,
    },

    #[error("Timed out after {timeout_ms} ms while {operation}")]
    Timeout {
        operation: String,
        timeout_ms: u64,
    },

    #[error("No relay server address configured")]
    NotConfigured,

    // Process lifecycle errors
    #[error("Relay daemon is already running (PID: {pid})")]
    AlreadyRunning {
        pid: u32,
    },

    #[error("Failed to detach from terminal: {reason}")]
    Detach {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Invalid configuration value for '{key}': {value}")]
    InvalidConfigValue {
        key: String,
        value: String,
    },

    // I/O errors
    #[error("File I/O error for '{path}': {operation}")]
    Io {
        path: PathBuf,
        operation: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{message}")]
    Other {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create a new Protocol error
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a new Protocol error with source
    pub fn protocol_with_source(
        reason: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Protocol {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new Persistence error with source
    pub fn persistence_with_source(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Persistence {
            path: path.into(),
            operation: operation.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new Delivery error
    pub fn delivery(sink: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Delivery {
            sink: sink.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a new Delivery error with source
    pub fn delivery_with_source(
        sink: impl Into<String>,
        reason: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Delivery {
            sink: sink.into(),
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new Transport error with source
    pub fn transport_with_source(
        address: impl Into<String>,
        operation: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            address: address.into(),
            operation: operation.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new Connect error with source
    pub fn connect_with_source(
        address: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connect {
            address: address.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new ConnectTimeout error
    pub fn connect_timeout(address: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self::ConnectTimeout {
            address: address.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Create a new Timeout error
    pub fn timeout(operation: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Create a new Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new Config error with source
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new I/O error with source
    pub fn io_with_source(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Io {
            path: path.into(),
            operation: operation.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new Detach error with source
    pub fn detach_with_source(
        reason: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Detach {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether the client should retry this failure against the backup address.
    ///
    /// Only failures to establish the connection qualify; once a connection is
    /// open the send is considered attempted and is never repeated.
    pub fn triggers_failover(&self) -> bool {
        match self {
            Self::Connect { .. } | Self::ConnectTimeout { .. } => true,
            _ => false,
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Protocol { .. } => "protocol",
            Self::Persistence { .. } => "persistence",
            Self::Delivery { .. } => "delivery",
            Self::Transport { .. } => "transport",
            Self::Connect { .. }
            | Self::ConnectTimeout { .. }
            | Self::Timeout { .. }
            | Self::NotConfigured => "connect",
            Self::AlreadyRunning { .. } | Self::Detach { .. } => "daemon",
            Self::Config { .. } | Self::InvalidConfigValue { .. } => "config",
            Self::Io { .. } => "io",
            Self::Other { .. } => "internal",
        }
    }

    /// Message used in an error acknowledgement.
    ///
    /// Includes the innermost source so the client sees the underlying cause.
    pub fn ack_message(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            if std::error::Error::source(cause).is_none() {
                message = format!("{message}: {cause}");
            }
            source = std::error::Error::source(cause);
        }
        message
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        let operation = match err.kind() {
            std::io::ErrorKind::NotFound => "file not found",
            std::io::ErrorKind::PermissionDenied => "permission denied",
            std::io::ErrorKind::ConnectionRefused => "connection refused",
            std::io::ErrorKind::TimedOut => "timeout",
            _ => "I/O operation",
        }
        .to_string();

        Self::Io {
            path: PathBuf::from("unknown"),
            operation,
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        let reason = if err.is_syntax() {
            format!("JSON syntax error at line {} column {}", err.line(), err.column())
        } else if err.is_eof() {
            "unexpected end of JSON input".to_string()
        } else {
            "JSON data error".to_string()
        };
        Self::protocol_with_source(reason, err)
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::config_with_source("Failed to parse config file", err)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        let reason = if err.is_timeout() {
            "webhook request timed out".to_string()
        } else if let Some(status) = err.status() {
            format!("webhook returned HTTP {}", status.as_u16())
        } else {
            "webhook request failed".to_string()
        };
        Self::delivery_with_source("webhook", reason, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = AppError::config("test config error");
        assert_eq!(err.to_string(), "Configuration error: test config error");
    }

    #[test]
    fn test_error_category() {
        assert_eq!(AppError::protocol("bad").category(), "protocol");
        assert_eq!(AppError::delivery("mail", "down").category(), "delivery");
        assert_eq!(AppError::NotConfigured.category(), "connect");
        assert_eq!(
            AppError::connect_timeout("10.0.0.1:9123", std::time::Duration::from_secs(1)).to_string(),
            "Timed out after 1000 ms connecting to 10.0.0.1:9123"
        );
    }

    #[test]
    fn test_detach_keeps_source() {
        let cause = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "chdir refused");
        let err = AppError::detach_with_source("unable to change directory", cause);
        assert_eq!(err.category(), "daemon");
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.ack_message().ends_with("chdir refused"));
    }

    #[test]
    fn test_failover_classification() {
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(AppError::connect_with_source("127.0.0.1:1", refused).triggers_failover());
        assert!(AppError::connect_timeout("10.0.0.1:9123", std::time::Duration::from_millis(500))
            .triggers_failover());
        // an operation name alone never decides failover
        assert!(!AppError::timeout("connecting to 10.0.0.1:9123", std::time::Duration::from_millis(500))
            .triggers_failover());
        assert!(!AppError::timeout("sending event", std::time::Duration::from_secs(1)).triggers_failover());
        assert!(!AppError::NotConfigured.triggers_failover());
    }

    #[test]
    fn test_ack_message_includes_root_cause() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only file system");
        let err = AppError::persistence_with_source("/var/log/relay.log", "append entry", io_err);
        let message = err.ack_message();
        assert!(message.contains("/var/log/relay.log"));
        assert!(message.ends_with("read-only file system"));
    }

    #[test]
    fn test_json_error_is_protocol() {
        let err: AppError = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err().into();
        assert_eq!(err.category(), "protocol");
        assert!(err.to_string().starts_with("Invalid data"));
    }
}
