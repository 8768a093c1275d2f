//! Wire protocol shared by the relay server and its clients
//!
//! One request per connection: the client writes a single JSON object
//! terminated by `\n`, the server answers with a single JSON
//! acknowledgement terminated by `\n` and closes the connection.

use crate::errors::{AppError, AppResult};
use chrono::Local;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Timestamp format used in acknowledgements and event log entries
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Message returned with every successful acknowledgement
pub const SUCCESS_MESSAGE: &str = "Notification sent successfully";

/// Severity of a notification event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Level {
    Debug,
    #[default]
    Info,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Error => "error",
        }
    }
}

impl From<&str> for Level {
    /// Case-insensitive; anything unrecognised degrades to `Info`
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "debug" => Level::Debug,
            "error" => Level::Error,
            _ => Level::Info,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Level::from(raw.as_str()))
    }
}

/// A single notification emitted by a client program
///
/// Serialized with the field names the deployed clients use
/// (`program_name`, `message_tag`, `message_type`). The short names
/// (`source`, `tag`, `level`) and the legacy shape (`message`, `error_tag`,
/// `error_level`) are accepted on input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    #[serde(rename = "program_name", alias = "source", default)]
    pub source: String,
    /// Must be present, may be empty
    #[serde(alias = "message")]
    pub title: String,
    #[serde(default)]
    pub details: String,
    #[serde(
        rename = "message_tag",
        alias = "tag",
        alias = "error_tag",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub tag: Option<String>,
    #[serde(rename = "message_type", alias = "level", alias = "error_level", default)]
    pub level: Level,
    /// Seconds since epoch, set by the sender. Advisory only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl NotificationEvent {
    pub fn new(source: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            title: title.into(),
            details: String::new(),
            tag: None,
            level: Level::default(),
            timestamp: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into();
        self.tag = if tag.is_empty() { None } else { Some(tag) };
        self
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Tag as rendered in subjects, empty when absent
    pub fn tag_str(&self) -> &str {
        self.tag.as_deref().unwrap_or("")
    }

    /// Check the required fields
    pub fn validate(&self) -> AppResult<()> {
        if self.source.trim().is_empty() {
            return Err(AppError::protocol("missing program_name"));
        }
        Ok(())
    }

    /// Decode and validate one request line
    pub fn decode(line: &str) -> AppResult<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(AppError::protocol("empty request"));
        }
        let event: NotificationEvent = serde_json::from_str(trimmed)?;
        event.validate()?;
        Ok(event)
    }

    /// Encode as a newline-terminated request line
    ///
    /// Stamps the current time when the sender did not set one.
    pub fn encode(&self) -> AppResult<String> {
        let mut stamped = self.clone();
        if stamped.timestamp.is_none() {
            stamped.timestamp = Some(chrono::Utc::now().timestamp());
        }
        let mut line = serde_json::to_string(&stamped)
            .map_err(|e| AppError::protocol_with_source("failed to encode event", e))?;
        line.push('\n');
        Ok(line)
    }
}

/// Outcome reported to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Success,
    Error,
}

/// The server's single reply on a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub status: AckStatus,
    pub message: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipients: Option<Vec<String>>,
}

impl Acknowledgement {
    pub fn success(recipients: Option<Vec<String>>) -> Self {
        Self {
            status: AckStatus::Success,
            message: SUCCESS_MESSAGE.to_string(),
            timestamp: now_timestamp(),
            recipients,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: AckStatus::Error,
            message: message.into(),
            timestamp: now_timestamp(),
            recipients: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == AckStatus::Success
    }

    /// Encode as a newline-terminated response line
    pub fn encode(&self) -> AppResult<String> {
        let mut line = serde_json::to_string(self)
            .map_err(|e| AppError::protocol_with_source("failed to encode acknowledgement", e))?;
        line.push('\n');
        Ok(line)
    }

    pub fn decode(line: &str) -> AppResult<Self> {
        Ok(serde_json::from_str(line.trim())?)
    }
}

pub fn now_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}
