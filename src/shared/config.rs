use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for the notification relay
///
/// Contains the listener, event log, delivery sink, daemon and client
/// sections. Loaded once at startup and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub log: EventLogConfig,
    pub delivery: DeliveryConfig,
    pub daemon: DaemonConfig,
    pub client: ClientConfig,
}

/// Listener settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Maximum request size in bytes
    pub buffer_size: usize,
    /// Window in which a full request line must arrive
    pub read_timeout_ms: u64,
    pub delivery_timeout_ms: u64,
    /// Handle connections on separate tasks instead of one at a time
    pub concurrent: bool,
    /// Back-off after a failed accept
    pub poll_interval_ms: u64,
}

/// Rotation policy of the event log
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationStrategy {
    /// Truncate the file once it reaches `max_bytes`
    Size,
    /// Keep only the newest `max_lines` lines
    Lines,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EventLogConfig {
    pub path: PathBuf,
    pub strategy: RotationStrategy,
    pub max_bytes: u64,
    pub max_lines: usize,
}

/// Which delivery sink the server drives
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Mail,
    Sound,
    Webhook,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeliveryConfig {
    pub sink: SinkKind,
    pub mail: MailConfig,
    pub sound: SoundConfig,
    pub webhook: WebhookConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MailConfig {
    pub enabled: bool,
    pub from: String,
    pub to: Vec<String>,
    pub smtp: SmtpConfig,
    /// Submission program, invoked with the message on stdin
    pub command: String,
    pub args: Vec<String>,
}

/// How the SMTP connection is secured
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SmtpTls {
    /// TLS from the first byte (SMTPS, usually port 465)
    #[default]
    Wrapper,
    /// Plain connection upgraded with STARTTLS (usually port 587)
    StartTls,
    /// No encryption; loopback relays only
    None,
}

/// Mail server used when `host` is set
///
/// With an empty host the message goes to the submission program instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub tls: SmtpTls,
    pub user: String,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SoundConfig {
    pub enabled: bool,
    pub file: PathBuf,
    pub player: String,
    pub say_message: bool,
    pub say_command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WebhookConfig {
    pub url: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    pub pid_file: PathBuf,
    pub log_level: String,
    /// Diagnostic log of the relay process itself (not the event log)
    pub diagnostic_log: Option<PathBuf>,
    pub working_directory: PathBuf,
}

/// Settings for the client SDK
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub primary: Option<String>,
    pub backup: Option<String>,
    pub connect_timeout_ms: u64,
    pub send_timeout_ms: u64,
    pub receive_timeout_ms: u64,
    pub await_ack: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig::default(),
            log: EventLogConfig::default(),
            delivery: DeliveryConfig::default(),
            daemon: DaemonConfig::default(),
            client: ClientConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: "0.0.0.0".to_string(),
            port: 9123,
            buffer_size: 64 * 1024,
            read_timeout_ms: 1000,
            delivery_timeout_ms: 10_000,
            concurrent: false,
            poll_interval_ms: 100,
        }
    }
}

impl Default for EventLogConfig {
    fn default() -> Self {
        EventLogConfig {
            path: PathBuf::from("notification_server.log"),
            strategy: RotationStrategy::Size,
            max_bytes: 10 * 1024 * 1024,
            max_lines: 10_000,
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        DeliveryConfig {
            sink: SinkKind::Mail,
            mail: MailConfig::default(),
            sound: SoundConfig::default(),
            webhook: WebhookConfig::default(),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        MailConfig {
            enabled: true,
            from: "notification@example.com".to_string(),
            to: vec!["admin@example.com".to_string()],
            smtp: SmtpConfig {
                host: "smtp.example.com".to_string(),
                port: 465,
                tls: SmtpTls::Wrapper,
                user: String::new(),
                password: None,
            },
            command: "sendmail".to_string(),
            args: vec!["-t".to_string(), "-oi".to_string()],
        }
    }
}

impl Default for SoundConfig {
    fn default() -> Self {
        SoundConfig {
            enabled: true,
            file: PathBuf::from("/System/Library/Sounds/Ping.aiff"),
            player: "afplay".to_string(),
            say_message: false,
            say_command: "say".to_string(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        WebhookConfig {
            url: None,
            timeout_secs: 10,
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        DaemonConfig {
            pid_file: PathBuf::from("/tmp/notification_server.pid"),
            log_level: "info".to_string(),
            diagnostic_log: None,
            working_directory: PathBuf::from("/"),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            primary: None,
            backup: None,
            connect_timeout_ms: 1000,
            send_timeout_ms: 1000,
            receive_timeout_ms: 1000,
            await_ack: true,
        }
    }
}

impl ServerConfig {
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }
}

impl Config {
    /// Anchor relative file paths at `base`
    ///
    /// Must run before the process changes its working directory when it
    /// detaches, otherwise relative paths would land under `/`.
    pub fn resolve_paths(&mut self, base: &Path) {
        fn anchor(path: &mut PathBuf, base: &Path) {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }

        anchor(&mut self.log.path, base);
        anchor(&mut self.daemon.pid_file, base);
        if let Some(diagnostic_log) = self.daemon.diagnostic_log.as_mut() {
            anchor(diagnostic_log, base);
        }
    }
}
