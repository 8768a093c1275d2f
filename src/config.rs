use crate::errors::{AppError, AppResult};
use directories::BaseDirs;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// Re-export shared types for convenience
pub use crate::shared::config::{
    ClientConfig, Config, DaemonConfig, DeliveryConfig, EventLogConfig, MailConfig,
    RotationStrategy, ServerConfig, SinkKind, SmtpConfig, SmtpTls, SoundConfig,
};

/// Configuration manager for the notification relay
///
/// Loads the TOML configuration file and then applies `NF_*` environment
/// overrides on top of it. The resulting [`Config`] is handed out by
/// reference and never changes for the lifetime of the process.
///
/// # Example
///
/// ```rust,no_run
/// use notify_relay::config::ConfigManager;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let manager = ConfigManager::load(None)?;
///     println!("Listening on port {}", manager.config().server.port);
///     Ok(())
/// }
/// ```
pub struct ConfigManager {
    config_path: PathBuf,
    config: Config,
}

impl ConfigManager {
    /// Load configuration from `path`, or from the default location
    ///
    /// A missing file is not an error: built-in defaults are used and the
    /// environment overrides still apply.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if an environment override holds a value of the wrong type.
    pub fn load(path: Option<PathBuf>) -> AppResult<Self> {
        let config_path = match path {
            Some(path) => path,
            None => Self::default_config_path()?,
        };

        let mut config = Self::read_file(&config_path)?;
        apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;

        Ok(ConfigManager {
            config_path,
            config,
        })
    }

    /// Build a manager around an already assembled configuration
    pub fn from_config(config_path: PathBuf, config: Config) -> Self {
        ConfigManager {
            config_path,
            config,
        }
    }

    /// `~/.notify-relay/config.toml`
    pub fn default_config_path() -> AppResult<PathBuf> {
        let base_dirs =
            BaseDirs::new().ok_or_else(|| AppError::config("Failed to get base directories"))?;
        Ok(base_dirs.home_dir().join(".notify-relay").join("config.toml"))
    }

    fn read_file(path: &Path) -> AppResult<Config> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(path)
            .map_err(|e| AppError::io_with_source(path, "read config file", e))?;
        Ok(toml::from_str(&content)?)
    }

    /// Write the current configuration back to its file
    pub fn save(&self) -> AppResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::io_with_source(parent, "create config directory", e))?;
        }
        let content = toml::to_string_pretty(&self.config)
            .map_err(|e| AppError::config_with_source("Failed to serialize config", e))?;
        fs::write(&self.config_path, content)
            .map_err(|e| AppError::io_with_source(&self.config_path, "write config file", e))?;
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn into_config(self) -> Config {
        self.config
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> AppResult<T> {
    value.trim().parse().map_err(|_| AppError::InvalidConfigValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_flag(key: &str, value: &str) -> AppResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::InvalidConfigValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Split a recipient list on `;` or `,`, dropping blanks
pub fn split_recipients(value: &str) -> Vec<String> {
    value
        .split([';', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Apply `NF_*` and `NOTIFICATION_SERVER_*` overrides
///
/// `lookup` abstracts the environment so callers can feed a fixed map.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> AppResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("NF_BIND") {
        config.server.bind = v;
    }
    if let Some(v) = lookup("NF_PORT") {
        config.server.port = parse_value("NF_PORT", &v)?;
    }
    if let Some(v) = lookup("NF_BUFFER_SIZE") {
        config.server.buffer_size = parse_value("NF_BUFFER_SIZE", &v)?;
    }
    if let Some(v) = lookup("NF_READ_TIMEOUT_MS") {
        config.server.read_timeout_ms = parse_value("NF_READ_TIMEOUT_MS", &v)?;
    }
    if let Some(v) = lookup("NF_CONCURRENT") {
        config.server.concurrent = parse_flag("NF_CONCURRENT", &v)?;
    }

    if let Some(v) = lookup("NF_PID_FILE") {
        config.daemon.pid_file = PathBuf::from(v);
    }
    if let Some(v) = lookup("NF_LOG_FILE") {
        config.log.path = PathBuf::from(v);
    }
    if let Some(v) = lookup("NF_MAX_LOG_SIZE") {
        config.log.max_bytes = parse_value("NF_MAX_LOG_SIZE", &v)?;
    }
    if let Some(v) = lookup("NF_MAX_LOG_LINES") {
        config.log.max_lines = parse_value("NF_MAX_LOG_LINES", &v)?;
    }
    if let Some(v) = lookup("NF_CLEAN_STRATEGY") {
        config.log.strategy = match v.trim().to_ascii_lowercase().as_str() {
            "size" => RotationStrategy::Size,
            "lines" | "count" => RotationStrategy::Lines,
            _ => {
                return Err(AppError::InvalidConfigValue {
                    key: "NF_CLEAN_STRATEGY".to_string(),
                    value: v,
                })
            }
        };
    }

    if let Some(v) = lookup("NF_DELIVERY") {
        config.delivery.sink = match v.trim().to_ascii_lowercase().as_str() {
            "mail" => SinkKind::Mail,
            "sound" => SinkKind::Sound,
            "webhook" | "discord" => SinkKind::Webhook,
            _ => {
                return Err(AppError::InvalidConfigValue {
                    key: "NF_DELIVERY".to_string(),
                    value: v,
                })
            }
        };
    }

    let mail = &mut config.delivery.mail;
    if let Some(v) = lookup("NF_ENABLE_MAIL") {
        mail.enabled = parse_flag("NF_ENABLE_MAIL", &v)?;
    }
    if let Some(v) = lookup("NF_SMTP_HOST") {
        mail.smtp.host = v;
    }
    if let Some(v) = lookup("NF_SMTP_PORT") {
        mail.smtp.port = parse_value("NF_SMTP_PORT", &v)?;
    }
    if let Some(v) = lookup("NF_SMTP_TLS") {
        mail.smtp.tls = match v.trim().to_ascii_lowercase().as_str() {
            "wrapper" | "ssl" => SmtpTls::Wrapper,
            "starttls" => SmtpTls::StartTls,
            "none" => SmtpTls::None,
            _ => {
                return Err(AppError::InvalidConfigValue {
                    key: "NF_SMTP_TLS".to_string(),
                    value: v,
                })
            }
        };
    }
    if let Some(v) = lookup("NF_SMTP_USER") {
        mail.smtp.user = v;
    }
    if let Some(v) = lookup("NF_SMTP_PASS") {
        mail.smtp.password = Some(v);
    }
    if let Some(v) = lookup("NF_MAIL_FROM") {
        mail.from = v;
    }
    if let Some(v) = lookup("NF_MAIL_TO") {
        mail.to = split_recipients(&v);
    }
    if let Some(v) = lookup("NF_MAIL_COMMAND") {
        mail.command = v;
    }

    let sound = &mut config.delivery.sound;
    if let Some(v) = lookup("NF_ENABLE_SOUND") {
        sound.enabled = parse_flag("NF_ENABLE_SOUND", &v)?;
    }
    if let Some(v) = lookup("NF_SOUND_FILE") {
        sound.file = PathBuf::from(v);
    }
    if let Some(v) = lookup("NF_SOUND_PLAYER") {
        sound.player = v;
    }
    if let Some(v) = lookup("NF_SAY_MESSAGE") {
        sound.say_message = parse_flag("NF_SAY_MESSAGE", &v)?;
    }

    if let Some(v) = lookup("NF_WEBHOOK_URL") {
        config.delivery.webhook.url = Some(v);
    }

    if let Some(host) = lookup("NOTIFICATION_SERVER_HOST") {
        let port = match lookup("NOTIFICATION_SERVER_PORT") {
            Some(p) => parse_value::<u16>("NOTIFICATION_SERVER_PORT", &p)?,
            None => config.server.port,
        };
        config.client.primary = Some(format!("{host}:{port}"));
    }
    if let Some(host) = lookup("NOTIFICATION_SERVER_BACKUP_HOST") {
        let port = match lookup("NOTIFICATION_SERVER_BACKUP_PORT") {
            Some(p) => parse_value::<u16>("NOTIFICATION_SERVER_BACKUP_PORT", &p)?,
            None => config.server.port,
        };
        config.client.backup = Some(format!("{host}:{port}"));
    }

    Ok(())
}
