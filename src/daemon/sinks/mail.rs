//! Mail delivery
//!
//! The message is built here as an HTML document and handed to a
//! [`MailTransport`]. With `smtp.host` set it is submitted to that server
//! over SMTP; otherwise it is piped into a local submission program
//! (`sendmail -t -oi` unless configured otherwise).

use super::traits::{DeliveryReceipt, DeliverySink};
use crate::config::split_recipients;
use crate::daemon::templates::{MessageRenderer, RenderedMessage};
use crate::errors::{AppError, AppResult};
use crate::shared::config::{MailConfig, SmtpConfig, SmtpTls};
use async_trait::async_trait;
use lettre::address::Envelope;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

/// A fully built message ready for submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailEnvelope {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
}

impl MailEnvelope {
    /// Internet message format with an encoded subject and an HTML body
    pub fn to_message(&self) -> String {
        let mut message = String::with_capacity(self.html.len() + 256);
        message.push_str(&format!("From: {}\r\n", self.from));
        message.push_str(&format!("To: {}\r\n", self.to.join(", ")));
        message.push_str(&format!("Subject: {}\r\n", encode_header(&self.subject)));
        message.push_str("MIME-Version: 1.0\r\n");
        message.push_str("Content-Type: text/html; charset=utf-8\r\n");
        message.push_str("Content-Transfer-Encoding: 8bit\r\n");
        message.push_str("\r\n");
        message.push_str(&self.html);
        message
    }
}

/// RFC 2047 Q-encoding for header values that are not plain ASCII
fn encode_header(value: &str) -> String {
    if value.bytes().all(|b| b.is_ascii_graphic() || b == b' ') {
        return value.to_string();
    }

    // encoded words may not exceed 75 characters, split on char boundaries
    const MAX_PAYLOAD: usize = 75 - "=?UTF-8?Q??=".len();
    let mut words = Vec::new();
    let mut current = String::new();
    for ch in value.chars() {
        let mut encoded = String::new();
        let mut buf = [0u8; 4];
        for byte in ch.encode_utf8(&mut buf).bytes() {
            match byte {
                b' ' => encoded.push('_'),
                b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'.' | b'!' | b'*' | b'+' | b'/' => {
                    encoded.push(byte as char)
                }
                _ => encoded.push_str(&format!("={:02X}", byte)),
            }
        }
        if current.len() + encoded.len() > MAX_PAYLOAD {
            words.push(std::mem::take(&mut current));
        }
        current.push_str(&encoded);
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
        .iter()
        .map(|word| format!("=?UTF-8?Q?{}?=", word))
        .collect::<Vec<_>>()
        .join("\r\n ")
}

/// Hands a built message to the outside world
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn submit(&self, envelope: &MailEnvelope) -> AppResult<()>;
}

/// Bare address out of `Name <addr>` or `addr`
fn parse_address(mailbox: &str) -> AppResult<Address> {
    let address = match (mailbox.rfind('<'), mailbox.rfind('>')) {
        (Some(open), Some(close)) if open < close => &mailbox[open + 1..close],
        _ => mailbox,
    };
    address.trim().parse().map_err(|e| {
        AppError::delivery_with_source("mail", format!("invalid address '{}'", mailbox), e)
    })
}

/// Submits mail to an SMTP server
pub struct SmtpTransport {
    endpoint: String,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpTransport {
    pub fn from_config(config: &SmtpConfig) -> AppResult<Self> {
        let builder = match config.tls {
            SmtpTls::Wrapper => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host),
            SmtpTls::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host),
            SmtpTls::None => Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(
                &config.host,
            )),
        }
        .map_err(|e| {
            AppError::config_with_source(format!("Invalid SMTP host '{}'", config.host), e)
        })?;

        let mut builder = builder.port(config.port);
        if !config.user.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.user.clone(),
                config.password.clone().unwrap_or_default(),
            ));
        }

        Ok(Self {
            endpoint: format!("{}:{}", config.host, config.port),
            mailer: builder.build(),
        })
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn submit(&self, envelope: &MailEnvelope) -> AppResult<()> {
        let from = parse_address(&envelope.from)?;
        let to = envelope
            .to
            .iter()
            .map(|recipient| parse_address(recipient))
            .collect::<AppResult<Vec<_>>>()?;
        let smtp_envelope = Envelope::new(Some(from), to)
            .map_err(|e| AppError::delivery_with_source("mail", "invalid envelope", e))?;

        let response = self
            .mailer
            .send_raw(&smtp_envelope, envelope.to_message().as_bytes())
            .await
            .map_err(|e| {
                AppError::delivery_with_source(
                    "mail",
                    format!("SMTP submission to {} failed", self.endpoint),
                    e,
                )
            })?;
        debug!("SMTP server {} answered {}", self.endpoint, response.code());
        Ok(())
    }
}

/// Submits mail by running a local program with the message on stdin
#[derive(Debug, Clone)]
pub struct CommandTransport {
    command: String,
    args: Vec<String>,
}

impl CommandTransport {
    pub fn from_config(config: &MailConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
        }
    }
}

#[async_trait]
impl MailTransport for CommandTransport {
    async fn submit(&self, envelope: &MailEnvelope) -> AppResult<()> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AppError::delivery_with_source("mail", format!("failed to start '{}'", self.command), e)
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(envelope.to_message().as_bytes())
                .await
                .map_err(|e| AppError::delivery_with_source("mail", "failed to write message", e))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| AppError::delivery_with_source("mail", "submission program failed", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::delivery(
                "mail",
                format!("'{}' exited with {}: {}", self.command, output.status, stderr.trim()),
            ));
        }
        Ok(())
    }
}

pub struct MailSink {
    enabled: bool,
    from: String,
    recipients: Vec<String>,
    host: String,
    renderer: Arc<MessageRenderer>,
    transport: Arc<dyn MailTransport>,
}

impl MailSink {
    /// Sink over SMTP when a host is configured, the submission program otherwise
    pub fn new(config: &MailConfig, renderer: Arc<MessageRenderer>) -> AppResult<Self> {
        let transport: Arc<dyn MailTransport> = if config.smtp.host.trim().is_empty() {
            Arc::new(CommandTransport::from_config(config))
        } else {
            Arc::new(SmtpTransport::from_config(&config.smtp)?)
        };
        Ok(Self::with_transport(config, renderer, transport))
    }

    pub fn with_transport(
        config: &MailConfig,
        renderer: Arc<MessageRenderer>,
        transport: Arc<dyn MailTransport>,
    ) -> Self {
        let recipients = config
            .to
            .iter()
            .flat_map(|entry| split_recipients(entry))
            .collect();
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "localhost".to_string());

        Self {
            enabled: config.enabled,
            from: config.from.clone(),
            recipients,
            host,
            renderer,
            transport,
        }
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }
}

#[async_trait]
impl DeliverySink for MailSink {
    fn name(&self) -> &'static str {
        "mail"
    }

    async fn deliver(&self, message: &RenderedMessage) -> AppResult<DeliveryReceipt> {
        if !self.enabled {
            debug!("Mail delivery disabled, skipping '{}'", message.subject);
            return Ok(DeliveryReceipt::default());
        }
        if self.recipients.is_empty() {
            return Err(AppError::delivery("mail", "no recipients configured"));
        }

        let envelope = MailEnvelope {
            from: self.from.clone(),
            to: self.recipients.clone(),
            subject: message.subject.clone(),
            html: self.renderer.render_mail_html(message, &self.host)?,
        };
        self.transport.submit(&envelope).await?;

        info!(
            "Mail '{}' submitted to {}",
            envelope.subject,
            envelope.to.join(", ")
        );
        Ok(DeliveryReceipt::to_recipients(envelope.to))
    }
}
