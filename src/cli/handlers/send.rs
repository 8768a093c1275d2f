//! Send handler: emits one event through the client SDK

use super::super::CliContext;
use crate::client::RelayClient;
use crate::shared::protocol::{Level, NotificationEvent};
use anyhow::Result;

/// Everything `send` was asked to do
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub program: String,
    pub title: String,
    pub details: String,
    pub tag: Option<String>,
    pub level: String,
    pub server: Option<String>,
    pub backup: Option<String>,
    pub no_ack: bool,
}

impl SendRequest {
    pub fn event(&self) -> NotificationEvent {
        let mut event = NotificationEvent::new(self.program.clone(), self.title.clone())
            .with_details(self.details.clone())
            .with_level(Level::from(self.level.as_str()));
        if let Some(tag) = &self.tag {
            event = event.with_tag(tag.clone());
        }
        event
    }
}

/// Handler for the send command
pub struct SendHandler<'a> {
    context: &'a CliContext,
}

impl<'a> SendHandler<'a> {
    pub fn new(context: &'a CliContext) -> Self {
        Self { context }
    }

    /// Client settings from the configuration, overridden by the flags
    pub fn client(&self, request: &SendRequest) -> RelayClient {
        let mut config = self.context.config().client.clone();
        if request.server.is_some() {
            config.primary = request.server.clone();
        }
        if request.backup.is_some() {
            config.backup = request.backup.clone();
        }
        if request.no_ack {
            config.await_ack = false;
        }
        RelayClient::from_config(&config)
    }

    pub async fn handle_send(&self, request: SendRequest) -> Result<()> {
        let event = request.event();
        event.validate()?;

        let outcome = self.client(&request).send(&event).await?;
        match outcome.acknowledgement {
            Some(ack) => {
                println!("{}", ack.encode()?.trim_end());
                if !ack.is_success() {
                    anyhow::bail!("Relay at {} reported an error: {}", outcome.address, ack.message);
                }
            }
            None => println!("Sent to {} (no acknowledgement)", outcome.address),
        }
        Ok(())
    }
}

super::traits::impl_context_handler!(SendHandler<'a>);

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SendRequest {
        SendRequest {
            program: "svc-a".to_string(),
            title: "disk full".to_string(),
            details: String::new(),
            tag: Some("disk".to_string()),
            level: "ERROR".to_string(),
            server: None,
            backup: None,
            no_ack: false,
        }
    }

    #[test]
    fn test_request_builds_event() {
        let event = request().event();
        assert_eq!(event.source, "svc-a");
        assert_eq!(event.level, Level::Error);
        assert_eq!(event.tag.as_deref(), Some("disk"));
    }

    #[test]
    fn test_flags_override_configured_addresses() {
        let context = CliContext::from_config(crate::shared::config::Config::default(), false);
        let handler = SendHandler::new(&context);

        let mut request = request();
        request.server = Some("10.0.0.1:9123".to_string());
        request.backup = Some("10.0.0.2:9123".to_string());
        let client = handler.client(&request);

        assert_eq!(client.primary(), Some("10.0.0.1:9123"));
        assert_eq!(client.backup(), Some("10.0.0.2:9123"));
    }
}
