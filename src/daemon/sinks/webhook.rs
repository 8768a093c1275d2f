//! Chat webhook delivery
//!
//! Posts `{"content": "<subject> <title>"}` to a Discord-style webhook.

use super::traits::{DeliveryReceipt, DeliverySink};
use crate::daemon::templates::RenderedMessage;
use crate::errors::{AppError, AppResult};
use crate::shared::config::WebhookConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::info;
use url::Url;

pub struct WebhookSink {
    client: Client,
    url: Url,
}

impl WebhookSink {
    pub fn new(config: &WebhookConfig) -> AppResult<Self> {
        let raw = config
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| AppError::config("webhook sink selected but delivery.webhook.url is not set"))?;
        let url = Url::parse(raw).map_err(|_| AppError::InvalidConfigValue {
            key: "delivery.webhook.url".to_string(),
            value: raw.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::InvalidConfigValue {
                key: "delivery.webhook.url".to_string(),
                value: raw.to_string(),
            });
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .user_agent(concat!("notify-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::config_with_source("Failed to build HTTP client", e))?;

        Ok(Self { client, url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

/// Request body for one message
pub fn payload(message: &RenderedMessage) -> serde_json::Value {
    json!({ "content": format!("{} {}", message.subject, message.title) })
}

#[async_trait]
impl DeliverySink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(&self, message: &RenderedMessage) -> AppResult<DeliveryReceipt> {
        self.client
            .post(self.url.clone())
            .json(&payload(message))
            .send()
            .await?
            .error_for_status()?;

        info!("Webhook delivered '{}' to {}", message.subject, self.url.host_str().unwrap_or("?"));
        Ok(DeliveryReceipt::default())
    }
}
