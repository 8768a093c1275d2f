//! Delivery sinks
//!
//! Exactly one sink is active per server process, chosen by
//! `delivery.sink`:
//!
//! - **mail**: HTML mail over SMTP or through a submission program
//! - **sound**: local sound file and optional speech
//! - **webhook**: JSON post to a chat webhook

pub mod mail;
pub mod sound;
pub mod traits;
pub mod webhook;

pub use mail::{CommandTransport, MailEnvelope, MailSink, MailTransport, SmtpTransport};
pub use sound::{CommandPlayer, SoundPlayer, SoundSink};
pub use traits::{DeliveryReceipt, DeliverySink};
pub use webhook::WebhookSink;

use crate::daemon::templates::MessageRenderer;
use crate::errors::AppResult;
use crate::shared::config::{DeliveryConfig, SinkKind};
use std::sync::Arc;

/// Build the sink selected in `config`
pub fn build_sink(
    config: &DeliveryConfig,
    renderer: Arc<MessageRenderer>,
) -> AppResult<Arc<dyn DeliverySink>> {
    let sink: Arc<dyn DeliverySink> = match config.sink {
        SinkKind::Mail => Arc::new(MailSink::new(&config.mail, renderer)?),
        SinkKind::Sound => Arc::new(SoundSink::new(&config.sound)),
        SinkKind::Webhook => Arc::new(WebhookSink::new(&config.webhook)?),
    };
    Ok(sink)
}
