use crate::daemon::templates::RenderedMessage;
use crate::errors::AppResult;
use async_trait::async_trait;

/// Where an accepted event ends up after it has been logged
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Short name used in logs and error messages
    fn name(&self) -> &'static str;

    /// Deliver one rendered event
    ///
    /// A sink that is configured but switched off returns an empty receipt
    /// rather than an error.
    async fn deliver(&self, message: &RenderedMessage) -> AppResult<DeliveryReceipt>;
}

/// What a sink reports back about a successful delivery
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Addresses the message was submitted to, when the sink has any
    pub recipients: Option<Vec<String>>,
}

impl DeliveryReceipt {
    pub fn to_recipients(recipients: Vec<String>) -> Self {
        Self {
            recipients: Some(recipients),
        }
    }
}
