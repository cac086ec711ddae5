use std::fmt::Display;
use std::sync::Arc;

use feeder_core::StatusMessage;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::ports::Transport;

/// Publishes [`StatusMessage`]s through the broker transport.
#[derive(Clone)]
pub struct StatusPublisher {
    transport: Arc<dyn Transport>,
    failure_key: Arc<str>,
}

impl StatusPublisher {
    pub fn new(transport: Arc<dyn Transport>, failure_key: impl Into<Arc<str>>) -> Self {
        Self {
            transport,
            failure_key: failure_key.into(),
        }
    }

    pub async fn publish(&self, topic: &str, message: &StatusMessage) -> Result<(), TransportError> {
        let payload = serde_json::to_vec(message)?;
        self.transport.publish(topic, payload).await?;
        debug!(topic, key = %message.key, value = %message.value, "Status published");
        Ok(())
    }

    /// Best-effort `{"<failure key>": "<operation>: <error>"}` on `topic`.
    pub async fn publish_failure(&self, topic: &str, operation: &str, error: &(dyn Display + Sync)) {
        let message = StatusMessage::new(&*self.failure_key, format!("{operation}: {error}"));
        if let Err(e) = self.publish(topic, &message).await {
            warn!(error = %e, topic, operation, "Failed to publish failure status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::MockTransport;

    #[tokio::test]
    async fn publishes_single_pair_json() {
        let transport = Arc::new(MockTransport::default());
        let status = StatusPublisher::new(transport.clone(), "failed");

        status
            .publish(
                "feeder/image-created",
                &StatusMessage::new("resource-created", "image_1.jpg"),
            )
            .await
            .unwrap();

        let published = transport.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "feeder/image-created");
        assert_eq!(published[0].payload, br#"{"resource-created":"image_1.jpg"}"#);
    }

    #[tokio::test]
    async fn failure_status_names_operation() {
        let transport = Arc::new(MockTransport::default());
        let status = StatusPublisher::new(transport.clone(), "failed");

        status
            .publish_failure("feeder/temperature", "read-temperature", &"sensor offline")
            .await;

        let published = transport.published();
        assert_eq!(
            published[0].payload,
            br#"{"failed":"read-temperature: sensor offline"}"#
        );
    }

    #[tokio::test]
    async fn failure_status_swallows_transport_errors() {
        let transport = Arc::new(MockTransport::default());
        transport.fail_publishes(true);
        let status = StatusPublisher::new(transport.clone(), "failed");

        status
            .publish_failure("feeder/temperature", "read-temperature", &"boom")
            .await;

        assert!(transport.published().is_empty());
    }
}
