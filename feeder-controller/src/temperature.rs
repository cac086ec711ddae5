use std::sync::Arc;

use feeder_core::{Celsius, StatusMessage};
use tracing::{error, info};

use crate::error::OperationError;
use crate::ports::TemperatureSensor;
use crate::router::Command;
use crate::status::StatusPublisher;

/// Reads the thermometer and publishes the value on the temperature topic.
pub struct TemperatureReporter {
    sensor: Arc<dyn TemperatureSensor>,
    status: StatusPublisher,
    topic: String,
    status_key: String,
}

impl TemperatureReporter {
    pub fn new(
        sensor: Arc<dyn TemperatureSensor>,
        status: StatusPublisher,
        topic: impl Into<String>,
        status_key: impl Into<String>,
    ) -> Self {
        Self {
            sensor,
            status,
            topic: topic.into(),
            status_key: status_key.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// A failed read publishes nothing and is returned to the caller.
    pub async fn report(&self) -> Result<Celsius, OperationError> {
        let reading = self.sensor.read_celsius().await?;

        let message = StatusMessage::new(self.status_key.as_str(), reading.to_string());
        self.status.publish(&self.topic, &message).await?;

        info!(
            temperature = format_args!("{:.2}", reading.value()),
            "Temperature reading sent"
        );
        Ok(reading)
    }

    /// [`report`](Self::report), logging a failure and announcing it on the
    /// temperature topic.
    pub async fn report_or_notify(&self) -> Option<Celsius> {
        match self.report().await {
            Ok(reading) => Some(reading),
            Err(e) => {
                error!(error = %e, "Temperature report failed");
                self.status
                    .publish_failure(&self.topic, Command::ReadTemperature.name(), &e)
                    .await;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{FixedThermometer, MockTransport};

    fn reporter(
        sensor: Arc<FixedThermometer>,
        transport: Arc<MockTransport>,
    ) -> TemperatureReporter {
        TemperatureReporter::new(
            sensor,
            StatusPublisher::new(transport, "failed"),
            "feeder/temperature",
            "temperature",
        )
    }

    #[tokio::test]
    async fn publishes_raw_reading() {
        let sensor = Arc::new(FixedThermometer::new(21.625));
        let transport = Arc::new(MockTransport::default());

        let reading = reporter(sensor, transport.clone()).report().await.unwrap();

        assert_eq!(reading.value(), 21.625);
        let published = transport.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "feeder/temperature");
        assert_eq!(published[0].payload, br#"{"temperature":"21.625"}"#);
    }

    #[tokio::test]
    async fn publishes_whole_degree_with_fraction() {
        let sensor = Arc::new(FixedThermometer::new(20.0));
        let transport = Arc::new(MockTransport::default());

        reporter(sensor, transport.clone()).report().await.unwrap();

        let published = transport.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].payload, br#"{"temperature":"20.0"}"#);
    }

    #[tokio::test]
    async fn read_failure_publishes_no_reading() {
        let sensor = Arc::new(FixedThermometer::new(21.0));
        sensor.fail_reads(true);
        let transport = Arc::new(MockTransport::default());

        let result = reporter(sensor, transport.clone()).report().await;

        assert!(matches!(result, Err(OperationError::Sensor(_))));
        assert!(transport.published().is_empty());
    }

    #[tokio::test]
    async fn notify_variant_announces_failure() {
        let sensor = Arc::new(FixedThermometer::new(21.0));
        sensor.fail_reads(true);
        let transport = Arc::new(MockTransport::default());

        let reading = reporter(sensor, transport.clone()).report_or_notify().await;

        assert!(reading.is_none());
        let published = transport.published();
        assert_eq!(published.len(), 1);
        let body = String::from_utf8(published[0].payload.clone()).unwrap();
        assert!(body.starts_with(r#"{"failed":"read-temperature: "#), "{body}");
    }
}
