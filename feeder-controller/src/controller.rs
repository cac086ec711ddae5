use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ConfigError};
use crate::error::OperationError;
use crate::event::DeviceEvent;
use crate::feeder::FeederActuator;
use crate::media::{MediaPipeline, MediaSettings};
use crate::monitor::ConnectionMonitor;
use crate::ports::{Camera, ObjectStore, OutputPin, TemperatureSensor, Transport};
use crate::router::{Command, CommandRouter};
use crate::status::StatusPublisher;
use crate::temperature::TemperatureReporter;

/// The collaborators a [`Controller`] is wired to.
pub struct Ports {
    pub transport: Arc<dyn Transport>,
    pub camera: Arc<dyn Camera>,
    pub store: Arc<dyn ObjectStore>,
    pub sensor: Arc<dyn TemperatureSensor>,
    pub feeder_pin: Arc<dyn OutputPin>,
}

/// Owns every component and dispatches [`DeviceEvent`]s to them.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    status: StatusPublisher,
    router: CommandRouter,
    media: MediaPipeline,
    reporter: Arc<TemperatureReporter>,
    feeder: FeederActuator,
    monitor: ConnectionMonitor,
    command_topic: String,
    subscribe_filter: String,
    feed_duration: Duration,
}

impl Controller {
    pub fn new(config: &Config, ports: Ports) -> Result<Self, ConfigError> {
        config.validate()?;

        let status = StatusPublisher::new(ports.transport.clone(), config.statuses.failed.as_str());
        let media = MediaPipeline::new(
            ports.camera,
            ports.store,
            status.clone(),
            MediaSettings::from_config(config)?,
        );
        let reporter = TemperatureReporter::new(
            ports.sensor,
            status.clone(),
            config.topics.temperature.as_str(),
            config.statuses.temperature.as_str(),
        );

        Ok(Self {
            inner: Arc::new(Inner {
                transport: ports.transport,
                status,
                router: CommandRouter::new(&config.commands),
                media,
                reporter: Arc::new(reporter),
                feeder: FeederActuator::new(ports.feeder_pin),
                monitor: ConnectionMonitor::new(),
                command_topic: config.topics.command.clone(),
                subscribe_filter: config.mqtt.subscribe_filter.clone(),
                feed_duration: config.feeder.duration(),
            }),
        })
    }

    pub fn monitor(&self) -> &ConnectionMonitor {
        &self.inner.monitor
    }

    pub fn reporter(&self) -> Arc<TemperatureReporter> {
        self.inner.reporter.clone()
    }

    pub fn feeder(&self) -> &FeederActuator {
        &self.inner.feeder
    }

    /// Handle one event. Actions run on their own task, whose handle is
    /// returned; connection bookkeeping happens inline.
    pub async fn handle_event(&self, event: DeviceEvent) -> Option<JoinHandle<()>> {
        match event {
            DeviceEvent::Connected => {
                self.inner.monitor.set_connected(true);
                info!(filter = %self.inner.subscribe_filter, "Connected to broker, subscribing");
                if let Err(e) = self.inner.transport.subscribe(&self.inner.subscribe_filter).await {
                    error!(error = %e, "Subscription failed");
                }
                None
            }
            DeviceEvent::Disconnected => {
                if self.inner.monitor.set_connected(false) {
                    warn!("Disconnected from broker");
                }
                None
            }
            DeviceEvent::MessageReceived { topic, payload } => {
                if topic != self.inner.command_topic {
                    debug!(%topic, "Ignoring message on non-command topic");
                    return None;
                }
                let token = String::from_utf8_lossy(&payload);
                let command = self.inner.router.route(&token)?;
                Some(self.spawn_command(command))
            }
            DeviceEvent::MotionDetected => {
                info!("Motion detected");
                Some(self.spawn_command(Command::TakePhoto))
            }
        }
    }

    /// Run `command` on a worker task. Failures are logged and, except for
    /// feeding, announced on the topic the success would have used.
    pub fn spawn_command(&self, command: Command) -> JoinHandle<()> {
        let controller = self.clone();
        tokio::spawn(async move {
            if let Err(e) = controller.execute(command).await {
                error!(command = %command, error = %e, "Command failed");
                if let Some(topic) = controller.failure_topic(command) {
                    controller
                        .inner
                        .status
                        .publish_failure(topic, command.name(), &e)
                        .await;
                }
            }
        })
    }

    async fn execute(&self, command: Command) -> Result<(), OperationError> {
        match command {
            Command::TakePhoto => self.inner.media.take_photo().await.map(drop),
            Command::RecordVideo => self.inner.media.record_video().await.map(drop),
            Command::Feed => Ok(self.inner.feeder.run(self.inner.feed_duration).await?),
            Command::ReadTemperature => self.inner.reporter.report().await.map(drop),
        }
    }

    fn failure_topic(&self, command: Command) -> Option<&str> {
        let settings = self.inner.media.settings();
        match command {
            Command::TakePhoto => Some(&settings.image_topic),
            Command::RecordVideo => Some(&settings.video_topic),
            Command::ReadTemperature => Some(self.inner.reporter.topic()),
            Command::Feed => None,
        }
    }
}
