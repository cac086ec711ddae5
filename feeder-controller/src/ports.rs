//! Port traits between the controller and the device's collaborators.
//!
//! ```text
//!   DeviceEvent ──▶ Controller ──▶ Transport / ObjectStore / Camera
//!                                  TemperatureSensor / OutputPin
//! ```
//!
//! Adapters in [`crate::adapters`] implement these for real hardware and
//! cloud services; [`crate::adapters::mock`] provides in-memory versions.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use feeder_core::{Celsius, Resolution, Rotation};

use crate::error::{CaptureError, GpioError, SensorError, StoreError, TransportError};

/// Publish/subscribe access to the message broker.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Publish with at-least-once delivery.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    async fn subscribe(&self, filter: &str) -> Result<(), TransportError>;
}

/// Remote storage for captured artifacts.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Upload the file at `local_path` under `key`. The local file is left
    /// untouched.
    async fn put(&self, key: &str, local_path: &Path) -> Result<(), StoreError>;
}

/// The camera. Callers serialize access; implementations may assume at most
/// one operation in flight.
#[async_trait]
pub trait Camera: Send + Sync + 'static {
    async fn capture_photo(
        &self,
        path: &Path,
        resolution: Resolution,
        rotation: Rotation,
    ) -> Result<(), CaptureError>;

    async fn start_video(
        &self,
        path: &Path,
        resolution: Resolution,
        rotation: Rotation,
    ) -> Result<(), CaptureError>;

    /// Keep recording for `duration`.
    async fn wait_video(&self, duration: Duration) -> Result<(), CaptureError>;

    /// Finish the recording and return the path of the written file.
    async fn stop_video(&self) -> Result<PathBuf, CaptureError>;
}

#[async_trait]
pub trait TemperatureSensor: Send + Sync + 'static {
    async fn read_celsius(&self) -> Result<Celsius, SensorError>;
}

/// A digital output driving an actuator.
pub trait OutputPin: Send + Sync + 'static {
    fn set_active(&self, active: bool) -> Result<(), GpioError>;
}
