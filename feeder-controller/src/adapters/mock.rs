//! In-memory implementations of the port traits.
//!
//! Used by the test suites, and by `mock`/`fixed`/`simulated` configurations
//! for running the controller away from the device.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use feeder_core::{Celsius, Resolution, Rotation};
use tracing::info;

use crate::error::{CaptureError, GpioError, SensorError, StoreError, TransportError};
use crate::ports::{Camera, ObjectStore, OutputPin, TemperatureSensor, Transport};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A message handed to [`MockTransport::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl Published {
    pub fn payload_str(&self) -> &str {
        std::str::from_utf8(&self.payload).unwrap_or("<binary>")
    }
}

/// Transport that records publishes and subscriptions.
#[derive(Default)]
pub struct MockTransport {
    published: Mutex<Vec<Published>>,
    subscriptions: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl MockTransport {
    pub fn published(&self) -> Vec<Published> {
        lock(&self.published).clone()
    }

    pub fn published_on(&self, topic: &str) -> Vec<Published> {
        lock(&self.published)
            .iter()
            .filter(|p| p.topic == topic)
            .cloned()
            .collect()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        lock(&self.subscriptions).clone()
    }

    pub fn fail_publishes(&self, fail: bool) {
        self.fail.store(fail, Ordering::Release);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        if self.fail.load(Ordering::Acquire) {
            return Err(TransportError::Publish {
                topic: topic.to_string(),
                message: "mock transport offline".to_string(),
            });
        }
        lock(&self.published).push(Published {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }

    async fn subscribe(&self, filter: &str) -> Result<(), TransportError> {
        lock(&self.subscriptions).push(filter.to_string());
        Ok(())
    }
}

/// Camera that writes a generated JPEG or a stub video.
///
/// Each photo capture takes `capture_time`; overlapping captures are recorded
/// so tests can check the camera is never used concurrently.
pub struct MockCamera {
    capture_time: Duration,
    in_flight: AtomicUsize,
    overlapped: AtomicBool,
    captures: AtomicUsize,
    fail: AtomicBool,
    recording: Mutex<Option<PathBuf>>,
}

impl MockCamera {
    pub fn new(capture_time: Duration) -> Self {
        Self {
            capture_time,
            in_flight: AtomicUsize::new(0),
            overlapped: AtomicBool::new(false),
            captures: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            recording: Mutex::new(None),
        }
    }

    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::Acquire)
    }

    /// Whether two operations were ever in progress at once.
    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::Acquire)
    }

    pub fn fail_captures(&self, fail: bool) {
        self.fail.store(fail, Ordering::Release);
    }

    fn enter(&self) -> Result<InFlight<'_>, CaptureError> {
        if self.fail.load(Ordering::Acquire) {
            return Err(CaptureError::Device("mock camera failure".to_string()));
        }
        if self.in_flight.fetch_add(1, Ordering::AcqRel) > 0 {
            self.overlapped.store(true, Ordering::Release);
        }
        Ok(InFlight(&self.in_flight))
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

#[async_trait]
impl Camera for MockCamera {
    async fn capture_photo(
        &self,
        path: &Path,
        resolution: Resolution,
        _rotation: Rotation,
    ) -> Result<(), CaptureError> {
        let _in_flight = self.enter()?;
        tokio::time::sleep(self.capture_time).await;

        let target = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            image::RgbImage::from_fn(resolution.width, resolution.height, |x, y| {
                image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
            })
            .save(&target)
        })
        .await
        .map_err(|e| CaptureError::Device(e.to_string()))?
        .map_err(|e| CaptureError::Device(e.to_string()))?;

        self.captures.fetch_add(1, Ordering::AcqRel);
        info!(path = ?path, %resolution, "Mock photo captured");
        Ok(())
    }

    async fn start_video(
        &self,
        path: &Path,
        _resolution: Resolution,
        _rotation: Rotation,
    ) -> Result<(), CaptureError> {
        if self.fail.load(Ordering::Acquire) {
            return Err(CaptureError::Device("mock camera failure".to_string()));
        }
        if lock(&self.recording).is_some() {
            return Err(CaptureError::AlreadyRecording);
        }
        tokio::fs::write(path, b"\x00\x00\x00\x01mock h264").await?;

        let mut recording = lock(&self.recording);
        if recording.is_some() {
            return Err(CaptureError::AlreadyRecording);
        }
        *recording = Some(path.to_path_buf());
        Ok(())
    }

    async fn wait_video(&self, duration: Duration) -> Result<(), CaptureError> {
        let _in_flight = self.enter()?;
        tokio::time::sleep(duration).await;
        Ok(())
    }

    async fn stop_video(&self) -> Result<PathBuf, CaptureError> {
        let path = lock(&self.recording)
            .take()
            .ok_or(CaptureError::NotRecording)?;
        self.captures.fetch_add(1, Ordering::AcqRel);
        Ok(path)
    }
}

/// Object store keeping uploads in memory.
///
/// The file is read during `put`, so a later local delete does not affect
/// what was stored.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    order: Mutex<Vec<String>>,
    failing_key: Mutex<Option<String>>,
}

impl MemoryObjectStore {
    pub fn keys(&self) -> Vec<String> {
        lock(&self.order).clone()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        lock(&self.objects).get(key).cloned()
    }

    /// Reject uploads whose key contains `fragment`.
    pub fn fail_key_containing(&self, fragment: impl Into<String>) {
        *lock(&self.failing_key) = Some(fragment.into());
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, local_path: &Path) -> Result<(), StoreError> {
        let failing = lock(&self.failing_key)
            .as_deref()
            .is_some_and(|fragment| key.contains(fragment));
        if failing {
            return Err(StoreError::Rejected {
                key: key.to_string(),
                status: 503,
            });
        }

        let content = tokio::fs::read(local_path)
            .await
            .map_err(|source| StoreError::Read {
                path: local_path.to_path_buf(),
                source,
            })?;
        lock(&self.objects).insert(key.to_string(), content);
        lock(&self.order).push(key.to_string());
        Ok(())
    }
}

/// Thermometer returning a fixed reading.
pub struct FixedThermometer {
    celsius: f64,
    reads: AtomicUsize,
    fail: AtomicBool,
}

impl FixedThermometer {
    pub fn new(celsius: f64) -> Self {
        Self {
            celsius,
            reads: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Acquire)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail.store(fail, Ordering::Release);
    }
}

#[async_trait]
impl TemperatureSensor for FixedThermometer {
    async fn read_celsius(&self) -> Result<Celsius, SensorError> {
        self.reads.fetch_add(1, Ordering::AcqRel);
        if self.fail.load(Ordering::Acquire) {
            return Err(SensorError::Unavailable("mock thermometer failure".to_string()));
        }
        Celsius::new(self.celsius).ok_or(SensorError::NotANumber)
    }
}

/// Output pin that records every successful state change.
#[derive(Default)]
pub struct RecordingPin {
    history: Mutex<Vec<bool>>,
    fail_activation: AtomicBool,
}

impl RecordingPin {
    pub fn history(&self) -> Vec<bool> {
        lock(&self.history).clone()
    }

    pub fn is_active(&self) -> bool {
        lock(&self.history).last().copied().unwrap_or(false)
    }

    /// Make `set_active(true)` fail; deactivation keeps working.
    pub fn fail_activation(&self, fail: bool) {
        self.fail_activation.store(fail, Ordering::Release);
    }
}

impl OutputPin for RecordingPin {
    fn set_active(&self, active: bool) -> Result<(), GpioError> {
        if active && self.fail_activation.load(Ordering::Acquire) {
            return Err(GpioError::Pin {
                pin: 0,
                message: "mock activation failure".to_string(),
            });
        }
        lock(&self.history).push(active);
        Ok(())
    }
}
