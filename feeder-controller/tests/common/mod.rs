#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use feeder_controller::adapters::mock::{
    FixedThermometer, MemoryObjectStore, MockCamera, MockTransport, RecordingPin,
};
use feeder_controller::{Config, Controller, DeviceEvent, Ports};
use feeder_core::Resolution;
use tempfile::TempDir;

pub struct Harness {
    pub controller: Controller,
    pub config: Config,
    pub transport: Arc<MockTransport>,
    pub camera: Arc<MockCamera>,
    pub store: Arc<MemoryObjectStore>,
    pub sensor: Arc<FixedThermometer>,
    pub pin: Arc<RecordingPin>,
    pub dir: TempDir,
}

/// Small captures and bounds so tests stay fast: photos are 400x300, the
/// variants are bounded at 100 and 200.
pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.media.photo_dir = dir.path().join("photos");
    config.media.video_dir = dir.path().join("videos");
    config.media.photo_resolution = Resolution::new(400, 300);
    config.media.video_resolution = Resolution::new(320, 240);
    config.media.video_duration_secs = 2;
    config.image.small_max_dimension = 100;
    config.image.medium_max_dimension = 200;
    config
}

pub fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    harness_with(test_config(&dir), dir)
}

pub fn harness_with(config: Config, dir: TempDir) -> Harness {
    let transport = Arc::new(MockTransport::default());
    let camera = Arc::new(MockCamera::new(Duration::from_millis(20)));
    let store = Arc::new(MemoryObjectStore::default());
    let sensor = Arc::new(FixedThermometer::new(18.5));
    let pin = Arc::new(RecordingPin::default());

    let controller = Controller::new(
        &config,
        Ports {
            transport: transport.clone(),
            camera: camera.clone(),
            store: store.clone(),
            sensor: sensor.clone(),
            feeder_pin: pin.clone(),
        },
    )
    .unwrap();

    Harness {
        controller,
        config,
        transport,
        camera,
        store,
        sensor,
        pin,
        dir,
    }
}

pub fn command(config: &Config, token: &str) -> DeviceEvent {
    DeviceEvent::MessageReceived {
        topic: config.topics.command.clone(),
        payload: token.as_bytes().to_vec(),
    }
}

/// Names of the files left in `dir`, sorted.
pub fn files_in(dir: &std::path::Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
