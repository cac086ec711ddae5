pub mod camera;
pub mod directory;
pub mod gpio;
pub mod mock;
pub mod mqtt;
pub mod s3;
pub mod w1;

use std::sync::Arc;

use tracing::info;

use crate::config::{CameraConfig, SensorConfig, StorageConfig};
use crate::error::StoreError;
use crate::ports::{Camera, ObjectStore, TemperatureSensor};

pub fn build_store(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>, StoreError> {
    match config {
        StorageConfig::S3 {
            bucket,
            region,
            endpoint,
            access_key,
            secret_key,
            path_style,
        } => {
            info!(%bucket, %region, ?endpoint, "Using S3 object store");
            let location = s3::S3Location {
                bucket,
                region,
                endpoint: endpoint.as_deref(),
                path_style: *path_style,
            };
            let store = s3::S3Store::new(location, access_key.as_deref(), secret_key.as_deref())?;
            Ok(Arc::new(store))
        }
        StorageConfig::Directory { path } => {
            info!(path = ?path, "Using directory object store");
            Ok(Arc::new(directory::DirectoryStore::new(path.clone())))
        }
    }
}

pub fn build_camera(config: &CameraConfig) -> Arc<dyn Camera> {
    match config {
        CameraConfig::Rpicam {
            still_program,
            video_program,
        } => {
            info!(%still_program, %video_program, "Using rpicam camera");
            Arc::new(camera::RpicamCamera::new(still_program.as_str(), video_program.as_str()))
        }
        CameraConfig::Mock => {
            info!("Using mock camera");
            Arc::new(mock::MockCamera::default())
        }
    }
}

pub fn build_sensor(config: &SensorConfig) -> Arc<dyn TemperatureSensor> {
    match config {
        SensorConfig::W1 { device_dir } => {
            info!(device_dir = ?device_dir, "Using one-wire thermometer");
            Arc::new(w1::W1Thermometer::new(device_dir.clone()))
        }
        SensorConfig::Fixed { celsius } => {
            info!(celsius, "Using fixed thermometer");
            Arc::new(mock::FixedThermometer::new(*celsius))
        }
    }
}
