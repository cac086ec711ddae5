use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use feeder_core::{ArtifactName, MediaKind, Resolution, Rotation, StatusMessage};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::{Config, ConfigError};
use crate::error::OperationError;
use crate::imaging::{self, ResizeVariant};
use crate::ports::{Camera, ObjectStore};
use crate::status::StatusPublisher;

/// Capture and publication settings for the [`MediaPipeline`].
#[derive(Debug, Clone)]
pub struct MediaSettings {
    pub photo_dir: PathBuf,
    pub video_dir: PathBuf,
    pub photo_resolution: Resolution,
    pub video_resolution: Resolution,
    pub rotation: Rotation,
    pub video_duration: Duration,
    pub variants: Vec<ResizeVariant>,
    pub image_topic: String,
    pub video_topic: String,
    pub resource_key: String,
}

impl MediaSettings {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            photo_dir: config.media.photo_dir.clone(),
            video_dir: config.media.video_dir.clone(),
            photo_resolution: config.media.photo_resolution,
            video_resolution: config.media.video_resolution,
            rotation: config.media.rotation,
            video_duration: config.media.video_duration(),
            variants: config.image.variants()?,
            image_topic: config.topics.image_created.clone(),
            video_topic: config.topics.video_created.clone(),
            resource_key: config.statuses.resource_created.clone(),
        })
    }
}

/// Last name handed out, so back-to-back captures in the same second get
/// distinct names even after the earlier file was uploaded and removed.
#[derive(Default)]
struct NameState {
    last: Option<ArtifactName>,
    next_sequence: u32,
}

impl NameState {
    async fn allocate(&mut self, dir: &Path, kind: MediaKind) -> (ArtifactName, PathBuf) {
        let now = jiff::Zoned::now();
        let base = ArtifactName::at(kind, &now);

        let mut sequence = match &self.last {
            Some(last) if *last == base => self.next_sequence,
            _ => 0,
        };
        let (name, path) = loop {
            let name = match sequence {
                0 => base.clone(),
                n => ArtifactName::with_sequence(kind, &now, n),
            };
            let path = dir.join(name.as_str());
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                break (name, path);
            }
            sequence += 1;
        };

        self.last = Some(base);
        self.next_sequence = sequence + 1;
        (name, path)
    }
}

/// Capture, resize, upload, clean up, announce.
pub struct MediaPipeline {
    camera: Arc<dyn Camera>,
    /// Held for the whole time the camera is in use.
    camera_lock: Mutex<NameState>,
    store: Arc<dyn ObjectStore>,
    status: StatusPublisher,
    settings: MediaSettings,
}

impl MediaPipeline {
    pub fn new(
        camera: Arc<dyn Camera>,
        store: Arc<dyn ObjectStore>,
        status: StatusPublisher,
        settings: MediaSettings,
    ) -> Self {
        Self {
            camera,
            camera_lock: Mutex::new(NameState::default()),
            store,
            status,
            settings,
        }
    }

    pub fn settings(&self) -> &MediaSettings {
        &self.settings
    }

    pub async fn take_photo(&self) -> Result<ArtifactName, OperationError> {
        let dir = &self.settings.photo_dir;
        create_dir(dir).await?;

        let (name, path) = {
            let mut names = self.camera_lock.lock().await;
            let (name, path) = names.allocate(dir, MediaKind::Photo).await;
            info!(file = %name, "Taking photo");
            self.camera
                .capture_photo(&path, self.settings.photo_resolution, self.settings.rotation)
                .await?;
            (name, path)
        };
        info!(file = %name, "Photo taken");

        let mut files = vec![(name.clone(), path)];
        files.extend(imaging::create_variants(dir, &name, &self.settings.variants).await?);

        self.upload_and_clean(&files).await?;
        self.announce(&self.settings.image_topic, &name).await?;
        Ok(name)
    }

    pub async fn record_video(&self) -> Result<ArtifactName, OperationError> {
        let dir = &self.settings.video_dir;
        create_dir(dir).await?;

        let (name, path) = {
            let mut names = self.camera_lock.lock().await;
            let (name, path) = names.allocate(dir, MediaKind::Video).await;
            info!(
                file = %name,
                duration_secs = self.settings.video_duration.as_secs(),
                "Recording video"
            );
            self.camera
                .start_video(&path, self.settings.video_resolution, self.settings.rotation)
                .await?;
            let waited = self.camera.wait_video(self.settings.video_duration).await;
            let stopped = self.camera.stop_video().await;
            waited?;
            (name, stopped?)
        };
        info!(file = %name, "Video recorded");

        self.upload_and_clean(&[(name.clone(), path)]).await?;
        self.announce(&self.settings.video_topic, &name).await?;
        Ok(name)
    }

    /// Upload every file; remove each one locally only once its own upload
    /// succeeded.
    async fn upload_and_clean(&self, files: &[(ArtifactName, PathBuf)]) -> Result<(), OperationError> {
        let mut failed = Vec::new();

        for (name, path) in files {
            match self.store.put(name.as_str(), path).await {
                Ok(()) => {
                    info!(file = %name, "Uploaded");
                    if let Err(e) = tokio::fs::remove_file(path).await {
                        warn!(error = %e, path = ?path, "Failed to remove uploaded file");
                    }
                }
                Err(e) => {
                    warn!(error = %e, file = %name, "Upload failed, keeping local file");
                    failed.push(name.to_string());
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(OperationError::Upload { files: failed })
        }
    }

    async fn announce(&self, topic: &str, name: &ArtifactName) -> Result<(), OperationError> {
        let message = StatusMessage::new(self.settings.resource_key.as_str(), name.as_str());
        self.status.publish(topic, &message).await?;
        Ok(())
    }
}

async fn create_dir(dir: &Path) -> Result<(), OperationError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| OperationError::Local {
            path: dir.to_path_buf(),
            source,
        })
}
