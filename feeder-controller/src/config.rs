use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use feeder_core::{MaxDimension, ResizeError, Resolution, Rotation};
use feeder_tls::TlsConfig;
use serde::Deserialize;

use crate::imaging::ResizeVariant;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub topics: TopicConfig,
    pub commands: CommandConfig,
    pub statuses: StatusConfig,
    pub storage: StorageConfig,
    pub camera: CameraConfig,
    pub sensor: SensorConfig,
    pub gpio: GpioConfig,
    pub media: MediaConfig,
    pub image: ImageConfig,
    pub feeder: FeederConfig,
    pub reporting: ReportingConfig,
    pub logging: LoggingConfig,
    /// Optional HTTP health endpoint
    pub server: Option<ServerConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker host name
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
    /// Filter subscribed to on every (re)connect
    pub subscribe_filter: String,
    pub tls: TlsConfig,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8883,
            client_id: "bird-feeder".to_string(),
            keep_alive_secs: 60,
            subscribe_filter: "#".to_string(),
            tls: TlsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    /// Inbound commands
    pub command: String,
    pub temperature: String,
    pub image_created: String,
    pub video_created: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            command: "feeder/command".to_string(),
            temperature: "feeder/temperature".to_string(),
            image_created: "feeder/image-created".to_string(),
            video_created: "feeder/video-created".to_string(),
        }
    }
}

/// Command tokens, matched exactly against inbound payloads.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub take_photo: String,
    pub record_video: String,
    pub feed: String,
    pub read_temperature: String,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            take_photo: "take-photo".to_string(),
            record_video: "record-video".to_string(),
            feed: "feed".to_string(),
            read_temperature: "read-temperature".to_string(),
        }
    }
}

/// Keys used in published status messages.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub resource_created: String,
    pub temperature: String,
    pub failed: String,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            resource_created: "resource-created".to_string(),
            temperature: "temperature".to_string(),
            failed: "operation-failed".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    S3 {
        bucket: String,
        region: String,
        /// Custom endpoint for S3-compatible services
        endpoint: Option<String>,
        /// Static credentials; the environment is used when absent
        access_key: Option<String>,
        secret_key: Option<String>,
        #[serde(default)]
        path_style: bool,
    },
    Directory {
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Directory {
            path: PathBuf::from("./uploads"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CameraConfig {
    Rpicam {
        #[serde(default = "default_still_program")]
        still_program: String,
        #[serde(default = "default_video_program")]
        video_program: String,
    },
    #[default]
    Mock,
}

fn default_still_program() -> String {
    "rpicam-still".to_string()
}

fn default_video_program() -> String {
    "rpicam-vid".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SensorConfig {
    /// One-wire thermometer exposed through sysfs
    W1 {
        #[serde(default = "default_w1_dir")]
        device_dir: PathBuf,
    },
    Fixed {
        celsius: f64,
    },
}

fn default_w1_dir() -> PathBuf {
    PathBuf::from("/sys/bus/w1/devices")
}

impl Default for SensorConfig {
    fn default() -> Self {
        SensorConfig::Fixed { celsius: 20.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpioBackend {
    Rpi,
    Simulated,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GpioConfig {
    pub backend: GpioBackend,
    /// BCM number of the motion sensor input
    pub motion_pin: u8,
    /// BCM number of the feeder output
    pub feeder_pin: u8,
    pub debounce_ms: u64,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            backend: GpioBackend::Simulated,
            motion_pin: 20,
            feeder_pin: 21,
            debounce_ms: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub photo_dir: PathBuf,
    pub video_dir: PathBuf,
    pub photo_resolution: Resolution,
    pub video_resolution: Resolution,
    pub rotation: Rotation,
    pub video_duration_secs: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            photo_dir: PathBuf::from("/home/pi/Pictures"),
            video_dir: PathBuf::from("/home/pi/Videos"),
            photo_resolution: Resolution::new(2592, 1944),
            video_resolution: Resolution::new(1920, 1080),
            rotation: Rotation::Half,
            video_duration_secs: 10,
        }
    }
}

impl MediaConfig {
    pub fn video_duration(&self) -> Duration {
        Duration::from_secs(self.video_duration_secs)
    }
}

/// Resized photo variants.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub small_prefix: String,
    pub small_max_dimension: u32,
    pub medium_prefix: String,
    pub medium_max_dimension: u32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            small_prefix: "small_".to_string(),
            small_max_dimension: 480,
            medium_prefix: "medium_".to_string(),
            medium_max_dimension: 1280,
        }
    }
}

impl ImageConfig {
    pub fn variants(&self) -> Result<Vec<ResizeVariant>, ConfigError> {
        let bound = |name: &'static str, value: u32| {
            MaxDimension::new(value).map_err(|source| ConfigError::ImageBound { name, source })
        };

        let variants = vec![
            ResizeVariant {
                prefix: self.small_prefix.clone(),
                max: bound("small_max_dimension", self.small_max_dimension)?,
            },
            ResizeVariant {
                prefix: self.medium_prefix.clone(),
                max: bound("medium_max_dimension", self.medium_max_dimension)?,
            },
        ];

        let mut seen = HashSet::new();
        for variant in &variants {
            if variant.prefix.is_empty() {
                return Err(ConfigError::EmptyPrefix);
            }
            if variant.prefix.contains('/') {
                return Err(ConfigError::PrefixWithSeparator(variant.prefix.clone()));
            }
            if !seen.insert(variant.prefix.as_str()) {
                return Err(ConfigError::DuplicatePrefix(variant.prefix.clone()));
            }
        }

        Ok(variants)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeederConfig {
    /// How long the feeder output stays active per feed command
    pub duration_secs: u64,
}

impl Default for FeederConfig {
    fn default() -> Self {
        Self { duration_secs: 5 }
    }
}

impl FeederConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    /// Interval in seconds between temperature reports while connected
    pub interval_secs: u64,
    /// Interval in seconds between connection checks
    pub wait_secs: u64,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 600,
            wait_secs: 3,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Append logs to this file instead of stdout
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address for the HTTP server to listen on
    pub http_addr: SocketAddr,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid image bound `{name}`: {source}")]
    ImageBound {
        name: &'static str,
        source: ResizeError,
    },
    #[error("image variant prefix must not be empty")]
    EmptyPrefix,
    #[error("image variant prefix `{0}` must not contain a path separator")]
    PrefixWithSeparator(String),
    #[error("image variant prefix `{0}` is used twice")]
    DuplicatePrefix(String),
    #[error("command token `{0}` must not be empty")]
    EmptyCommand(&'static str),
    #[error("command token `{0}` is assigned to more than one command")]
    DuplicateCommand(String),
    #[error("topic `{0}` must not be empty")]
    EmptyTopic(&'static str),
    #[error("`{0}` must be greater than zero")]
    ZeroDuration(&'static str),
}

impl Config {
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Reject settings that would otherwise only fail when a command runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.image.variants()?;

        let tokens = [
            ("take_photo", &self.commands.take_photo),
            ("record_video", &self.commands.record_video),
            ("feed", &self.commands.feed),
            ("read_temperature", &self.commands.read_temperature),
        ];
        let mut seen = HashSet::new();
        for (name, token) in tokens {
            if token.is_empty() {
                return Err(ConfigError::EmptyCommand(name));
            }
            if !seen.insert(token.as_str()) {
                return Err(ConfigError::DuplicateCommand(token.clone()));
            }
        }

        let topics = [
            ("command", &self.topics.command),
            ("temperature", &self.topics.temperature),
            ("image_created", &self.topics.image_created),
            ("video_created", &self.topics.video_created),
        ];
        if let Some((name, _)) = topics.into_iter().find(|(_, topic)| topic.is_empty()) {
            return Err(ConfigError::EmptyTopic(name));
        }

        let durations = [
            ("feeder.duration_secs", self.feeder.duration_secs),
            ("media.video_duration_secs", self.media.video_duration_secs),
            ("reporting.interval_secs", self.reporting.interval_secs),
            ("reporting.wait_secs", self.reporting.wait_secs),
        ];
        if let Some((name, _)) = durations.into_iter().find(|(_, secs)| *secs == 0) {
            return Err(ConfigError::ZeroDuration(name));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[mqtt]
host = "abc123-ats.iot.eu-west-1.amazonaws.com"
client_id = "feeder-1"

[mqtt.tls]
root_ca = "/etc/feeder/rootCA.pem"
cert = "/etc/feeder/cert.pem"
key = "/etc/feeder/private.key"

[topics]
command = "birdfeeder/command"

[commands]
take_photo = "PHOTO"

[storage]
type = "s3"
bucket = "feeder-media"
region = "eu-west-1"

[camera]
type = "rpicam"

[sensor]
type = "w1"

[gpio]
backend = "rpi"
feeder_pin = 18

[media]
rotation = 0
photo_resolution = { width = 1024, height = 768 }

[image]
small_max_dimension = 320
"#;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn partial_file_fills_defaults() {
        let config: Config = toml::from_str(SAMPLE).unwrap();

        assert_eq!(config.mqtt.port, 8883);
        assert_eq!(config.mqtt.client_id, "feeder-1");
        assert_eq!(config.mqtt.subscribe_filter, "#");
        assert_eq!(config.topics.command, "birdfeeder/command");
        assert_eq!(config.topics.temperature, "feeder/temperature");
        assert_eq!(config.commands.take_photo, "PHOTO");
        assert_eq!(config.commands.feed, "feed");
        assert!(matches!(
            config.storage,
            StorageConfig::S3 { ref bucket, path_style: false, .. } if bucket == "feeder-media"
        ));
        assert!(matches!(
            config.camera,
            CameraConfig::Rpicam { ref still_program, .. } if still_program == "rpicam-still"
        ));
        assert!(matches!(
            config.sensor,
            SensorConfig::W1 { ref device_dir } if device_dir == Path::new("/sys/bus/w1/devices")
        ));
        assert_eq!(config.gpio.backend, GpioBackend::Rpi);
        assert_eq!(config.gpio.feeder_pin, 18);
        assert_eq!(config.gpio.motion_pin, 20);
        assert_eq!(config.media.rotation, Rotation::None);
        assert_eq!(config.media.photo_resolution, Resolution::new(1024, 768));
        assert_eq!(config.image.small_max_dimension, 320);
        assert!(config.server.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn unsupported_rotation_fails_to_parse() {
        let result: Result<Config, _> = toml::from_str("[media]\nrotation = 45\n");
        assert!(result.is_err());
    }

    #[test]
    fn zero_image_bound_fails_validation() {
        let mut config = Config::default();
        config.image.medium_max_dimension = 0;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::ImageBound {
                name: "medium_max_dimension",
                source: ResizeError::NonPositiveBound
            })
        ));
    }

    #[test]
    fn shared_prefix_fails_validation() {
        let mut config = Config::default();
        config.image.medium_prefix = config.image.small_prefix.clone();

        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicatePrefix(_))
        ));
    }

    #[test]
    fn duplicate_command_token_fails_validation() {
        let mut config = Config::default();
        config.commands.feed = config.commands.take_photo.clone();

        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateCommand(token)) if token == "take-photo"
        ));
    }

    #[test]
    fn zero_feed_duration_fails_validation() {
        let mut config = Config::default();
        config.feeder.duration_secs = 0;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroDuration("feeder.duration_secs"))
        ));
    }
}
