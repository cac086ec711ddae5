use std::path::PathBuf;

/// Camera failures.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("capture produced no file at {0}")]
    MissingOutput(PathBuf),
    #[error("a video recording is already in progress")]
    AlreadyRecording,
    #[error("no video recording in progress")]
    NotRecording,
    #[error("rotation of {0} degrees is not supported by this camera")]
    UnsupportedRotation(u16),
    #[error("camera I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("camera device error: {0}")]
    Device(String),
}

/// Object-store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("upload of {key} rejected with status {status}")]
    Rejected { key: String, status: u16 },
    #[error("object store error: {0}")]
    Backend(String),
}

/// Thermometer failures.
#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("no one-wire thermometer found under {0}")]
    NoDevice(PathBuf),
    #[error("thermometer I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("thermometer reported a CRC failure")]
    CrcMismatch,
    #[error("malformed thermometer output: {0}")]
    Malformed(String),
    #[error("thermometer returned NaN")]
    NotANumber,
    #[error("thermometer unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum GpioError {
    #[error("GPIO pin {pin}: {message}")]
    Pin { pin: u8, message: String },
    #[error("GPIO unavailable: {0}")]
    Unavailable(String),
}

/// Broker failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to publish to {topic}: {message}")]
    Publish { topic: String, message: String },
    #[error("failed to subscribe to {filter}: {message}")]
    Subscribe { filter: String, message: String },
    #[error("failed to encode status message: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error(transparent)]
    Codec(#[from] image::ImageError),
    #[error("resize worker failed: {0}")]
    Worker(String),
}

/// Failure of a single device operation (capture, report, feed).
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),
    #[error("resize failed: {0}")]
    Image(#[from] ImageError),
    #[error("upload failed for {}", files.join(", "))]
    Upload { files: Vec<String> },
    #[error("sensor read failed: {0}")]
    Sensor(#[from] SensorError),
    #[error("actuator failed: {0}")]
    Gpio(#[from] GpioError),
    #[error("status publish failed: {0}")]
    Transport(#[from] TransportError),
    #[error("local file error on {path}: {source}")]
    Local {
        path: PathBuf,
        source: std::io::Error,
    },
}
