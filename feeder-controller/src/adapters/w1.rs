use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use feeder_core::Celsius;
use tracing::{debug, warn};

use crate::error::SensorError;
use crate::ports::TemperatureSensor;

/// Family codes of one-wire temperature sensors (DS18S20, DS1822, DS18B20,
/// MAX31850K, DS28EA00).
const THERMOMETER_FAMILIES: [&str; 5] = ["10-", "22-", "28-", "3b-", "42-"];

const CRC_RETRIES: u32 = 3;
const CRC_RETRY_DELAY: Duration = Duration::from_millis(200);

/// The first one-wire thermometer found under the sysfs device directory.
pub struct W1Thermometer {
    device_dir: PathBuf,
}

impl W1Thermometer {
    pub fn new(device_dir: impl Into<PathBuf>) -> Self {
        Self {
            device_dir: device_dir.into(),
        }
    }

    async fn slave_file(&self) -> Result<PathBuf, SensorError> {
        let mut entries = tokio::fs::read_dir(&self.device_dir).await?;
        let mut devices = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if THERMOMETER_FAMILIES.iter().any(|family| name.starts_with(family)) {
                devices.push(entry.path());
            }
        }
        devices.sort();

        devices
            .into_iter()
            .next()
            .map(|device| device.join("w1_slave"))
            .ok_or_else(|| SensorError::NoDevice(self.device_dir.clone()))
    }
}

#[async_trait]
impl TemperatureSensor for W1Thermometer {
    async fn read_celsius(&self) -> Result<Celsius, SensorError> {
        let slave = self.slave_file().await?;

        let mut attempt = 0;
        loop {
            match read_slave(&slave).await {
                Err(SensorError::CrcMismatch) if attempt < CRC_RETRIES => {
                    attempt += 1;
                    warn!(attempt, path = ?slave, "Thermometer CRC check failed, retrying");
                    tokio::time::sleep(CRC_RETRY_DELAY).await;
                }
                result => return result,
            }
        }
    }
}

async fn read_slave(path: &Path) -> Result<Celsius, SensorError> {
    let contents = tokio::fs::read_to_string(path).await?;
    debug!(path = ?path, contents = contents.trim(), "Read w1_slave");
    parse_w1_slave(&contents)
}

/// Parse the two-line `w1_slave` output:
///
/// ```text
/// 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
/// 72 01 4b 46 7f ff 0e 10 57 t=23125
/// ```
pub fn parse_w1_slave(contents: &str) -> Result<Celsius, SensorError> {
    let mut lines = contents.lines();
    let status = lines
        .next()
        .ok_or_else(|| SensorError::Malformed("empty output".to_string()))?;
    if !status.trim_end().ends_with("YES") {
        return Err(SensorError::CrcMismatch);
    }

    let data = lines
        .next()
        .ok_or_else(|| SensorError::Malformed("missing data line".to_string()))?;
    let (_, raw) = data
        .rsplit_once("t=")
        .ok_or_else(|| SensorError::Malformed(data.to_string()))?;
    let millidegrees: i64 = raw
        .trim()
        .parse()
        .map_err(|_| SensorError::Malformed(data.to_string()))?;

    Celsius::new(millidegrees as f64 / 1000.0).ok_or(SensorError::NotANumber)
}
