pub mod adapters;
pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod feeder;
pub mod http;
pub mod imaging;
pub mod media;
pub mod monitor;
pub mod ports;
pub mod router;
pub mod status;
pub mod temperature;

pub use config::{Config, ConfigError, StorageConfig};
pub use controller::{Controller, Ports};
pub use error::OperationError;
pub use event::DeviceEvent;
pub use monitor::{ConnectionMonitor, ReportingSchedule, run_reporting_loop};
pub use router::{Command, CommandRouter};
