use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ReportingConfig;
use crate::temperature::TemperatureReporter;

/// Shared broker connection state.
#[derive(Clone)]
pub struct ConnectionMonitor {
    inner: Arc<Inner>,
}

struct Inner {
    connected: AtomicBool,
    startup_time: Instant,
}

impl ConnectionMonitor {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                connected: AtomicBool::new(false),
                startup_time: Instant::now(),
            }),
        }
    }

    /// Record the new state and return the previous one.
    pub fn set_connected(&self, connected: bool) -> bool {
        self.inner.connected.swap(connected, Ordering::AcqRel)
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Get the controller uptime in seconds.
    pub fn uptime_secs(&self) -> u64 {
        self.inner.startup_time.elapsed().as_secs()
    }
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Timing of the periodic temperature loop.
#[derive(Debug, Clone, Copy)]
pub struct ReportingSchedule {
    /// Pause after each report.
    pub interval: Duration,
    /// Pause between connection checks.
    pub wait: Duration,
}

impl From<&ReportingConfig> for ReportingSchedule {
    fn from(config: &ReportingConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_secs),
            wait: Duration::from_secs(config.wait_secs),
        }
    }
}

/// Report the temperature every `schedule.interval` while the broker is
/// connected, checking the connection every `schedule.wait` otherwise.
pub async fn run_reporting_loop(
    monitor: ConnectionMonitor,
    reporter: Arc<TemperatureReporter>,
    schedule: ReportingSchedule,
    cancel: CancellationToken,
) {
    info!(
        interval_secs = schedule.interval.as_secs(),
        wait_secs = schedule.wait.as_secs(),
        "Temperature reporting loop started"
    );

    loop {
        if !pause(schedule.wait, &cancel).await {
            break;
        }

        if monitor.is_connected() {
            reporter.report_or_notify().await;
            if !pause(schedule.interval, &cancel).await {
                break;
            }
        } else {
            info!("Waiting for connection");
        }
    }

    info!("Temperature reporting loop shutting down");
}

/// Sleep for `duration`; `false` if cancelled first.
async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
