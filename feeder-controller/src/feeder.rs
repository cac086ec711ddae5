use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::GpioError;
use crate::ports::OutputPin;

/// Drives the feeder motor output for a fixed time per request.
///
/// Requests run one at a time. The output is always driven inactive once a
/// run ends, including when the run is cut short by shutdown.
pub struct FeederActuator {
    pin: Arc<dyn OutputPin>,
    lock: Mutex<()>,
    cancel: CancellationToken,
}

impl FeederActuator {
    pub fn new(pin: Arc<dyn OutputPin>) -> Self {
        Self {
            pin,
            lock: Mutex::new(()),
            cancel: CancellationToken::new(),
        }
    }

    pub async fn run(&self, duration: Duration) -> Result<(), GpioError> {
        let _guard = self.lock.lock().await;
        if self.cancel.is_cancelled() {
            return Ok(());
        }

        info!(duration_secs = duration.as_secs_f64(), "Feeding");
        let activated = self.pin.set_active(true);
        if activated.is_ok() {
            tokio::select! {
                _ = self.cancel.cancelled() => info!("Feeding interrupted by shutdown"),
                _ = tokio::time::sleep(duration) => {}
            }
        }
        let deactivated = self.pin.set_active(false);

        activated?;
        deactivated?;
        info!("Feeding finished");
        Ok(())
    }

    /// Abort any run in progress and leave the output inactive.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let _guard = self.lock.lock().await;
        if let Err(e) = self.pin.set_active(false) {
            warn!(error = %e, "Failed to drive feeder output inactive");
        }
    }
}
