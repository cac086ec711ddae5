use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use crate::error::GpioError;
use crate::ports::OutputPin;

/// Output pin for machines without GPIO; it only logs.
pub struct SimulatedPin {
    pin: u8,
    active: AtomicBool,
}

impl SimulatedPin {
    pub fn new(pin: u8) -> Self {
        Self {
            pin,
            active: AtomicBool::new(false),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl OutputPin for SimulatedPin {
    fn set_active(&self, active: bool) -> Result<(), GpioError> {
        self.active.store(active, Ordering::Release);
        info!(pin = self.pin, active, "Simulated output changed");
        Ok(())
    }
}

#[cfg(feature = "rpi")]
pub use rpi::{MotionSensor, RpiOutputPin};

#[cfg(feature = "rpi")]
mod rpi {
    use std::sync::Mutex;
    use std::time::Duration;

    use rppal::gpio::{Gpio, InputPin, Trigger};
    use tokio::sync::mpsc;
    use tracing::{info, warn};

    use crate::error::GpioError;
    use crate::event::DeviceEvent;
    use crate::ports::OutputPin;

    fn pin_error(pin: u8, error: rppal::gpio::Error) -> GpioError {
        GpioError::Pin {
            pin,
            message: error.to_string(),
        }
    }

    /// A BCM output pin, initialised low.
    pub struct RpiOutputPin {
        pin: u8,
        output: Mutex<rppal::gpio::OutputPin>,
    }

    impl RpiOutputPin {
        pub fn new(gpio: &Gpio, pin: u8) -> Result<Self, GpioError> {
            let output = gpio.get(pin).map_err(|e| pin_error(pin, e))?.into_output_low();
            Ok(Self {
                pin,
                output: Mutex::new(output),
            })
        }
    }

    impl OutputPin for RpiOutputPin {
        fn set_active(&self, active: bool) -> Result<(), GpioError> {
            let mut output = self.output.lock().map_err(|_| GpioError::Pin {
                pin: self.pin,
                message: "output lock poisoned".to_string(),
            })?;
            if active {
                output.set_high();
            } else {
                output.set_low();
            }
            Ok(())
        }
    }

    /// Motion sensor input. The interrupt stays armed while this is alive.
    pub struct MotionSensor {
        _input: InputPin,
    }

    impl MotionSensor {
        /// Pulled-down input; each debounced rising edge is sent as
        /// [`DeviceEvent::MotionDetected`]. Edges arriving while the channel
        /// is full are dropped.
        pub fn new(
            gpio: &Gpio,
            pin: u8,
            debounce: Duration,
            events: mpsc::Sender<DeviceEvent>,
        ) -> Result<Self, GpioError> {
            let mut input = gpio
                .get(pin)
                .map_err(|e| pin_error(pin, e))?
                .into_input_pulldown();
            input
                .set_async_interrupt(Trigger::RisingEdge, Some(debounce), move |_| {
                    if let Err(e) = events.try_send(DeviceEvent::MotionDetected) {
                        warn!(error = %e, "Dropped motion event");
                    }
                })
                .map_err(|e| pin_error(pin, e))?;

            info!(pin, debounce_ms = debounce.as_millis() as u64, "Motion sensor armed");
            Ok(Self { _input: input })
        }
    }
}
