//! HC-SR04 style ultrasonic ranging.

use crate::error::Result;
use crate::hardware::gpio::{GpioProvider, PinLevel};
use crate::security::data::RangeSample;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Speed of sound used for the round-trip conversion, in cm/s.
pub const SPEED_OF_SOUND_CM_PER_S: f64 = 34_300.0;

/// Width of the trigger pulse.
pub const TRIGGER_PULSE: Duration = Duration::from_micros(10);

/// Bound on each echo edge wait.
pub const ECHO_TIMEOUT: Duration = Duration::from_millis(40);

/// Anything that can produce a single range sample.
///
/// `Ok(None)` is a timeout (no echo); `Err` is a pin access failure the
/// caller should log.
pub trait RangeFinder: Send + 'static {
    fn measure(&mut self) -> Result<RangeSample>;
}

/// Ultrasonic sensor wired to a trigger output and an echo input.
pub struct RangeSensor {
    gpio: Arc<dyn GpioProvider>,
    trigger_pin: u8,
    echo_pin: u8,
    echo_timeout: Duration,
}

impl RangeSensor {
    /// Create a sensor and park the trigger line low.
    pub fn new(gpio: Arc<dyn GpioProvider>, trigger_pin: u8, echo_pin: u8) -> Result<Self> {
        gpio.set_output(trigger_pin, PinLevel::Low)?;
        Ok(Self {
            gpio,
            trigger_pin,
            echo_pin,
            echo_timeout: ECHO_TIMEOUT,
        })
    }

    pub fn with_echo_timeout(mut self, timeout: Duration) -> Self {
        self.echo_timeout = timeout;
        self
    }

    /// Busy-wait until the echo line reads `level`, returning when it did.
    fn wait_for(&self, level: PinLevel) -> Result<Option<Instant>> {
        let deadline = Instant::now() + self.echo_timeout;
        loop {
            if self.gpio.read_input(self.echo_pin)? == level {
                return Ok(Some(Instant::now()));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::hint::spin_loop();
        }
    }
}

impl RangeFinder for RangeSensor {
    fn measure(&mut self) -> Result<RangeSample> {
        self.gpio.set_output(self.trigger_pin, PinLevel::High)?;
        thread::sleep(TRIGGER_PULSE);
        self.gpio.set_output(self.trigger_pin, PinLevel::Low)?;

        // A line that is still high belongs to an earlier ping; only a
        // rising edge seen after a LOW read starts the timing.
        if self.wait_for(PinLevel::Low)?.is_none() {
            tracing::debug!("ultrasonic: echo line never went LOW");
            return Ok(None);
        }

        let Some(rise) = self.wait_for(PinLevel::High)? else {
            tracing::debug!("ultrasonic: timeout waiting for echo HIGH");
            return Ok(None);
        };

        let Some(fall) = self.wait_for(PinLevel::Low)? else {
            tracing::debug!("ultrasonic: timeout waiting for echo LOW");
            return Ok(None);
        };

        Ok(distance_from_echo(fall.saturating_duration_since(rise)))
    }
}

/// Convert an echo pulse width to centimeters, rounded to one decimal.
///
/// A zero-length pulse is not a reading.
pub fn distance_from_echo(elapsed: Duration) -> RangeSample {
    if elapsed.is_zero() {
        return None;
    }
    let distance = elapsed.as_secs_f64() * SPEED_OF_SOUND_CM_PER_S / 2.0;
    Some((distance * 10.0).round() / 10.0)
}
