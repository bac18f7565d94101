//! GPIO (General Purpose Input/Output) access for the Raspberry Pi.
//!
//! The alarm path only needs two primitives: drive an output pin and sample an
//! input pin. Real hardware access goes through `rppal` and is feature-gated so
//! the crate builds and tests on machines without a GPIO header; everywhere
//! else an in-memory [`SimulatedGpio`] records writes and serves scripted
//! input levels.

use crate::error::{Result, SystemError};
use crate::lock_unpoisoned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Highest BCM pin number exposed on the 40-pin header.
pub const MAX_BCM_PIN: u8 = 27;

/// Logic level of a GPIO pin.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PinLevel {
    /// Pin is driven or read low
    Low,
    /// Pin is driven or read high
    High,
}

impl PinLevel {
    /// Level for a logical "on" state, honouring active-low wiring.
    pub fn for_state(on: bool, active_low: bool) -> Self {
        if on != active_low {
            PinLevel::High
        } else {
            PinLevel::Low
        }
    }

    pub fn is_high(self) -> bool {
        self == PinLevel::High
    }
}

/// Trait for pin-level GPIO operations.
///
/// Both calls are synchronous and return promptly; the only waits in the
/// system are the ranging echo loops built on top of `read_input`.
pub trait GpioProvider: Send + Sync {
    /// Drive `pin` as an output at `level`.
    fn set_output(&self, pin: u8, level: PinLevel) -> Result<()>;

    /// Sample the current level of input `pin`.
    fn read_input(&self, pin: u8) -> Result<PinLevel>;

    /// Check if a specific pin is available.
    fn is_pin_available(&self, pin: u8) -> bool {
        pin <= MAX_BCM_PIN
    }
}

#[cfg(feature = "gpio")]
mod raspberry_pi {
    use super::*;
    use rppal::gpio::{Gpio, InputPin, Level, OutputPin};

    /// Raspberry Pi GPIO provider using rppal.
    ///
    /// Pins are claimed lazily on first use and stay claimed for the lifetime
    /// of the provider, so repeated writes don't re-export the pin.
    pub struct RaspberryPiGpio {
        gpio: Gpio,
        outputs: Mutex<HashMap<u8, OutputPin>>,
        inputs: Mutex<HashMap<u8, InputPin>>,
    }

    impl RaspberryPiGpio {
        /// Create a new Raspberry Pi GPIO provider.
        pub fn new() -> Result<Self> {
            let gpio = Gpio::new().map_err(|e| {
                SystemError::gpio_error(format!("Failed to initialize GPIO: {}", e))
            })?;

            Ok(Self {
                gpio,
                outputs: Mutex::new(HashMap::new()),
                inputs: Mutex::new(HashMap::new()),
            })
        }

        fn check_pin(&self, pin: u8) -> Result<()> {
            if self.is_pin_available(pin) {
                Ok(())
            } else {
                Err(SystemError::gpio_error(format!(
                    "Pin {} is not available",
                    pin
                )))
            }
        }
    }

    impl GpioProvider for RaspberryPiGpio {
        fn set_output(&self, pin: u8, level: PinLevel) -> Result<()> {
            self.check_pin(pin)?;

            let mut outputs = lock_unpoisoned(&self.outputs);
            if !outputs.contains_key(&pin) {
                let claimed = self
                    .gpio
                    .get(pin)
                    .map_err(|e| {
                        SystemError::gpio_error(format!("Failed to claim pin {}: {}", pin, e))
                    })?
                    .into_output();
                outputs.insert(pin, claimed);
            }

            if let Some(output) = outputs.get_mut(&pin) {
                match level {
                    PinLevel::High => output.set_high(),
                    PinLevel::Low => output.set_low(),
                }
            }

            Ok(())
        }

        fn read_input(&self, pin: u8) -> Result<PinLevel> {
            self.check_pin(pin)?;

            let mut inputs = lock_unpoisoned(&self.inputs);
            if !inputs.contains_key(&pin) {
                let claimed = self
                    .gpio
                    .get(pin)
                    .map_err(|e| {
                        SystemError::gpio_error(format!("Failed to claim pin {}: {}", pin, e))
                    })?
                    .into_input();
                inputs.insert(pin, claimed);
            }

            let level = inputs
                .get(&pin)
                .map(|input| input.read())
                .unwrap_or(Level::Low);

            Ok(match level {
                Level::High => PinLevel::High,
                Level::Low => PinLevel::Low,
            })
        }
    }
}

/// In-memory GPIO provider for systems without a GPIO header.
///
/// Records every output write per pin, serves input levels set with
/// [`SimulatedGpio::set_input`], and can be told to fail writes on a pin.
#[derive(Debug, Default)]
pub struct SimulatedGpio {
    state: Mutex<SimulatedPins>,
}

#[derive(Debug, Default)]
struct SimulatedPins {
    outputs: HashMap<u8, PinLevel>,
    inputs: HashMap<u8, PinLevel>,
    history: Vec<(u8, PinLevel)>,
    failing: HashSet<u8>,
}

impl SimulatedGpio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last level written to output `pin`, if any.
    pub fn level(&self, pin: u8) -> Option<PinLevel> {
        lock_unpoisoned(&self.state).outputs.get(&pin).copied()
    }

    /// Every level written to `pin`, oldest first.
    pub fn history(&self, pin: u8) -> Vec<PinLevel> {
        lock_unpoisoned(&self.state)
            .history
            .iter()
            .filter(|(p, _)| *p == pin)
            .map(|(_, level)| *level)
            .collect()
    }

    /// Set the level returned by `read_input(pin)`.
    pub fn set_input(&self, pin: u8, level: PinLevel) {
        lock_unpoisoned(&self.state).inputs.insert(pin, level);
    }

    /// Make writes to `pin` fail until called again with `false`.
    pub fn fail_pin(&self, pin: u8, failing: bool) {
        let mut state = lock_unpoisoned(&self.state);
        if failing {
            state.failing.insert(pin);
        } else {
            state.failing.remove(&pin);
        }
    }
}

impl GpioProvider for SimulatedGpio {
    fn set_output(&self, pin: u8, level: PinLevel) -> Result<()> {
        let mut state = lock_unpoisoned(&self.state);
        if state.failing.contains(&pin) {
            return Err(SystemError::gpio_error(format!(
                "simulated write failure on pin {}",
                pin
            )));
        }
        state.outputs.insert(pin, level);
        state.history.push((pin, level));
        Ok(())
    }

    fn read_input(&self, pin: u8) -> Result<PinLevel> {
        Ok(lock_unpoisoned(&self.state)
            .inputs
            .get(&pin)
            .copied()
            .unwrap_or(PinLevel::Low))
    }
}

#[cfg(feature = "gpio")]
pub use raspberry_pi::RaspberryPiGpio;

// Re-export the appropriate GPIO provider
#[cfg(feature = "gpio")]
pub use raspberry_pi::RaspberryPiGpio as DefaultGpioProvider;

#[cfg(not(feature = "gpio"))]
pub use self::SimulatedGpio as DefaultGpioProvider;
