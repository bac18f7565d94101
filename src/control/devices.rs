//! Remotely switchable GPIO devices.

use crate::display::StatusDisplay;
use crate::error::{Result, SystemError};
use crate::hardware::gpio::{GpioProvider, PinLevel};
use crate::lock_unpoisoned;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Static description of one switchable device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSpec {
    /// Short identifier, e.g. `led1` or `relay`
    pub key: String,
    /// Name shown on the display
    pub name: String,
    /// Output pin (BCM)
    pub pin: u8,
    /// The device is on when the pin is LOW
    pub active_low: bool,
    /// Switching this device upsets the LCD, which must be re-initialized
    pub disturbs_display: bool,
}

impl DeviceSpec {
    pub fn new(key: &str, name: &str, pin: u8) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            pin,
            active_low: false,
            disturbs_display: false,
        }
    }

    pub fn active_low(mut self) -> Self {
        self.active_low = true;
        self
    }

    pub fn disturbs_display(mut self) -> Self {
        self.disturbs_display = true;
        self
    }

    /// Reference wiring: three LEDs, a fan and an active-low relay.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("led1", "Yellow Led", 16),
            Self::new("led2", "Red Led", 23),
            Self::new("led3", "Green Led", 24),
            Self::new("fan", "Fan", 22).disturbs_display(),
            Self::new("relay", "Relay", 17).active_low().disturbs_display(),
        ]
    }

    pub fn is_led(&self) -> bool {
        self.key.starts_with("led")
    }
}

/// A device and its current logical state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    #[serde(flatten)]
    pub spec: DeviceSpec,
    pub on: bool,
}

/// Switches devices and reports the change on the display.
///
/// Cloning is cheap; clones share the device table.
#[derive(Clone)]
pub struct DeviceController {
    gpio: Arc<dyn GpioProvider>,
    devices: Arc<Mutex<Vec<Device>>>,
    display: Option<StatusDisplay>,
}

impl DeviceController {
    /// Claim every device pin and switch it off.
    pub fn new(gpio: Arc<dyn GpioProvider>, specs: Vec<DeviceSpec>) -> Result<Self> {
        for spec in &specs {
            gpio.set_output(spec.pin, PinLevel::for_state(false, spec.active_low))?;
        }
        let devices = specs
            .into_iter()
            .map(|spec| Device { spec, on: false })
            .collect();

        Ok(Self {
            gpio,
            devices: Arc::new(Mutex::new(devices)),
            display: None,
        })
    }

    pub fn with_display(mut self, display: StatusDisplay) -> Self {
        self.display = Some(display);
        self
    }

    pub fn display(&self) -> Option<&StatusDisplay> {
        self.display.as_ref()
    }

    /// Snapshot of the device table.
    pub fn devices(&self) -> Vec<Device> {
        lock_unpoisoned(&self.devices).clone()
    }

    /// Keys of the LED devices, in table order.
    pub fn led_keys(&self) -> Vec<String> {
        lock_unpoisoned(&self.devices)
            .iter()
            .filter(|d| d.spec.is_led())
            .map(|d| d.spec.key.clone())
            .collect()
    }

    /// Key of the device at 1-based menu position `index`.
    pub fn key_at(&self, index: usize) -> Option<String> {
        let devices = lock_unpoisoned(&self.devices);
        index
            .checked_sub(1)
            .and_then(|i| devices.get(i))
            .map(|d| d.spec.key.clone())
    }

    pub fn is_on(&self, key: &str) -> Option<bool> {
        lock_unpoisoned(&self.devices)
            .iter()
            .find(|d| d.spec.key == key)
            .map(|d| d.on)
    }

    /// Drive a device without any display feedback.
    pub fn set(&self, key: &str, on: bool) -> Result<()> {
        let mut devices = lock_unpoisoned(&self.devices);
        let device = devices
            .iter_mut()
            .find(|d| d.spec.key == key)
            .ok_or_else(|| SystemError::config_error(format!("Unknown device '{}'", key)))?;

        self.gpio
            .set_output(device.spec.pin, PinLevel::for_state(on, device.spec.active_low))?;
        device.on = on;
        Ok(())
    }

    /// Flip a device and report it. Returns the new state.
    ///
    /// Devices that disturb the display bus force a display re-init instead
    /// of flashing a message.
    pub fn toggle(&self, key: &str) -> Result<bool> {
        let spec = {
            let devices = lock_unpoisoned(&self.devices);
            devices
                .iter()
                .find(|d| d.spec.key == key)
                .map(|d| (d.spec.clone(), d.on))
        };
        let (spec, was_on) =
            spec.ok_or_else(|| SystemError::config_error(format!("Unknown device '{}'", key)))?;

        let on = !was_on;
        self.set(key, on)?;

        let message = format!("{} {}", spec.name, if on { "ON" } else { "OFF" });
        info!("{}", message);

        if let Some(display) = &self.display {
            if spec.disturbs_display {
                debug!("{} switched, scheduling display re-init", spec.name);
                display.force_degraded();
            } else {
                display.flash(&message, "");
            }
        }

        Ok(on)
    }

    /// Switch everything off, logging failures.
    pub fn all_off(&self) {
        for device in self.devices() {
            if let Err(e) = self.set(&device.spec.key, false) {
                warn!("Failed to switch off {}: {}", device.spec.name, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DisplayConfig;
    use crate::display::SimulatedBus;
    use crate::hardware::gpio::SimulatedGpio;

    fn controller() -> (Arc<SimulatedGpio>, DeviceController) {
        let gpio = Arc::new(SimulatedGpio::new());
        let controller = DeviceController::new(gpio.clone(), DeviceSpec::defaults()).unwrap();
        (gpio, controller)
    }

    #[test]
    fn test_devices_start_off() {
        let (gpio, controller) = controller();
        assert_eq!(gpio.level(16), Some(PinLevel::Low));
        // Active-low relay is off when HIGH.
        assert_eq!(gpio.level(17), Some(PinLevel::High));
        assert!(controller.devices().iter().all(|d| !d.on));
    }

    #[test]
    fn test_toggle_honours_active_low() {
        let (gpio, controller) = controller();

        assert!(controller.toggle("led1").unwrap());
        assert_eq!(gpio.level(16), Some(PinLevel::High));

        assert!(controller.toggle("relay").unwrap());
        assert_eq!(gpio.level(17), Some(PinLevel::Low));
        assert!(!controller.toggle("relay").unwrap());
        assert_eq!(gpio.level(17), Some(PinLevel::High));

        assert!(controller.toggle("doorbell").is_err());
    }

    #[test]
    fn test_failed_write_keeps_state() {
        let (gpio, controller) = controller();
        gpio.fail_pin(22, true);
        assert!(controller.toggle("fan").is_err());
        assert_eq!(controller.is_on("fan"), Some(false));
    }

    #[test]
    fn test_menu_positions_and_leds() {
        let (_, controller) = controller();
        assert_eq!(controller.key_at(1).as_deref(), Some("led1"));
        assert_eq!(controller.key_at(5).as_deref(), Some("relay"));
        assert_eq!(controller.key_at(0), None);
        assert_eq!(controller.key_at(6), None);
        assert_eq!(controller.led_keys(), vec!["led1", "led2", "led3"]);
    }

    #[tokio::test]
    async fn test_display_feedback() {
        let bus = SimulatedBus::default();
        let display =
            StatusDisplay::open(Arc::new(bus.clone()), None, DisplayConfig::default()).unwrap();
        let (_, controller) = controller();
        let controller = controller.with_display(display.clone());

        controller.toggle("led2").unwrap();
        assert_eq!(bus.rows(), vec!["Red Led ON", ""]);

        controller.toggle("fan").unwrap();
        assert!(display.health().is_degraded());
        assert_eq!(bus.rows(), vec!["Red Led ON", ""]);
    }
}
