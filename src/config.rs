//! Appliance configuration.
//!
//! Every section has working defaults for the reference wiring; the binary
//! overrides individual values from command-line flags through the `with_*`
//! builders.

use crate::control::devices::DeviceSpec;
use crate::error::{Result, SystemError};
use crate::hardware::gpio::MAX_BCM_PIN;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Widest line an HD44780 controller can address.
pub const MAX_DISPLAY_COLUMNS: usize = 40;

/// Most lines an HD44780 controller can address.
pub const MAX_DISPLAY_ROWS: usize = 4;

/// Top-level configuration for the appliance.
///
/// Sections missing from a serialized config fall back to the reference
/// defaults of [`AppConfig::new`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Intrusion detection and alarm actuators
    pub security: SecurityConfig,
    /// Intruder photo capture
    pub capture: CaptureConfig,
    /// Status LCD
    pub display: DisplayConfig,
    /// Telemetry cadence
    pub reporting: ReportingConfig,
    /// Room temperature and humidity sensor
    pub environment: EnvironmentConfig,
    /// Remotely switchable devices
    pub devices: Vec<DeviceSpec>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Intrusion detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Ultrasonic trigger output (BCM)
    pub trigger_pin: u8,
    /// Ultrasonic echo input (BCM)
    pub echo_pin: u8,
    /// Alert LED output (BCM)
    pub led_pin: u8,
    /// Buzzer output (BCM)
    pub buzzer_pin: u8,
    /// Any sample at or below this distance raises the alarm
    pub threshold_cm: f64,
    /// Samples taken per evaluation cycle
    pub samples_per_cycle: usize,
    /// Pause between samples of one cycle, in milliseconds
    pub sample_spacing_ms: u64,
    /// Evaluation cadence in milliseconds
    pub poll_interval_ms: u64,
    /// Bound on joining the actuator loops at shutdown, in milliseconds
    pub shutdown_timeout_ms: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            trigger_pin: 5,
            echo_pin: 12,
            led_pin: 21,
            buzzer_pin: 18,
            threshold_cm: 10.0,
            samples_per_cycle: 3,
            sample_spacing_ms: 10,
            poll_interval_ms: 200,
            shutdown_timeout_ms: 1000,
        }
    }
}

impl SecurityConfig {
    pub fn sample_spacing(&self) -> Duration {
        Duration::from_millis(self.sample_spacing_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Photo capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Whether alarms take photos at all
    pub enabled: bool,
    /// Minimum seconds between two photos
    pub cooldown_secs: u64,
    /// Where photos and placeholders are written
    pub image_dir: PathBuf,
    /// Still-capture program invoked for each photo
    pub camera_program: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_secs: 10,
            image_dir: PathBuf::from("captured_images"),
            camera_program: "rpicam-still".to_string(),
        }
    }
}

impl CaptureConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Status display settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Whether to drive an LCD at all
    pub enabled: bool,
    /// Characters per line
    pub width: usize,
    /// Number of lines
    pub rows: usize,
    /// I2C bus number
    pub i2c_bus: u8,
    /// Backpack addresses probed in order
    pub candidate_addresses: Vec<u8>,
    /// Refresh and recovery cadence in milliseconds
    pub refresh_interval_ms: u64,
    /// How long override messages stay pinned, in milliseconds
    pub override_ttl_ms: u64,
    /// Bound on joining the refresh loop at shutdown, in milliseconds
    pub shutdown_timeout_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            width: 16,
            rows: 2,
            i2c_bus: 1,
            candidate_addresses: vec![0x27, 0x3f],
            refresh_interval_ms: 5000,
            override_ttl_ms: 2000,
            shutdown_timeout_ms: 2000,
        }
    }
}

impl DisplayConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn override_ttl(&self) -> Duration {
        Duration::from_millis(self.override_ttl_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Telemetry cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    /// Seconds between motion summaries
    pub summary_interval_secs: u64,
    /// Seconds between heartbeats
    pub heartbeat_interval_secs: u64,
    /// Seconds between temperature and humidity reports
    pub environment_interval_secs: u64,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            summary_interval_secs: 30,
            heartbeat_interval_secs: 30,
            environment_interval_secs: 30,
        }
    }
}

impl ReportingConfig {
    pub fn summary_interval(&self) -> Duration {
        Duration::from_secs(self.summary_interval_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn environment_interval(&self) -> Duration {
        Duration::from_secs(self.environment_interval_secs)
    }
}

/// DHT11 room sensor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Whether a room sensor is wired at all
    pub enabled: bool,
    /// DHT11 data line (BCM)
    pub dht_pin: u8,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dht_pin: 4,
        }
    }
}

impl AppConfig {
    /// Reference configuration, including the default device table.
    pub fn new() -> Self {
        Self {
            security: SecurityConfig::default(),
            capture: CaptureConfig::default(),
            display: DisplayConfig::default(),
            reporting: ReportingConfig::default(),
            environment: EnvironmentConfig::default(),
            devices: DeviceSpec::defaults(),
        }
    }

    /// Set the alarm trigger distance.
    pub fn with_threshold_cm(mut self, threshold_cm: f64) -> Self {
        self.security.threshold_cm = threshold_cm;
        self
    }

    /// Set the alarm evaluation cadence.
    pub fn with_poll_interval_ms(mut self, interval_ms: u64) -> Self {
        self.security.poll_interval_ms = interval_ms;
        self
    }

    /// Enable or disable photo capture.
    pub fn with_camera(mut self, enabled: bool) -> Self {
        self.capture.enabled = enabled;
        self
    }

    /// Set the photo directory.
    pub fn with_image_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.capture.image_dir = dir.into();
        self
    }

    /// Enable or disable the status LCD.
    pub fn with_display(mut self, enabled: bool) -> Self {
        self.display.enabled = enabled;
        self
    }

    /// Set the LCD refresh cadence.
    pub fn with_refresh_interval_ms(mut self, interval_ms: u64) -> Self {
        self.display.refresh_interval_ms = interval_ms;
        self
    }

    /// Check values the hardware cannot work with.
    pub fn validate(&self) -> Result<()> {
        let security = &self.security;
        if !(security.threshold_cm > 0.0) {
            return Err(SystemError::config_error(format!(
                "threshold must be positive, got {}",
                security.threshold_cm
            )));
        }
        if security.samples_per_cycle == 0 {
            return Err(SystemError::config_error(
                "at least one sample per cycle is required",
            ));
        }
        if security.poll_interval_ms == 0 {
            return Err(SystemError::config_error("poll interval must be non-zero"));
        }
        let display = &self.display;
        if !(1..=MAX_DISPLAY_COLUMNS).contains(&display.width)
            || !(1..=MAX_DISPLAY_ROWS).contains(&display.rows)
        {
            return Err(SystemError::config_error(format!(
                "display geometry {}x{} outside 1..={}x1..={}",
                display.width, display.rows, MAX_DISPLAY_COLUMNS, MAX_DISPLAY_ROWS
            )));
        }
        if self.display.enabled && self.display.candidate_addresses.is_empty() {
            return Err(SystemError::config_error(
                "no candidate display addresses configured",
            ));
        }

        let mut pins = HashSet::new();
        let wired = [
            ("trigger", security.trigger_pin),
            ("echo", security.echo_pin),
            ("led", security.led_pin),
            ("buzzer", security.buzzer_pin),
        ]
        .into_iter()
        .chain(
            self.environment
                .enabled
                .then_some(("dht", self.environment.dht_pin)),
        )
        .chain(self.devices.iter().map(|d| (d.key.as_str(), d.pin)));

        for (name, pin) in wired {
            if pin > MAX_BCM_PIN {
                return Err(SystemError::config_error(format!(
                    "{} pin {} is not a BCM GPIO",
                    name, pin
                )));
            }
            if !pins.insert(pin) {
                return Err(SystemError::config_error(format!(
                    "pin {} is assigned twice ({})",
                    pin, name
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_defaults() {
        let config = AppConfig::new();
        assert_eq!(config.security.threshold_cm, 10.0);
        assert_eq!(config.security.poll_interval(), Duration::from_millis(200));
        assert_eq!(config.capture.cooldown(), Duration::from_secs(10));
        assert_eq!(config.display.candidate_addresses, vec![0x27, 0x3f]);
        assert_eq!(config.display.override_ttl(), Duration::from_secs(2));
        assert_eq!(config.devices.len(), 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = AppConfig::new()
            .with_threshold_cm(25.0)
            .with_poll_interval_ms(500)
            .with_camera(false)
            .with_image_dir("/tmp/shots")
            .with_display(false)
            .with_refresh_interval_ms(1000);

        assert_eq!(config.security.threshold_cm, 25.0);
        assert_eq!(config.security.poll_interval_ms, 500);
        assert!(!config.capture.enabled);
        assert_eq!(config.capture.image_dir, PathBuf::from("/tmp/shots"));
        assert!(!config.display.enabled);
        assert_eq!(config.display.refresh_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(AppConfig::new().with_threshold_cm(0.0).validate().is_err());
        assert!(AppConfig::new().with_threshold_cm(f64::NAN).validate().is_err());
        assert!(AppConfig::new().with_poll_interval_ms(0).validate().is_err());

        let mut clash = AppConfig::new();
        clash.security.buzzer_pin = clash.security.led_pin;
        let err = clash.validate().unwrap_err();
        assert!(err.to_string().contains("assigned twice"));

        let mut off_header = AppConfig::new();
        off_header.security.echo_pin = 40;
        assert!(off_header.validate().is_err());
    }

    #[test]
    fn test_display_geometry_bounds() {
        let mut wide = AppConfig::new();
        wide.display.width = 41;
        assert!(wide.validate().is_err());

        let mut tall = AppConfig::new();
        tall.display.rows = 5;
        assert!(tall.validate().is_err());

        let mut largest = AppConfig::new();
        largest.display.width = MAX_DISPLAY_COLUMNS;
        largest.display.rows = MAX_DISPLAY_ROWS;
        assert!(largest.validate().is_ok());

        let mut empty = AppConfig::new();
        empty.display.rows = 0;
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_partial_config_keeps_reference_defaults() {
        assert_eq!(AppConfig::default().devices, DeviceSpec::defaults());

        let parsed: AppConfig =
            serde_json::from_str(r#"{"security": {"threshold_cm": 25.0}}"#).unwrap();
        assert_eq!(parsed.security.threshold_cm, 25.0);
        assert_eq!(parsed.security.echo_pin, 12);
        assert_eq!(parsed.devices.len(), 5);
        assert_eq!(parsed.environment.dht_pin, 4);
        assert_eq!(parsed.reporting.environment_interval(), Duration::from_secs(30));
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_dht_pin_joins_clash_check() {
        let mut clash = AppConfig::new();
        clash.environment.dht_pin = clash.security.echo_pin;
        assert!(clash.validate().is_err());

        clash.environment.enabled = false;
        assert!(clash.validate().is_ok());
    }

    #[test]
    fn test_config_json_round_trip() {
        let json = serde_json::to_string(&AppConfig::new()).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.security.echo_pin, 12);
        assert_eq!(parsed.devices[4].key, "relay");
        assert!(parsed.devices[4].active_low);
    }
}
