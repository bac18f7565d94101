//! # DomiSafe - Raspberry Pi Home Security Appliance
//!
//! Intrusion detection with an ultrasonic range sensor, an alert LED and
//! buzzer, rate-limited intruder photos and a self-healing status LCD, plus
//! remote device toggles and telemetry reporting.
//!
//! ## Features
//!
//! - **Debounced alarm**: bursts of range samples, OR-to-trigger, hold on sensor dropout
//! - **Actuator loops**: LED blink and buzzer beep with bounded shutoff latency
//! - **Photo capture**: at most one intruder photo per cooldown window
//! - **Status display**: override messages and automatic recovery after bus failures
//! - **Simulation**: every hardware boundary has an in-memory stand-in (default build)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use domisafe::{
//!     AlertController, AppConfig, CaptureThrottle, DirectorySink, RangeSensor, SimulatedGpio,
//!     StillCamera,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::new();
//!     let gpio = Arc::new(SimulatedGpio::new());
//!
//!     let sensor = RangeSensor::new(gpio.clone(), config.security.trigger_pin, config.security.echo_pin)?;
//!     let capture = CaptureThrottle::new(
//!         Arc::new(StillCamera::default()),
//!         Arc::new(DirectorySink::new(&config.capture.image_dir)?),
//!     );
//!     let mut alert = AlertController::new(sensor, gpio, capture, config.security.clone());
//!
//!     let outcome = alert.poll_cycle().await;
//!     println!("alarm active: {}", outcome.alarm_active);
//!     alert.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod config;
pub mod control;
pub mod display;
pub mod error;
pub mod hardware;
pub mod monitor;
pub mod security;
pub mod telemetry;

// Re-export public API
pub use config::{
    AppConfig, CaptureConfig, DisplayConfig, EnvironmentConfig, ReportingConfig, SecurityConfig,
};
pub use control::{Command, DeviceController, DeviceSpec, PartyMode};
pub use display::{DisplayError, DisplayFrame, SimulatedBus, StatusDisplay};
pub use error::{Result, SystemError};
pub use hardware::{
    DefaultGpioProvider, DirectorySink, EnvironmentReading, EnvironmentSource, GpioProvider,
    PinLevel, SimulatedGpio, StillCamera, ThermalZoneSource,
};
pub use monitor::SecurityMonitor;
pub use security::{
    AlarmState, AlertController, CaptureRecord, CaptureThrottle, CycleOutcome, ImageHandle,
    RangeFinder, RangeSensor,
};
pub use telemetry::{Telemetry, TracingTelemetry};

#[cfg(feature = "gpio")]
pub use display::{I2cDisplayBus, Pcf8574Lcd};
#[cfg(feature = "gpio")]
pub use hardware::environment::Dht11Source;
#[cfg(feature = "gpio")]
pub use hardware::gpio::RaspberryPiGpio;

/// The default alarm trigger distance in centimeters
pub const DEFAULT_THRESHOLD_CM: f64 = 10.0;

/// The default alarm evaluation interval in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 200;

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// All guarded state here stays consistent across a panic (plain values and
/// hardware handles), so poisoning carries no information.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
