//! Intrusion detection: ranging, debouncing, alarm actuators and photo capture.

pub mod actuator;
pub mod alert;
pub mod capture;
pub mod data;
pub mod ranging;

pub use actuator::{ActuatorLoop, BlinkPattern};
pub use alert::{evaluate_burst, AlertController};
pub use capture::{CaptureThrottle, DEFAULT_CAPTURE_COOLDOWN};
pub use data::{AlarmFlag, AlarmState, CaptureRecord, CycleOutcome, ImageHandle, RangeSample};
pub use ranging::{distance_from_echo, RangeFinder, RangeSensor};
