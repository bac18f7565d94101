//! Data structures for the intrusion alarm.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

/// One ranging result in centimeters; `None` means no echo was observed.
pub type RangeSample = Option<f64>;

/// Debounced alarm state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmState {
    /// Nothing within the trigger distance
    #[default]
    Idle,
    /// An object was detected within the trigger distance
    Alarm,
}

impl AlarmState {
    pub fn is_active(self) -> bool {
        self == AlarmState::Alarm
    }
}

/// Shared view of the alarm state for the actuator loops.
///
/// Only the alert controller flips it; everything else just reads.
#[derive(Debug, Default)]
pub struct AlarmFlag(AtomicBool);

impl AlarmFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn set(&self, active: bool) {
        self.0.store(active, Ordering::Release);
    }
}

/// Where a captured photo ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum ImageHandle {
    /// A stored image file
    Image(PathBuf),
    /// A text placeholder written because the camera failed
    Placeholder(PathBuf),
    /// Neither the image nor the placeholder could be written
    Unavailable,
}

impl ImageHandle {
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            ImageHandle::Image(path) | ImageHandle::Placeholder(path) => Some(path),
            ImageHandle::Unavailable => None,
        }
    }
}

/// A rate-limited photo capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRecord {
    /// Wall-clock time of the capture
    pub taken_at: DateTime<Local>,
    /// Stored image, placeholder, or sentinel
    pub handle: ImageHandle,
}

/// Result of one alarm evaluation cycle, for telemetry and storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleOutcome {
    /// When the cycle finished
    pub timestamp: DateTime<Local>,
    /// Whether the alarm is active after this cycle
    pub alarm_active: bool,
    /// Last present sample of the burst, if any
    pub distance_cm: Option<f64>,
    /// Photo taken during this cycle, if any
    pub capture: Option<CaptureRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alarm_flag() {
        let flag = AlarmFlag::new();
        assert!(!flag.is_active());
        flag.set(true);
        assert!(flag.is_active());
        flag.set(false);
        assert!(!flag.is_active());
    }

    #[test]
    fn test_image_handle_json() {
        let handle = ImageHandle::Image(PathBuf::from("/tmp/intruder_1.jpg"));
        let json = serde_json::to_value(&handle).unwrap();
        assert_eq!(json["kind"], "image");
        assert_eq!(json["path"], "/tmp/intruder_1.jpg");

        let sentinel = serde_json::to_value(ImageHandle::Unavailable).unwrap();
        assert_eq!(sentinel["kind"], "unavailable");
        assert_eq!(ImageHandle::Unavailable.path(), None);
    }

    #[test]
    fn test_cycle_outcome_json_fields() {
        let outcome = CycleOutcome {
            timestamp: Local::now(),
            alarm_active: true,
            distance_cm: Some(9.0),
            capture: None,
        };
        let json: serde_json::Value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["alarm_active"], true);
        assert_eq!(json["distance_cm"], 9.0);
        assert!(json.get("timestamp").is_some());
        assert!(json["capture"].is_null());
    }
}
