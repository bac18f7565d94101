//! Best-effort publication of named numeric values.

use tracing::info;

/// Outbound telemetry sink.
///
/// Implementations must not block for long and must never panic; a `false`
/// return only means the value was dropped.
pub trait Telemetry: Send + Sync {
    fn publish(&self, name: &str, value: f64) -> bool;
}

/// Emits every value as a structured `tracing` event on the `telemetry` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn publish(&self, name: &str, value: f64) -> bool {
        info!(target: "telemetry", feed = name, value, "published");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_telemetry_accepts_everything() {
        let telemetry = TracingTelemetry;
        assert!(telemetry.publish("motion_feed", 3.0));
        assert!(telemetry.publish("online_status", 0.0));
    }
}
