//! Process-level alarm loop and telemetry reporting.
//!
//! [`SecurityMonitor`] drives the [`AlertController`] on its polling cadence
//! and turns cycle outcomes into telemetry: the running motion count on every
//! alarm cycle, a periodic summary that resets the count, and a heartbeat.
//! With an environment source attached it also reports temperature and
//! humidity on their own cadence.

use crate::config::ReportingConfig;
use crate::error::{Result, SystemError};
use crate::hardware::environment::{EnvironmentReading, EnvironmentSource};
use crate::security::alert::AlertController;
use crate::security::data::CycleOutcome;
use crate::security::ranging::RangeFinder;
use crate::telemetry::Telemetry;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Running motion count and the periodic summary share this feed.
pub const FEED_MOTION: &str = "motion_feed";
pub const FEED_HEARTBEAT: &str = "heartbeat";
pub const FEED_ONLINE: &str = "online_status";
pub const FEED_TEMPERATURE: &str = "temperature";
pub const FEED_HUMIDITY: &str = "humidity";

pub struct SecurityMonitor<R: RangeFinder> {
    alert: AlertController<R>,
    telemetry: Arc<dyn Telemetry>,
    poll_interval: Duration,
    reporting: ReportingConfig,
    environment: Option<Arc<dyn EnvironmentSource>>,
    motion_count: u64,
    last_summary: Instant,
    last_heartbeat: Option<Instant>,
    last_environment: Option<Instant>,
}

impl<R: RangeFinder> SecurityMonitor<R> {
    pub fn new(
        alert: AlertController<R>,
        telemetry: Arc<dyn Telemetry>,
        poll_interval: Duration,
        reporting: ReportingConfig,
    ) -> Self {
        Self {
            alert,
            telemetry,
            poll_interval,
            reporting,
            environment: None,
            motion_count: 0,
            last_summary: Instant::now(),
            last_heartbeat: None,
            last_environment: None,
        }
    }

    /// Report readings from `source` every environment interval.
    pub fn with_environment(mut self, source: Arc<dyn EnvironmentSource>) -> Self {
        self.environment = Some(source);
        self
    }

    pub fn alert(&self) -> &AlertController<R> {
        &self.alert
    }

    /// Alarm cycles counted since the last summary.
    pub fn motion_count(&self) -> u64 {
        self.motion_count
    }

    /// Account for one cycle outcome observed at `now`.
    pub fn record(&mut self, outcome: &CycleOutcome, now: Instant) {
        if outcome.alarm_active {
            self.motion_count += 1;
            info!("Motion detected! Total: {}", self.motion_count);
            self.publish(FEED_MOTION, self.motion_count as f64);
        }

        if now.saturating_duration_since(self.last_summary) >= self.reporting.summary_interval() {
            if self.publish(FEED_MOTION, self.motion_count as f64) {
                info!("Security summary sent: {} motion", self.motion_count);
            }
            self.motion_count = 0;
            self.last_summary = now;
        }

        let heartbeat_due = self.last_heartbeat.map_or(true, |last| {
            now.saturating_duration_since(last) >= self.reporting.heartbeat_interval()
        });
        if heartbeat_due {
            self.publish(FEED_HEARTBEAT, Utc::now().timestamp() as f64);
            self.publish(FEED_ONLINE, 1.0);
            self.last_heartbeat = Some(now);
        }
    }

    /// Whether an environment report is due at `now`.
    pub fn environment_due(&self, now: Instant) -> bool {
        self.environment.is_some()
            && self.last_environment.map_or(true, |last| {
                now.saturating_duration_since(last) >= self.reporting.environment_interval()
            })
    }

    /// Publish one environment reading taken at `now`, skipping absent values.
    pub fn record_environment(&mut self, reading: Result<EnvironmentReading>, now: Instant) {
        self.last_environment = Some(now);
        match reading {
            Ok(reading) => {
                if let Some(temperature) = reading.temperature_c {
                    self.publish(FEED_TEMPERATURE, f64::from(temperature));
                }
                if let Some(humidity) = reading.humidity_pct {
                    self.publish(FEED_HUMIDITY, f64::from(humidity));
                }
                info!("Environmental data: {:?}", reading);
            }
            Err(e) => warn!("Environment read failed: {}", e),
        }
    }

    async fn sample_environment(&mut self, now: Instant) {
        let Some(source) = self.environment.clone() else {
            return;
        };
        let reading = tokio::task::spawn_blocking(move || source.read())
            .await
            .unwrap_or_else(|e| {
                Err(SystemError::system_error(format!(
                    "environment task failed: {}",
                    e
                )))
            });
        self.record_environment(reading, now);
    }

    fn publish(&self, name: &str, value: f64) -> bool {
        let sent = self.telemetry.publish(name, value);
        if !sent {
            warn!("Failed to publish {} = {}", name, value);
        }
        sent
    }

    /// Poll until `shutdown` flips to `true` (or its sender goes away), then
    /// report offline and stop the actuators.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Security monitor started ({:?} cadence)", self.poll_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = self.alert.poll_cycle().await;
                    debug!(
                        alarm = outcome.alarm_active,
                        distance_cm = ?outcome.distance_cm,
                        "cycle complete"
                    );
                    let now = Instant::now();
                    self.record(&outcome, now);
                    if self.environment_due(now) {
                        self.sample_environment(now).await;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.publish(FEED_ONLINE, 0.0);
        if !self.alert.shutdown().await {
            warn!("Actuator loops abandoned during shutdown");
        }
        info!("Security monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecurityConfig;
    use crate::hardware::camera::{DirectorySink, StillCamera};
    use crate::hardware::gpio::{PinLevel, SimulatedGpio};
    use crate::lock_unpoisoned;
    use crate::security::capture::CaptureThrottle;
    use crate::security::data::RangeSample;
    use chrono::Local;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTelemetry {
        sent: Mutex<Vec<(String, f64)>>,
    }

    impl RecordingTelemetry {
        fn values(&self, name: &str) -> Vec<f64> {
            lock_unpoisoned(&self.sent)
                .iter()
                .filter(|(n, _)| n == name)
                .map(|(_, v)| *v)
                .collect()
        }
    }

    impl Telemetry for RecordingTelemetry {
        fn publish(&self, name: &str, value: f64) -> bool {
            lock_unpoisoned(&self.sent).push((name.to_string(), value));
            true
        }
    }

    struct FixedEnvironment(Option<EnvironmentReading>);

    impl EnvironmentSource for FixedEnvironment {
        fn read(&self) -> Result<EnvironmentReading> {
            self.0
                .ok_or_else(|| SystemError::system_error("sensor unplugged"))
        }
    }

    fn room(temperature_c: Option<f32>, humidity_pct: Option<f32>) -> Arc<FixedEnvironment> {
        Arc::new(FixedEnvironment(Some(EnvironmentReading {
            temperature_c,
            humidity_pct,
        })))
    }

    struct FixedSensor(RangeSample);

    impl RangeFinder for FixedSensor {
        fn measure(&mut self) -> Result<RangeSample> {
            Ok(self.0)
        }
    }

    fn monitor(
        distance: RangeSample,
        gpio: Arc<SimulatedGpio>,
        telemetry: Arc<RecordingTelemetry>,
    ) -> SecurityMonitor<FixedSensor> {
        let dir = std::env::temp_dir();
        let capture = CaptureThrottle::new(
            Arc::new(StillCamera::default()),
            Arc::new(DirectorySink::new(dir).unwrap()),
        )
        .with_enabled(false);
        let alert = AlertController::new(
            FixedSensor(distance),
            gpio,
            capture,
            SecurityConfig::default(),
        );
        SecurityMonitor::new(
            alert,
            telemetry,
            Duration::from_millis(20),
            ReportingConfig::default(),
        )
    }

    fn outcome(alarm_active: bool) -> CycleOutcome {
        CycleOutcome {
            timestamp: Local::now(),
            alarm_active,
            distance_cm: None,
            capture: None,
        }
    }

    #[tokio::test]
    async fn test_motion_count_and_summary() {
        let telemetry = Arc::new(RecordingTelemetry::default());
        let mut monitor = monitor(None, Arc::new(SimulatedGpio::new()), telemetry.clone());
        let start = Instant::now();

        monitor.record(&outcome(true), start);
        monitor.record(&outcome(false), start + Duration::from_secs(1));
        monitor.record(&outcome(true), start + Duration::from_secs(2));
        assert_eq!(monitor.motion_count(), 2);
        assert_eq!(telemetry.values(FEED_MOTION), vec![1.0, 2.0]);

        // The summary lands on the same feed as the running count.
        monitor.record(&outcome(false), start + Duration::from_secs(31));
        assert_eq!(telemetry.values(FEED_MOTION), vec![1.0, 2.0, 2.0]);
        assert_eq!(monitor.motion_count(), 0);
    }

    #[tokio::test]
    async fn test_heartbeat_cadence() {
        let telemetry = Arc::new(RecordingTelemetry::default());
        let mut monitor = monitor(None, Arc::new(SimulatedGpio::new()), telemetry.clone());
        let start = Instant::now();

        monitor.record(&outcome(false), start);
        monitor.record(&outcome(false), start + Duration::from_secs(10));
        assert_eq!(telemetry.values(FEED_HEARTBEAT).len(), 1);
        assert_eq!(telemetry.values(FEED_ONLINE), vec![1.0]);

        monitor.record(&outcome(false), start + Duration::from_secs(30));
        assert_eq!(telemetry.values(FEED_HEARTBEAT).len(), 2);
    }

    #[tokio::test]
    async fn test_environment_reports_present_values() {
        let telemetry = Arc::new(RecordingTelemetry::default());
        let mut monitor = monitor(None, Arc::new(SimulatedGpio::new()), telemetry.clone())
            .with_environment(room(Some(23.5), None));
        let start = Instant::now();

        assert!(monitor.environment_due(start));
        monitor.sample_environment(start).await;
        assert_eq!(telemetry.values(FEED_TEMPERATURE), vec![23.5]);
        assert!(telemetry.values(FEED_HUMIDITY).is_empty());

        assert!(!monitor.environment_due(start + Duration::from_secs(29)));
        assert!(monitor.environment_due(start + Duration::from_secs(30)));

        let later = start + Duration::from_secs(30);
        monitor.record_environment(Err(SystemError::system_error("checksum")), later);
        assert_eq!(telemetry.values(FEED_TEMPERATURE).len(), 1);
        assert!(!monitor.environment_due(later + Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_environment_needs_a_source() {
        let telemetry = Arc::new(RecordingTelemetry::default());
        let mut monitor = monitor(None, Arc::new(SimulatedGpio::new()), telemetry.clone());

        assert!(!monitor.environment_due(Instant::now()));
        monitor.sample_environment(Instant::now()).await;
        assert!(telemetry.values(FEED_TEMPERATURE).is_empty());
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let telemetry = Arc::new(RecordingTelemetry::default());
        let gpio = Arc::new(SimulatedGpio::new());
        let monitor = monitor(Some(4.0), gpio.clone(), telemetry.clone())
            .with_environment(room(Some(21.0), Some(45.0)));
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(monitor.run(rx));
        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send(true).unwrap();
        task.await.unwrap();

        assert!(!telemetry.values(FEED_MOTION).is_empty());
        assert_eq!(telemetry.values(FEED_TEMPERATURE), vec![21.0]);
        assert_eq!(telemetry.values(FEED_HUMIDITY), vec![45.0]);
        assert_eq!(telemetry.values(FEED_ONLINE).last(), Some(&0.0));
        assert_eq!(gpio.level(21), Some(PinLevel::Low));
        assert_eq!(gpio.level(18), Some(PinLevel::Low));
    }
}
