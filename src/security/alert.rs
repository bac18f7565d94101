//! Alarm state machine.
//!
//! Each cycle takes a short burst of range samples and debounces it:
//! any close sample raises the alarm, a burst with readings but none close
//! clears it, and a burst with no readings at all keeps the previous state.

use crate::config::SecurityConfig;
use crate::display::StatusDisplay;
use crate::hardware::gpio::GpioProvider;
use crate::lock_unpoisoned;
use crate::security::actuator::{ActuatorLoop, BlinkPattern};
use crate::security::capture::CaptureThrottle;
use crate::security::data::{AlarmFlag, AlarmState, CycleOutcome, RangeSample};
use crate::security::ranging::RangeFinder;
use chrono::Local;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use tracing::{info, warn};

/// Debounce one burst of samples against `threshold_cm`.
pub fn evaluate_burst(
    previous: AlarmState,
    burst: &[RangeSample],
    threshold_cm: f64,
) -> AlarmState {
    let mut present = burst.iter().flatten().peekable();
    if present.peek().is_none() {
        return previous;
    }

    if present.any(|&distance| distance <= threshold_cm) {
        AlarmState::Alarm
    } else {
        AlarmState::Idle
    }
}

/// Owns the alarm state and everything it switches on.
pub struct AlertController<R: RangeFinder> {
    sensor: Arc<Mutex<R>>,
    config: SecurityConfig,
    state: AlarmState,
    alarm: Arc<AlarmFlag>,
    led: ActuatorLoop,
    buzzer: ActuatorLoop,
    capture: CaptureThrottle,
    display: Option<StatusDisplay>,
}

impl<R: RangeFinder> AlertController<R> {
    pub fn new(
        sensor: R,
        gpio: Arc<dyn GpioProvider>,
        capture: CaptureThrottle,
        config: SecurityConfig,
    ) -> Self {
        let alarm = Arc::new(AlarmFlag::new());
        let led = ActuatorLoop::new(
            "led",
            config.led_pin,
            BlinkPattern::LED,
            Arc::clone(&gpio),
            Arc::clone(&alarm),
        );
        let buzzer = ActuatorLoop::new(
            "buzzer",
            config.buzzer_pin,
            BlinkPattern::BUZZER,
            gpio,
            Arc::clone(&alarm),
        );

        Self {
            sensor: Arc::new(Mutex::new(sensor)),
            config,
            state: AlarmState::Idle,
            alarm,
            led,
            buzzer,
            capture,
            display: None,
        }
    }

    /// Flash capture notices on this display.
    pub fn with_display(mut self, display: StatusDisplay) -> Self {
        self.display = Some(display);
        self
    }

    pub fn state(&self) -> AlarmState {
        self.state
    }

    pub fn alarm_flag(&self) -> Arc<AlarmFlag> {
        Arc::clone(&self.alarm)
    }

    pub fn actuators_running(&self) -> (bool, bool) {
        (self.led.is_running(), self.buzzer.is_running())
    }

    /// Take one burst of samples and apply it.
    pub async fn poll_cycle(&mut self) -> CycleOutcome {
        let burst = self.sample_burst().await;
        self.apply_burst(&burst).await
    }

    async fn sample_burst(&self) -> Vec<RangeSample> {
        let count = self.config.samples_per_cycle;
        let mut burst = Vec::with_capacity(count);

        for i in 0..count {
            if i > 0 {
                tokio::time::sleep(self.config.sample_spacing()).await;
            }

            let sensor = Arc::clone(&self.sensor);
            let sample = tokio::task::spawn_blocking(move || {
                let mut sensor = lock_unpoisoned(&sensor);
                sensor.measure()
            })
            .await;
            burst.push(match sample {
                Ok(Ok(sample)) => sample,
                Ok(Err(e)) => {
                    warn!("Range measurement failed: {}", e);
                    None
                }
                Err(e) => {
                    warn!("Range measurement task failed: {}", e);
                    None
                }
            });
        }

        burst
    }

    /// Debounce `burst` and drive the actuators and camera accordingly.
    pub async fn apply_burst(&mut self, burst: &[RangeSample]) -> CycleOutcome {
        let next = evaluate_burst(self.state, burst, self.config.threshold_cm);
        if next != self.state {
            match next {
                AlarmState::Alarm => info!("Intrusion detected, alarm raised"),
                AlarmState::Idle => info!("Area clear, alarm cleared"),
            }
        }
        self.state = next;

        let mut capture = None;
        match next {
            AlarmState::Alarm => {
                self.alarm.set(true);
                self.led.ensure_running();
                self.buzzer.ensure_running();

                capture = self.capture.maybe_capture(Instant::now()).await;
                if let Some(record) = &capture {
                    info!("Intruder photo recorded: {:?}", record.handle);
                    if let Some(display) = &self.display {
                        display.flash("Security issue", "Photo taken");
                    }
                }
            }
            AlarmState::Idle => self.alarm.set(false),
        }

        CycleOutcome {
            timestamp: Local::now(),
            alarm_active: next.is_active(),
            distance_cm: burst.iter().rev().flatten().next().copied(),
            capture,
        }
    }

    /// Clear the alarm and wait (bounded) for both actuator loops to exit.
    ///
    /// Returns `false` if a loop had to be abandoned.
    pub async fn shutdown(&mut self) -> bool {
        self.state = AlarmState::Idle;
        self.alarm.set(false);

        let timeout = self.config.shutdown_timeout();
        let led = self.led.join(timeout).await;
        let buzzer = self.buzzer.join(timeout).await;
        led && buzzer
    }
}
