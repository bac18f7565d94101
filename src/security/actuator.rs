//! Alarm actuator loops (alert LED blink, buzzer beep).
//!
//! Each loop runs as its own tokio task while the shared [`AlarmFlag`] is
//! active and checks the flag at every phase boundary, so shutoff latency is
//! bounded by the longer of its two phases. A loop always drives its pin low
//! on the way out.

use crate::hardware::gpio::{GpioProvider, PinLevel};
use crate::lock_unpoisoned;
use crate::security::data::AlarmFlag;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// On/off timing of an actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlinkPattern {
    pub on: Duration,
    pub off: Duration,
}

impl BlinkPattern {
    /// Fast symmetric blink for the alert LED.
    pub const LED: Self = Self {
        on: Duration::from_millis(150),
        off: Duration::from_millis(150),
    };

    /// Short beep, long pause, so the buzzer is distinguishable from the LED.
    pub const BUZZER: Self = Self {
        on: Duration::from_millis(150),
        off: Duration::from_millis(500),
    };

    /// Worst-case time between the alarm clearing and the loop noticing.
    pub fn shutoff_latency(&self) -> Duration {
        self.on.max(self.off)
    }
}

/// Handle to one spawned loop instance.
struct LoopHandle {
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl LoopHandle {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire) && !self.task.is_finished()
    }
}

/// A restartable actuator loop bound to one output pin.
pub struct ActuatorLoop {
    name: &'static str,
    pin: u8,
    pattern: BlinkPattern,
    gpio: Arc<dyn GpioProvider>,
    alarm: Arc<AlarmFlag>,
    handle: Mutex<Option<LoopHandle>>,
}

impl ActuatorLoop {
    pub fn new(
        name: &'static str,
        pin: u8,
        pattern: BlinkPattern,
        gpio: Arc<dyn GpioProvider>,
        alarm: Arc<AlarmFlag>,
    ) -> Self {
        Self {
            name,
            pin,
            pattern,
            gpio,
            alarm,
            handle: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn pattern(&self) -> BlinkPattern {
        self.pattern
    }

    /// Start the loop unless an instance is already running.
    ///
    /// Returns `true` when a fresh instance was spawned.
    pub fn ensure_running(&self) -> bool {
        let mut slot = lock_unpoisoned(&self.handle);
        if slot.as_ref().is_some_and(LoopHandle::is_running) {
            return false;
        }

        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(run_pattern(
            self.name,
            self.pin,
            self.pattern,
            Arc::clone(&self.gpio),
            Arc::clone(&self.alarm),
            Arc::clone(&running),
        ));
        *slot = Some(LoopHandle { running, task });
        debug!("{} loop started on pin {}", self.name, self.pin);
        true
    }

    pub fn is_running(&self) -> bool {
        lock_unpoisoned(&self.handle)
            .as_ref()
            .is_some_and(LoopHandle::is_running)
    }

    /// Wait for the current instance to exit after the alarm flag cleared.
    ///
    /// Returns `false` if it did not finish within `timeout`; the task is then
    /// abandoned rather than aborted.
    pub async fn join(&self, timeout: Duration) -> bool {
        let handle = lock_unpoisoned(&self.handle).take();
        let Some(handle) = handle else {
            return true;
        };

        match tokio::time::timeout(timeout, handle.task).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("{} loop ended abnormally: {}", self.name, e);
                true
            }
            Err(_) => {
                warn!(
                    "{} loop did not stop within {:?}, abandoning it",
                    self.name, timeout
                );
                false
            }
        }
    }
}

async fn run_pattern(
    name: &'static str,
    pin: u8,
    pattern: BlinkPattern,
    gpio: Arc<dyn GpioProvider>,
    alarm: Arc<AlarmFlag>,
    running: Arc<AtomicBool>,
) {
    while alarm.is_active() {
        match gpio.set_output(pin, PinLevel::High) {
            Ok(()) => {
                tokio::time::sleep(pattern.on).await;
                if let Err(e) = gpio.set_output(pin, PinLevel::Low) {
                    warn!("{} failed to drive pin {} low: {}", name, pin, e);
                }
                if !alarm.is_active() {
                    break;
                }
            }
            Err(e) => warn!("{} failed to drive pin {} high: {}", name, pin, e),
        }
        tokio::time::sleep(pattern.off).await;
    }

    if let Err(e) = gpio.set_output(pin, PinLevel::Low) {
        warn!("{} could not force pin {} low on exit: {}", name, pin, e);
    }
    running.store(false, Ordering::Release);
    debug!("{} loop stopped", name);
}
