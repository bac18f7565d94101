//! Fault-tolerant status renderer for the character LCD.
//!
//! Every device operation goes through a health wrapper: transient bus
//! failures are counted, and after [`MAX_CONSECUTIVE_ERRORS`] in a row the
//! display is marked dead and left alone until the refresh loop manages to
//! re-initialize it. A failing LCD therefore only ever degrades its own output.

use crate::config::DisplayConfig;
use crate::display::{DisplayConnector, DisplayDevice, DisplayError, DisplayFrame};
use crate::hardware::environment::{EnvironmentReading, EnvironmentSource};
use crate::lock_unpoisoned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Consecutive communication failures that mark the display dead.
pub const MAX_CONSECUTIVE_ERRORS: u32 = 3;

const STATUS_TITLE: &str = "DomiSafe Ready";

/// Error bookkeeping for the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayHealth {
    pub consecutive_errors: u32,
    pub alive: bool,
}

impl Default for DisplayHealth {
    fn default() -> Self {
        Self {
            consecutive_errors: 0,
            alive: true,
        }
    }
}

impl DisplayHealth {
    fn record_ok(&mut self) {
        self.consecutive_errors = 0;
        self.alive = true;
    }

    fn record_error(&mut self) {
        self.consecutive_errors += 1;
        if self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
            self.alive = false;
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.alive
    }
}

/// A message pinned on screen until `expires_at`.
#[derive(Debug, Clone)]
pub struct DisplayOverride {
    pub frame: DisplayFrame,
    pub expires_at: Instant,
}

impl DisplayOverride {
    pub fn is_active(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

struct DisplayCore {
    device: Box<dyn DisplayDevice>,
    address: u8,
    health: DisplayHealth,
    pinned: Option<DisplayOverride>,
}

impl DisplayCore {
    fn guarded<F>(&mut self, op: F) -> Result<(), DisplayError>
    where
        F: FnOnce(&mut Box<dyn DisplayDevice>) -> Result<(), DisplayError>,
    {
        if !self.health.alive {
            return Ok(());
        }

        match op(&mut self.device) {
            Ok(()) => {
                self.health.record_ok();
                Ok(())
            }
            Err(DisplayError::Comm(reason)) => {
                self.health.record_error();
                debug!(
                    "Display error {}/{}: {}",
                    self.health.consecutive_errors, MAX_CONSECUTIVE_ERRORS, reason
                );
                if !self.health.alive {
                    warn!(
                        "Display at {:#04x} marked dead, will retry initialization",
                        self.address
                    );
                }
                Ok(())
            }
            Err(other) => Err(other),
        }
    }

    fn draw(&mut self, frame: &DisplayFrame) -> Result<(), DisplayError> {
        self.guarded(|d| d.clear())?;
        self.guarded(|d| d.write(&frame.line1))?;
        if !frame.line2.is_empty() {
            self.guarded(|d| d.set_cursor(1, 0))?;
            self.guarded(|d| d.write(&frame.line2))?;
        }
        Ok(())
    }
}

struct Shared {
    core: Mutex<DisplayCore>,
    connector: Arc<dyn DisplayConnector>,
    environment: Option<Arc<dyn EnvironmentSource>>,
    config: DisplayConfig,
    running: AtomicBool,
    wake: Notify,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Cloneable handle to the status display.
///
/// All clones share one device, one override slot and one health record.
#[derive(Clone)]
pub struct StatusDisplay {
    shared: Arc<Shared>,
}

impl StatusDisplay {
    /// Probe the candidate addresses and show the welcome message.
    ///
    /// Fails with [`DisplayError::NotFound`] if no address answers.
    pub fn open(
        connector: Arc<dyn DisplayConnector>,
        environment: Option<Arc<dyn EnvironmentSource>>,
        config: DisplayConfig,
    ) -> Result<Self, DisplayError> {
        let (device, address) = probe(connector.as_ref(), &config.candidate_addresses)?;
        info!("Display found at {:#04x}", address);

        let ttl = config.override_ttl();
        let display = Self {
            shared: Arc::new(Shared {
                core: Mutex::new(DisplayCore {
                    device,
                    address,
                    health: DisplayHealth::default(),
                    pinned: None,
                }),
                connector,
                environment,
                config,
                running: AtomicBool::new(false),
                wake: Notify::new(),
                worker: Mutex::new(None),
            }),
        };

        display.show_override("Welcome to", "DomiSafe", ttl)?;
        Ok(display)
    }

    fn core(&self) -> MutexGuard<'_, DisplayCore> {
        lock_unpoisoned(&self.shared.core)
    }

    fn width(&self) -> usize {
        self.shared.config.width
    }

    pub fn health(&self) -> DisplayHealth {
        self.core().health
    }

    pub fn address(&self) -> u8 {
        self.core().address
    }

    /// The pinned override, if it hasn't expired yet.
    pub fn active_override(&self) -> Option<DisplayFrame> {
        let now = Instant::now();
        self.core()
            .pinned
            .as_ref()
            .filter(|pinned| pinned.is_active(now))
            .map(|pinned| pinned.frame.clone())
    }

    /// Status frame built from the environment source.
    pub fn status_frame(&self) -> DisplayFrame {
        let line2 = match &self.shared.environment {
            None => "T: --.-C".to_string(),
            Some(source) => match source.read() {
                Ok(reading) => format_reading(&reading),
                Err(e) => {
                    debug!("Environment read failed: {}", e);
                    "T: N/A".to_string()
                }
            },
        };
        DisplayFrame::new(STATUS_TITLE, line2, self.width())
    }

    /// Render the status frame unless an override is still pinned.
    pub fn render_periodic(&self) -> Result<(), DisplayError> {
        self.render_status(self.status_frame())
    }

    fn render_status(&self, frame: DisplayFrame) -> Result<(), DisplayError> {
        let mut core = self.core();
        if !core.health.alive {
            return Ok(());
        }
        let now = Instant::now();
        if core.pinned.as_ref().is_some_and(|p| p.is_active(now)) {
            return Ok(());
        }
        core.pinned = None;
        core.draw(&frame)
    }

    /// Show two lines right away and keep them up for `ttl`.
    ///
    /// A newer override replaces an older one. Does nothing while degraded.
    pub fn show_override(
        &self,
        line1: &str,
        line2: &str,
        ttl: Duration,
    ) -> Result<(), DisplayError> {
        let frame = DisplayFrame::new(line1, line2, self.width());

        let mut core = self.core();
        if !core.health.alive {
            return Ok(());
        }
        core.draw(&frame)?;
        core.pinned = Some(DisplayOverride {
            frame,
            expires_at: Instant::now() + ttl,
        });
        Ok(())
    }

    /// Best-effort override with the configured TTL; errors are only logged.
    pub fn flash(&self, line1: &str, line2: &str) {
        if let Err(e) = self.show_override(line1, line2, self.shared.config.override_ttl()) {
            error!("Unexpected display failure showing {:?}: {}", line1, e);
        }
    }

    /// Re-probe the display if it is dead. Returns whether it is alive afterwards.
    ///
    /// Bus initialization sleeps, so probing runs on the blocking pool and
    /// without the device lock; overrides keep flowing meanwhile.
    pub async fn try_recover(&self) -> bool {
        if !self.health().is_degraded() {
            return true;
        }

        let connector = Arc::clone(&self.shared.connector);
        let candidates = self.shared.config.candidate_addresses.clone();
        let probed =
            tokio::task::spawn_blocking(move || probe(connector.as_ref(), &candidates)).await;

        match probed {
            Ok(Ok((device, address))) => self.install(device, address),
            Ok(Err(e)) => {
                debug!("Display recovery failed: {}", e);
                false
            }
            Err(e) => {
                warn!("Display recovery task failed: {}", e);
                false
            }
        }
    }

    fn install(&self, device: Box<dyn DisplayDevice>, address: u8) -> bool {
        let frame = DisplayFrame::new("LCD recovered", "DomiSafe", self.width());

        let mut core = self.core();
        core.device = device;
        core.address = address;
        core.health = DisplayHealth::default();
        core.pinned = None;
        info!("Display recovered at {:#04x}", address);

        if let Err(e) = core.draw(&frame) {
            debug!("Recovery message failed: {}", e);
        }
        core.health.alive
    }

    /// Mark the display dead so the next cycle re-initializes it.
    pub fn force_degraded(&self) {
        let mut core = self.core();
        core.health.alive = false;
        core.health.consecutive_errors = MAX_CONSECUTIVE_ERRORS;
        debug!("Display forced into recovery");
    }

    /// One refresh-loop step: recover if dead, otherwise render status.
    ///
    /// The environment is read on the blocking pool; sensors may take a
    /// while to answer.
    pub async fn refresh(&self) -> Result<(), DisplayError> {
        if self.health().is_degraded() {
            self.try_recover().await;
            return Ok(());
        }

        let display = self.clone();
        let frame = match tokio::task::spawn_blocking(move || display.status_frame()).await {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Status frame task failed: {}", e);
                return Ok(());
            }
        };
        self.render_status(frame)
    }

    /// Spawn the background refresh loop. No-op if it is already running.
    pub fn start(&self) {
        let mut worker = lock_unpoisoned(&self.shared.worker);
        if worker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        self.shared.running.store(true, Ordering::Release);
        let display = self.clone();
        *worker = Some(tokio::spawn(async move { display.run_loop().await }));
    }

    async fn run_loop(self) {
        let interval = self.shared.config.refresh_interval();
        while self.shared.running.load(Ordering::Acquire) {
            if let Err(e) = self.refresh().await {
                error!("Unexpected display failure: {}", e);
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = self.shared.wake.notified() => {}
            }
        }
        debug!("Display loop stopped");
    }

    /// Stop the refresh loop and blank the screen.
    ///
    /// The loop is joined for at most the configured timeout; a loop that
    /// doesn't finish is abandoned.
    pub async fn shutdown(&self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.wake.notify_one();

        let handle = lock_unpoisoned(&self.shared.worker).take();
        if let Some(handle) = handle {
            if tokio::time::timeout(self.shared.config.shutdown_timeout(), handle)
                .await
                .is_err()
            {
                warn!("Display loop did not stop in time, abandoning it");
            }
        }

        let mut core = self.core();
        if core.health.alive {
            if let Err(e) = core.device.clear() {
                debug!("Final display clear failed: {}", e);
            }
        }
    }
}

fn probe(
    connector: &dyn DisplayConnector,
    candidates: &[u8],
) -> Result<(Box<dyn DisplayDevice>, u8), DisplayError> {
    for &address in candidates {
        match connector.connect(address) {
            Ok(device) => return Ok((device, address)),
            Err(e) => debug!("No display at {:#04x}: {}", address, e),
        }
    }
    Err(DisplayError::NotFound {
        tried: candidates.to_vec(),
    })
}

fn format_reading(reading: &EnvironmentReading) -> String {
    fn value(v: Option<f32>) -> String {
        v.map(|v| format!("{:.1}", v))
            .unwrap_or_else(|| "N/A".to_string())
    }
    format!(
        "T:{}C H:{}%",
        value(reading.temperature_c),
        value(reading.humidity_pct)
    )
}
