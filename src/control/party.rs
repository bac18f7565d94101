//! Party mode: a random chase across the LED devices.

use crate::control::devices::DeviceController;
use crate::lock_unpoisoned;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// How long each LED stays lit during the chase.
pub const CHASE_STEP: Duration = Duration::from_millis(120);

/// How long a random pair flashes together.
pub const PAIR_FLASH: Duration = Duration::from_millis(100);

/// Chance of a pair flash after each chase round.
pub const PAIR_FLASH_PROBABILITY: f64 = 0.35;

/// Toggleable LED animation running on its own task.
pub struct PartyMode {
    controller: DeviceController,
    running: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
    stop_timeout: Duration,
}

impl PartyMode {
    pub fn new(controller: DeviceController) -> Self {
        Self {
            controller,
            running: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
            stop_timeout: Duration::from_secs(1),
        }
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn is_active(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Start or stop the animation. Returns whether it is now active.
    pub async fn toggle(&self) -> bool {
        if self.is_active() {
            self.stop().await;
            false
        } else {
            self.start()
        }
    }

    /// Start the chase. Returns `false` if it was already running or there
    /// are no LEDs to animate.
    pub fn start(&self) -> bool {
        let leds = self.controller.led_keys();
        if leds.is_empty() {
            warn!("Party mode needs at least one LED device");
            return false;
        }

        let mut task = lock_unpoisoned(&self.task);
        if self.running.swap(true, Ordering::AcqRel) {
            return false;
        }
        *task = Some(tokio::spawn(run_chase(
            self.controller.clone(),
            leds,
            Arc::clone(&self.running),
        )));
        drop(task);

        info!("Party mode ON");
        self.flash("Party ON");
        true
    }

    /// Stop the chase and wait (bounded) for the LEDs to go dark.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::Release);
        let handle = lock_unpoisoned(&self.task).take();
        if let Some(handle) = handle {
            if tokio::time::timeout(self.stop_timeout, handle).await.is_err() {
                warn!("Party loop did not stop in time, abandoning it");
            }
        }

        info!("Party mode OFF");
        self.flash("Party OFF");
    }

    fn flash(&self, message: &str) {
        if let Some(display) = self.controller.display() {
            display.flash(message, "");
        }
    }
}

async fn run_chase(controller: DeviceController, mut leds: Vec<String>, running: Arc<AtomicBool>) {
    let mut rng = StdRng::from_entropy();
    let set = |key: &str, on: bool| {
        if let Err(e) = controller.set(key, on) {
            warn!("Party mode could not switch {}: {}", key, e);
        }
    };

    while running.load(Ordering::Acquire) {
        leds.shuffle(&mut rng);

        for key in &leds {
            if !running.load(Ordering::Acquire) {
                break;
            }
            set(key, true);
            tokio::time::sleep(CHASE_STEP).await;
            set(key, false);
        }

        if running.load(Ordering::Acquire)
            && leds.len() >= 2
            && rng.gen_bool(PAIR_FLASH_PROBABILITY)
        {
            let pair: Vec<String> = leds.choose_multiple(&mut rng, 2).cloned().collect();
            for key in &pair {
                set(key, true);
            }
            tokio::time::sleep(PAIR_FLASH).await;
            for key in &pair {
                set(key, false);
            }
        }
    }

    for key in &leds {
        set(key, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DisplayConfig;
    use crate::control::devices::DeviceSpec;
    use crate::display::{SimulatedBus, StatusDisplay};
    use crate::hardware::gpio::{PinLevel, SimulatedGpio};

    const LED_PINS: [u8; 3] = [16, 23, 24];

    fn party() -> (Arc<SimulatedGpio>, PartyMode) {
        let gpio = Arc::new(SimulatedGpio::new());
        let controller = DeviceController::new(gpio.clone(), DeviceSpec::defaults()).unwrap();
        (gpio, PartyMode::new(controller))
    }

    #[tokio::test(start_paused = true)]
    async fn test_chase_lights_every_led_then_goes_dark() {
        let (gpio, party) = party();

        assert!(party.toggle().await);
        assert!(party.is_active());
        tokio::time::sleep(Duration::from_secs(2)).await;

        for pin in LED_PINS {
            assert!(
                gpio.history(pin).contains(&PinLevel::High),
                "pin {} never lit",
                pin
            );
        }

        assert!(!party.toggle().await);
        assert!(!party.is_active());
        for pin in LED_PINS {
            assert_eq!(gpio.level(pin), Some(PinLevel::Low));
        }
        // The fan and relay are left alone.
        assert_eq!(gpio.history(22), vec![PinLevel::Low]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_is_rejected() {
        let (_, party) = party();
        assert!(party.start());
        assert!(!party.start());
        party.stop().await;
        assert!(party.start());
        party.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_leds_means_no_party() {
        let gpio = Arc::new(SimulatedGpio::new());
        let controller =
            DeviceController::new(gpio, vec![DeviceSpec::new("fan", "Fan", 22)]).unwrap();
        let party = PartyMode::new(controller);
        assert!(!party.start());
        assert!(!party.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_party_messages_on_display() {
        let gpio = Arc::new(SimulatedGpio::new());
        let bus = SimulatedBus::default();
        let display =
            StatusDisplay::open(Arc::new(bus.clone()), None, DisplayConfig::default()).unwrap();
        let controller = DeviceController::new(gpio, DeviceSpec::defaults())
            .unwrap()
            .with_display(display);
        let party = PartyMode::new(controller);

        party.start();
        assert_eq!(bus.rows(), vec!["Party ON", ""]);
        party.stop().await;
        assert_eq!(bus.rows(), vec!["Party OFF", ""]);
    }
}
