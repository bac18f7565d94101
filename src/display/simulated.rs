//! In-memory character display for hosts without an I2C LCD.
//!
//! [`SimulatedBus`] hands out [`SimulatedDisplay`] devices that share one
//! panel model, so callers can inspect what is on screen, make the bus
//! unresponsive, or inject a number of transient failures.

use crate::display::{DisplayConnector, DisplayDevice, DisplayError};
use crate::lock_unpoisoned;
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Debug)]
struct Panel {
    cols: usize,
    cells: Vec<Vec<char>>,
    cursor: (usize, usize),
    responsive: Vec<u8>,
    fail_next: usize,
    ops: usize,
    connects: Vec<u8>,
}

impl Panel {
    fn blank(&mut self) {
        for row in &mut self.cells {
            row.iter_mut().for_each(|c| *c = ' ');
        }
        self.cursor = (0, 0);
    }
}

/// Shared simulated I2C bus with one character panel behind it.
#[derive(Debug, Clone)]
pub struct SimulatedBus {
    panel: Arc<Mutex<Panel>>,
}

impl Default for SimulatedBus {
    fn default() -> Self {
        Self::new(&[0x27], 16, 2)
    }
}

impl SimulatedBus {
    /// A bus where `responsive` addresses answer, with a `cols` x `rows` panel.
    pub fn new(responsive: &[u8], cols: usize, rows: usize) -> Self {
        Self {
            panel: Arc::new(Mutex::new(Panel {
                cols,
                cells: vec![vec![' '; cols]; rows],
                cursor: (0, 0),
                responsive: responsive.to_vec(),
                fail_next: 0,
                ops: 0,
                connects: Vec::new(),
            })),
        }
    }

    /// Change which addresses answer. Devices at other addresses start failing.
    pub fn set_responsive(&self, addresses: &[u8]) {
        lock_unpoisoned(&self.panel).responsive = addresses.to_vec();
    }

    /// Fail the next `count` device operations with a communication error.
    pub fn fail_next(&self, count: usize) {
        lock_unpoisoned(&self.panel).fail_next = count;
    }

    /// Current screen contents, one string per row, trailing blanks trimmed.
    pub fn rows(&self) -> Vec<String> {
        lock_unpoisoned(&self.panel)
            .cells
            .iter()
            .map(|row| row.iter().collect::<String>().trim_end().to_string())
            .collect()
    }

    /// Number of device operations attempted, failed ones included.
    pub fn op_count(&self) -> usize {
        lock_unpoisoned(&self.panel).ops
    }

    /// Addresses probed through [`DisplayConnector::connect`], in order.
    pub fn connect_attempts(&self) -> Vec<u8> {
        lock_unpoisoned(&self.panel).connects.clone()
    }
}

impl DisplayConnector for SimulatedBus {
    fn connect(&self, address: u8) -> Result<Box<dyn DisplayDevice>, DisplayError> {
        let mut panel = lock_unpoisoned(&self.panel);
        panel.connects.push(address);
        if !panel.responsive.contains(&address) {
            return Err(DisplayError::Comm(format!("no ack at {:#04x}", address)));
        }
        Ok(Box::new(SimulatedDisplay {
            panel: Arc::clone(&self.panel),
            address,
        }))
    }
}

/// One simulated LCD at a bus address.
#[derive(Debug)]
pub struct SimulatedDisplay {
    panel: Arc<Mutex<Panel>>,
    address: u8,
}

impl SimulatedDisplay {
    fn with_panel<T>(
        &mut self,
        op: impl FnOnce(&mut Panel) -> Result<T, DisplayError>,
    ) -> Result<T, DisplayError> {
        let mut panel = lock_unpoisoned(&self.panel);
        panel.ops += 1;
        if panel.fail_next > 0 {
            panel.fail_next -= 1;
            return Err(DisplayError::Comm("simulated I/O error".to_string()));
        }
        if !panel.responsive.contains(&self.address) {
            return Err(DisplayError::Comm(format!(
                "device at {:#04x} stopped responding",
                self.address
            )));
        }
        op(&mut panel)
    }
}

impl DisplayDevice for SimulatedDisplay {
    fn clear(&mut self) -> Result<(), DisplayError> {
        self.with_panel(|panel| {
            panel.blank();
            Ok(())
        })
    }

    fn write(&mut self, text: &str) -> Result<(), DisplayError> {
        debug!("lcd@{:#04x}: {}", self.address, text);
        self.with_panel(|panel| {
            let (row, mut col) = panel.cursor;
            let cols = panel.cols;
            for ch in text.chars() {
                if col >= cols {
                    break;
                }
                panel.cells[row][col] = ch;
                col += 1;
            }
            panel.cursor = (row, col);
            Ok(())
        })
    }

    fn set_cursor(&mut self, row: u8, col: u8) -> Result<(), DisplayError> {
        self.with_panel(|panel| {
            let (row, col) = (row as usize, col as usize);
            if row >= panel.cells.len() || col >= panel.cols {
                return Err(DisplayError::Unsupported(format!(
                    "cursor ({}, {}) outside {}x{} panel",
                    row,
                    col,
                    panel.cols,
                    panel.cells.len()
                )));
            }
            panel.cursor = (row, col);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_cursor() {
        let bus = SimulatedBus::default();
        let mut lcd = bus.connect(0x27).unwrap();

        lcd.write("Hello").unwrap();
        lcd.set_cursor(1, 2).unwrap();
        lcd.write("world").unwrap();
        assert_eq!(bus.rows(), vec!["Hello", "  world"]);

        lcd.clear().unwrap();
        assert_eq!(bus.rows(), vec!["", ""]);
        assert_eq!(bus.op_count(), 4);
    }

    #[test]
    fn test_long_text_does_not_wrap() {
        let bus = SimulatedBus::new(&[0x27], 4, 2);
        let mut lcd = bus.connect(0x27).unwrap();
        lcd.write("abcdefgh").unwrap();
        assert_eq!(bus.rows(), vec!["abcd", ""]);
    }

    #[test]
    fn test_failures_and_unresponsive_addresses() {
        let bus = SimulatedBus::new(&[0x3f], 16, 2);
        assert!(matches!(bus.connect(0x27), Err(DisplayError::Comm(_))));
        let mut lcd = bus.connect(0x3f).unwrap();
        assert_eq!(bus.connect_attempts(), vec![0x27, 0x3f]);

        bus.fail_next(1);
        assert!(matches!(lcd.clear(), Err(DisplayError::Comm(_))));
        assert!(lcd.clear().is_ok());

        bus.set_responsive(&[]);
        assert!(matches!(lcd.write("x"), Err(DisplayError::Comm(_))));

        bus.set_responsive(&[0x3f]);
        assert!(matches!(
            lcd.set_cursor(2, 0),
            Err(DisplayError::Unsupported(_))
        ));
    }
}
