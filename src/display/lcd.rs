//! HD44780 character LCD behind a PCF8574 I2C backpack.
//!
//! The backpack exposes the LCD in 4-bit mode: every byte is sent as two
//! nibbles on P4..P7, with RS, EN and the backlight on P0, P2 and P3.

use crate::display::{DisplayConnector, DisplayDevice, DisplayError};
use rppal::i2c::I2c;
use std::thread;
use std::time::Duration;
use tracing::debug;

const RS: u8 = 0x01;
const ENABLE: u8 = 0x04;
const BACKLIGHT: u8 = 0x08;

const CMD_CLEAR: u8 = 0x01;
const CMD_ENTRY_MODE: u8 = 0x06;
const CMD_DISPLAY_ON: u8 = 0x0c;
const CMD_FUNCTION_4BIT_2LINE: u8 = 0x28;
const CMD_SET_DDRAM: u8 = 0x80;

const ROW_OFFSETS: [u8; 4] = [0x00, 0x40, 0x14, 0x54];

fn comm(e: rppal::i2c::Error) -> DisplayError {
    DisplayError::Comm(e.to_string())
}

/// Opens [`Pcf8574Lcd`] devices on one I2C bus.
#[derive(Debug, Clone)]
pub struct I2cDisplayBus {
    bus: u8,
    cols: u8,
    rows: u8,
}

impl I2cDisplayBus {
    pub fn new(bus: u8, cols: u8, rows: u8) -> Self {
        Self { bus, cols, rows }
    }
}

impl DisplayConnector for I2cDisplayBus {
    fn connect(&self, address: u8) -> Result<Box<dyn DisplayDevice>, DisplayError> {
        let lcd = Pcf8574Lcd::open(self.bus, address, self.cols, self.rows)?;
        Ok(Box::new(lcd))
    }
}

/// One LCD at a fixed backpack address.
pub struct Pcf8574Lcd {
    i2c: I2c,
    cols: u8,
    rows: u8,
}

impl Pcf8574Lcd {
    /// Open the bus, address the backpack and run the 4-bit init sequence.
    ///
    /// A backpack that doesn't acknowledge fails here, which is what makes
    /// address probing work.
    pub fn open(bus: u8, address: u8, cols: u8, rows: u8) -> Result<Self, DisplayError> {
        let mut i2c = I2c::with_bus(bus).map_err(comm)?;
        i2c.set_slave_address(u16::from(address)).map_err(comm)?;

        let mut lcd = Self { i2c, cols, rows };
        lcd.initialize()?;
        debug!("HD44780 initialized at {:#04x} on bus {}", address, bus);
        Ok(lcd)
    }

    fn initialize(&mut self) -> Result<(), DisplayError> {
        thread::sleep(Duration::from_millis(50));

        // Force 8-bit mode three times, then switch to 4-bit.
        for _ in 0..3 {
            self.write_nibble(0x30, 0)?;
            thread::sleep(Duration::from_micros(4500));
        }
        self.write_nibble(0x20, 0)?;

        self.command(CMD_FUNCTION_4BIT_2LINE)?;
        self.command(CMD_DISPLAY_ON)?;
        self.command(CMD_CLEAR)?;
        thread::sleep(Duration::from_millis(2));
        self.command(CMD_ENTRY_MODE)
    }

    fn expander_write(&mut self, data: u8) -> Result<(), DisplayError> {
        self.i2c.write(&[data | BACKLIGHT]).map_err(comm)?;
        Ok(())
    }

    fn write_nibble(&mut self, nibble: u8, mode: u8) -> Result<(), DisplayError> {
        let data = (nibble & 0xf0) | mode;
        self.expander_write(data)?;
        self.expander_write(data | ENABLE)?;
        thread::sleep(Duration::from_micros(1));
        self.expander_write(data & !ENABLE)?;
        thread::sleep(Duration::from_micros(50));
        Ok(())
    }

    fn send(&mut self, value: u8, mode: u8) -> Result<(), DisplayError> {
        self.write_nibble(value & 0xf0, mode)?;
        self.write_nibble(value << 4, mode)
    }

    fn command(&mut self, value: u8) -> Result<(), DisplayError> {
        self.send(value, 0)
    }
}

impl DisplayDevice for Pcf8574Lcd {
    fn clear(&mut self) -> Result<(), DisplayError> {
        self.command(CMD_CLEAR)?;
        thread::sleep(Duration::from_millis(2));
        Ok(())
    }

    fn write(&mut self, text: &str) -> Result<(), DisplayError> {
        // The HD44780 ROM only covers ASCII reliably.
        for ch in text.chars() {
            let byte = if ch.is_ascii() && !ch.is_ascii_control() {
                ch as u8
            } else {
                b'?'
            };
            self.send(byte, RS)?;
        }
        Ok(())
    }

    fn set_cursor(&mut self, row: u8, col: u8) -> Result<(), DisplayError> {
        let address = ROW_OFFSETS
            .get(usize::from(row))
            .filter(|_| row < self.rows && col < self.cols)
            .and_then(|offset| offset.checked_add(col))
            .filter(|address| *address < CMD_SET_DDRAM);
        let Some(address) = address else {
            return Err(DisplayError::Unsupported(format!(
                "cursor ({}, {}) outside {}x{} panel",
                row, col, self.cols, self.rows
            )));
        };
        self.command(CMD_SET_DDRAM | address)
    }
}
