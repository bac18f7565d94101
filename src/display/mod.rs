//! Two-line character display: device contract, frames and the
//! self-healing status renderer.
//!
//! The physical LCD is only ever written through [`StatusDisplay`], which
//! serializes periodic refreshes, override messages and recovery behind a
//! single lock.

#[cfg(feature = "gpio")]
pub mod lcd;
pub mod simulated;
pub mod status;

#[cfg(feature = "gpio")]
pub use lcd::{I2cDisplayBus, Pcf8574Lcd};
pub use simulated::{SimulatedBus, SimulatedDisplay};
pub use status::{DisplayHealth, DisplayOverride, StatusDisplay, MAX_CONSECUTIVE_ERRORS};

/// Errors reported by display hardware.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DisplayError {
    /// Transient bus failure; counted toward the degradation threshold
    #[error("display communication failed: {0}")]
    Comm(String),

    /// No candidate address answered during initialization
    #[error("no display responded at {}", format_addresses(.tried))]
    NotFound { tried: Vec<u8> },

    /// The device cannot honour the request (bad cursor position, etc.)
    #[error("display rejected request: {0}")]
    Unsupported(String),
}

fn format_addresses(addresses: &[u8]) -> String {
    addresses
        .iter()
        .map(|a| format!("{:#04x}", a))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Capabilities of a character display.
pub trait DisplayDevice: Send {
    fn clear(&mut self) -> Result<(), DisplayError>;

    fn write(&mut self, text: &str) -> Result<(), DisplayError>;

    fn set_cursor(&mut self, row: u8, col: u8) -> Result<(), DisplayError>;
}

/// Opens a display at a bus address, used for probing and re-initialization.
pub trait DisplayConnector: Send + Sync {
    fn connect(&self, address: u8) -> Result<Box<dyn DisplayDevice>, DisplayError>;
}

/// Two lines of text already cut to the display width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayFrame {
    pub line1: String,
    pub line2: String,
}

impl DisplayFrame {
    pub fn new(line1: impl AsRef<str>, line2: impl AsRef<str>, width: usize) -> Self {
        Self {
            line1: truncate_line(line1.as_ref(), width),
            line2: truncate_line(line2.as_ref(), width),
        }
    }
}

/// Cut `text` to at most `width` characters. Never wraps.
pub fn truncate_line(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncation_is_exact() {
        let long = "Security issue detected at the door";
        for width in [1, 8, 16, 20] {
            assert_eq!(truncate_line(long, width).chars().count(), width);
        }
        assert_eq!(truncate_line(long, 16), "Security issue d");
        assert_eq!(truncate_line("Party ON", 16), "Party ON");
        assert_eq!(truncate_line("anything", 0), "");
    }

    #[test]
    fn test_truncation_counts_characters_not_bytes() {
        assert_eq!(truncate_line("HDNxOG 😎 rules", 8), "HDNxOG 😎");
        assert_eq!(truncate_line("°°°°°°°°°°°°°°°°°°", 16).chars().count(), 16);
    }

    #[test]
    fn test_frame_truncates_both_lines() {
        let frame = DisplayFrame::new("Yellow Led ON and more", "T:23.5C H:40.0% extra", 16);
        assert_eq!(frame.line1, "Yellow Led ON an");
        assert_eq!(frame.line2, "T:23.5C H:40.0% ");
    }

    #[test]
    fn test_not_found_message_lists_addresses() {
        let err = DisplayError::NotFound {
            tried: vec![0x27, 0x3f],
        };
        assert_eq!(err.to_string(), "no display responded at 0x27, 0x3f");
    }
}
