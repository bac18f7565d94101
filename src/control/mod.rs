//! Remote control surface: device toggles, party mode and the command syntax
//! read from stdin.

pub mod devices;
pub mod party;

pub use devices::{Device, DeviceController, DeviceSpec};
pub use party::PartyMode;

use std::str::FromStr;

/// One control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Toggle the device at this 1-based position
    Toggle(usize),
    /// Start or stop party mode
    Party,
    /// Leave the application
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "p" => Ok(Command::Party),
            "q" => Ok(Command::Quit),
            other => other
                .parse::<usize>()
                .ok()
                .filter(|&index| index > 0)
                .map(Command::Toggle)
                .ok_or_else(|| format!("Unknown command '{}'", s.trim())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parsing() {
        assert_eq!("1".parse(), Ok(Command::Toggle(1)));
        assert_eq!(" 5\n".parse(), Ok(Command::Toggle(5)));
        assert_eq!("P".parse(), Ok(Command::Party));
        assert_eq!("q".parse(), Ok(Command::Quit));
        assert!("0".parse::<Command>().is_err());
        assert!("lights".parse::<Command>().is_err());
        assert!("".parse::<Command>().is_err());
    }
}
