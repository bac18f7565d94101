//! Error handling for the DomiSafe appliance.

use crate::display::DisplayError;

/// A specialized `Result` type for DomiSafe operations.
pub type Result<T> = std::result::Result<T, SystemError>;

/// The main error type for DomiSafe operations.
#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// GPIO pin access failed
    #[error("GPIO error: {0}")]
    Gpio(String),

    /// Character display failed outside of the transient error budget
    #[error("Display error: {0}")]
    Display(#[from] DisplayError),

    /// Camera or image storage failed
    #[error("Capture error: {0}")]
    Capture(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic system error
    #[error("System error: {0}")]
    System(String),
}

impl SystemError {
    /// Create a new GPIO error
    pub fn gpio_error(msg: impl Into<String>) -> Self {
        Self::Gpio(msg.into())
    }

    /// Create a new capture error
    pub fn capture_error(msg: impl Into<String>) -> Self {
        Self::Capture(msg.into())
    }

    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new generic system error
    #[allow(clippy::self_named_constructors)]
    pub fn system_error(msg: impl Into<String>) -> Self {
        Self::System(msg.into())
    }
}
