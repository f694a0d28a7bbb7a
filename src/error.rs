//! # Error Types
//!
//! Custom error types for Jog Bridge using `thiserror`.

use thiserror::Error;

/// Main error type for Jog Bridge
#[derive(Debug, Error)]
pub enum JogError {
    /// Joystick read failed (usually: device unplugged)
    #[error("Joystick read error: {0}")]
    DeviceRead(String),

    /// No usable joystick device found
    #[error("No joystick found")]
    JoystickNotFound,

    /// Joystick could not be opened or queried
    #[error("Joystick error: {0}")]
    Joystick(String),

    /// Serial port could not be opened or written
    #[error("Serial error: {0}")]
    Serial(String),

    /// None of the candidate serial ports could be opened
    #[error("No serial port found (tried: {0})")]
    SerialPortNotFound(String),

    /// Machine sent something we could not make sense of
    #[error("Command channel protocol error: {0}")]
    ChannelProtocol(String),

    /// Machine side of the command channel went away
    #[error("Command channel closed")]
    ChannelClosed,

    /// No calibration available for the joystick
    #[error("Calibration missing: {0}")]
    CalibrationMissing(String),

    /// Calibration present but unusable
    #[error("Invalid calibration: {0}")]
    Calibration(String),

    /// Stored points could not be written or read
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for JogError {
    fn from(e: toml::de::Error) -> Self {
        JogError::Config(e.to_string())
    }
}

/// Result type alias for Jog Bridge
pub type Result<T> = std::result::Result<T, JogError>;
