//! Error types for thermolink

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Thermolink error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No open connection to the device
    #[error("Not connected")]
    NotConnected,

    /// No matching response within the allotted window
    #[error("Response timeout")]
    Timeout,

    /// Device answered with status="error"
    #[error("Device error: {0}")]
    Device(String),

    /// Command serialization failed
    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for the timeout result that `send_and_wait` returns when no
    /// matching line arrived in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }
}
