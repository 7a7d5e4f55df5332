//! Error handling for the SDS011 collector crate.

/// A specialized `Result` type for collector operations.
pub type Result<T> = std::result::Result<T, CollectorError>;

/// Errors raised by a particulate-matter device.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Serial I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The device did not answer within the read timeout
    #[error("device did not respond in time")]
    Timeout,

    /// A reply frame failed checksum verification
    #[error("checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    Checksum { expected: u8, actual: u8 },

    /// A reply frame was structurally invalid
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// The device could not be opened
    #[error("failed to open device: {0}")]
    Open(String),
}

impl DeviceError {
    /// Create a new malformed frame error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedFrame(msg.into())
    }

    /// Create a new open error
    pub fn open_error(msg: impl Into<String>) -> Self {
        Self::Open(msg.into())
    }
}

/// The main error type for collector operations.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    /// The device could not be opened or put into its initial power state
    #[error("Device open error: {0}")]
    DeviceOpen(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation not allowed in the current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The background worker failed to shut down cleanly
    #[error("Worker error: {0}")]
    Worker(String),
}

impl CollectorError {
    /// Create a new device open error
    pub fn device_open_error(msg: impl Into<String>) -> Self {
        Self::DeviceOpen(msg.into())
    }

    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Create a new worker error
    pub fn worker_error(msg: impl Into<String>) -> Self {
        Self::Worker(msg.into())
    }
}
