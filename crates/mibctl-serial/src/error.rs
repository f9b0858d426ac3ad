//! Error types for the serial link

use mibctl_core::TransportError;
use thiserror::Error;

/// Serial link errors
#[derive(Debug, Error)]
pub enum SerialError {
    /// Failed to connect to device
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection string could not be parsed
    #[error("Invalid connection string: {0}")]
    InvalidConnection(String),

    /// I/O error during communication
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

/// Result type for serial link operations
pub type Result<T> = core::result::Result<T, SerialError>;

impl From<SerialError> for TransportError {
    fn from(e: SerialError) -> Self {
        match e {
            SerialError::Io(ref io)
                if matches!(
                    io.kind(),
                    std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                ) =>
            {
                TransportError::Timeout
            }
            other => TransportError::Io(other.to_string()),
        }
    }
}
