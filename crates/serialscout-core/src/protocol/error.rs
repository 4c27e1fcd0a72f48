//! Protocol errors

use thiserror::Error;

/// Errors raised by a channel or the backend that opens it
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The port could not be opened, e.g. it is held by another process
    #[error("Failed to open {port}: {reason}")]
    OpenFailed {
        /// Port identifier
        port: String,
        /// Driver message
        reason: String,
    },

    /// A write did not complete within the write timeout
    #[error("Write timed out")]
    WriteTimeout,

    /// A blocking read ran past the read timeout
    #[error("Read timed out")]
    Timeout,

    /// Any other driver error
    #[error("Serial port error: {0}")]
    Serial(String),

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// A write that did not complete in time; the port may just be slow
    pub fn is_write_timeout(&self) -> bool {
        matches!(self, ProtocolError::WriteTimeout)
    }
}

impl From<serialport::Error> for ProtocolError {
    fn from(e: serialport::Error) -> Self {
        match e.kind() {
            serialport::ErrorKind::Io(std::io::ErrorKind::TimedOut) => ProtocolError::Timeout,
            _ => ProtocolError::Serial(e.to_string()),
        }
    }
}
