//! Device errors

use thiserror::Error;

use crate::config::ConfigError;
use crate::discovery::DiscoveryError;
use crate::protocol::ProtocolError;

/// Errors surfaced by a measurement device
#[derive(Error, Debug)]
pub enum DeviceError {
    /// Port discovery failed
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// The identifier was set after the device was initialized
    #[error("Device identifier can only be set before initialization (currently {current:?})")]
    IdentifierReassignment {
        /// Identifier in effect
        current: Option<String>,
    },

    /// Read or send before a successful `start()`
    #[error("Device has no bound port; call start() first")]
    NotInitialized,

    /// A response could not be decoded
    #[error("Could not parse {input:?}: {reason}")]
    Parse {
        /// Raw response text
        input: String,
        /// Why decoding failed
        reason: String,
    },

    /// The variant does not implement this operation
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// The device configuration is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Channel failure once bound
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl DeviceError {
    /// [`DeviceError::Parse`] for `input`
    pub fn parse(input: &str, reason: impl Into<String>) -> Self {
        DeviceError::Parse {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    /// Discovery ran out of candidates and the user chose to abort
    pub fn is_port_not_found(&self) -> bool {
        matches!(self, DeviceError::Discovery(DiscoveryError::PortNotFound { .. }))
    }
}
