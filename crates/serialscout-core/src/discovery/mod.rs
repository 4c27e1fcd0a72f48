//! Port Discovery
//!
//! Finds which of the host's serial ports a call-and-response device is
//! attached to. Each candidate gets the call string; the first one to answer
//! with exactly the expected response is bound to the device.
//!
//! ```rust,ignore
//! use serialscout_core::discovery::{AlwaysAbort, HandshakeSpec, PortScanner, ScanTiming};
//! use serialscout_core::protocol::{ChannelSpec, SerialBackend};
//!
//! let handshake = HandshakeSpec::new("ID?", "FLOW-200", "R");
//! let mut scanner = PortScanner::new("Flow meter", ChannelSpec::new(9600), handshake, ScanTiming::default());
//! let bound = scanner.scan(&mut SerialBackend, &mut AlwaysAbort)?;
//! println!("found on {} in {:.3}s", bound.name(), bound.secs_to_find_port());
//! ```

pub mod handshake;
pub mod scanner;
pub mod timing;

use thiserror::Error;

pub use handshake::{classify, BoundPort, HandshakeOutcome, HandshakeSpec, ResponseMatch};
pub use scanner::{AlwaysAbort, PortScanner, RetryTimes, ScanConfirmation, ScanDecision, UsedPorts};
pub use timing::{timing_budget, ScanTiming};

/// Errors that end a discovery scan
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// Every pass came up empty and the confirmation chose to stop
    #[error("{device}: port not found")]
    PortNotFound {
        /// Display name of the device that was looked for
        device: String,
    },
}
