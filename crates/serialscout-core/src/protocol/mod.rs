//! Serial Channel Layer
//!
//! The byte-oriented duplex channel the discovery and device layers are
//! written against, and its implementation over host serial ports.

mod error;
pub mod serial;
pub mod stream;

pub use error::ProtocolError;
pub use serial::{list_ports, ChannelSpec, FlowControl, PortBackend, SerialBackend};
pub use stream::{Channel, SerialChannel, UNBOUNDED_TIMEOUT};

/// Data bits per symbol when a channel spec doesn't say otherwise
pub const DEFAULT_DATA_BITS: u8 = 8;
