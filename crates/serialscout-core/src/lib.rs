//! # SerialScout Core Library
//!
//! Finds the serial port a call-and-response instrument is attached to and
//! talks to it once found.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Port discovery by handshake (probe string, expected response, timing budget)
//! - A uniform read/send protocol over the bound port
//! - Device variants with pluggable response parsing
//! - JSON device configuration
//! - A simulated port backend for running without hardware
//!
//! ## Example
//!
//! ```rust,ignore
//! use serialscout_core::prelude::*;
//!
//! let config = DeviceConfig::from_file("flow_meter.json")?;
//! let mut device = device::from_config(&config, DeviceLink::new(SerialBackend, RetryTimes(1)))?;
//! device.start()?;
//!
//! device.kick_off_read()?;
//! std::thread::sleep(std::time::Duration::from_millis(50));
//! let flow = device.collect_ready()?;
//! println!("{}: {flow}", device.name());
//! ```

pub mod config;
pub mod demo;
pub mod device;
pub mod discovery;
pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::DeviceConfig;
    pub use crate::device::{
        self, AxisType, DeviceError, DeviceKind, DeviceLink, MeasurementDevice, ReadResult,
        ResultKind,
    };
    pub use crate::discovery::{
        AlwaysAbort, HandshakeSpec, RetryTimes, ScanConfirmation, ScanDecision, ScanTiming,
    };
    pub use crate::protocol::{ChannelSpec, FlowControl, SerialBackend};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
