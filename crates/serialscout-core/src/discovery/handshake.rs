//! Handshake matcher
//!
//! Sends the call string to one opened candidate and listens for the expected
//! response. The channel is passed by value: every outcome other than
//! [`HandshakeOutcome::Found`] drops it, which closes the port.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

use super::timing::ScanTiming;
use crate::protocol::{Channel, ProtocolError};

/// Strings that identify a device and request data from it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeSpec {
    /// Probe transmitted to each candidate
    pub call: String,
    /// Exact text the right device answers with
    pub response: String,
    /// Command sent (with a line terminator) to request a reading once bound
    pub read_command: String,
}

impl HandshakeSpec {
    /// Handshake from its three strings
    pub fn new(
        call: impl Into<String>,
        response: impl Into<String>,
        read_command: impl Into<String>,
    ) -> Self {
        Self {
            call: call.into(),
            response: response.into(),
            read_command: read_command.into(),
        }
    }
}

/// How accumulated bytes relate to the expected response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMatch {
    /// Identical to the expected response
    Exact,
    /// A proper prefix; more bytes may still arrive
    Partial,
    /// Can never become the expected response
    Mismatch,
}

/// Compare what has arrived so far against the expected response.
///
/// Works on raw bytes so a character split across reads still counts as a
/// prefix.
pub fn classify(accumulated: &[u8], expected: &[u8]) -> ResponseMatch {
    if accumulated == expected {
        ResponseMatch::Exact
    } else if expected.starts_with(accumulated) {
        ResponseMatch::Partial
    } else {
        ResponseMatch::Mismatch
    }
}

/// A channel that answered the handshake, now owned by its device
pub struct BoundPort {
    channel: Box<dyn Channel>,
    elapsed: Duration,
}

impl BoundPort {
    /// Port identifier
    pub fn name(&self) -> &str {
        self.channel.name()
    }

    /// Time from the first poll until the response matched
    pub fn time_to_find(&self) -> Duration {
        self.elapsed
    }

    /// [`BoundPort::time_to_find`] in seconds
    pub fn secs_to_find_port(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    /// The bound channel
    pub fn channel(&mut self) -> &mut dyn Channel {
        self.channel.as_mut()
    }

    /// Give up the binding and take the channel
    pub fn into_channel(self) -> Box<dyn Channel> {
        self.channel
    }
}

impl fmt::Debug for BoundPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundPort")
            .field("name", &self.name())
            .field("elapsed", &self.elapsed)
            .finish()
    }
}

/// Result of one handshake attempt
#[derive(Debug)]
pub enum HandshakeOutcome {
    /// The expected response arrived in full
    Found(BoundPort),
    /// Something answered, but not with the expected response
    NotThisPort {
        /// Everything read before the mismatch
        received: String,
    },
    /// The budget ran out before the full response arrived
    Timeout {
        /// Everything read within the budget
        received: String,
    },
}

/// Probe `channel` and wait up to `budget` for the expected response.
///
/// Polling never blocks on a delimiter: whatever is buffered is appended and
/// compared after each read, and a mismatch returns immediately without
/// waiting out the budget.
pub fn attempt(
    mut channel: Box<dyn Channel>,
    spec: &HandshakeSpec,
    timing: &ScanTiming,
    budget: Duration,
) -> Result<HandshakeOutcome, ProtocolError> {
    channel.set_write_timeout(Some(timing.probe_write_timeout()))?;
    channel.discard_input()?;
    channel.discard_output()?;
    channel.write_str(&spec.call)?;

    std::thread::sleep(timing.post_open_settle());

    let expected = spec.response.as_bytes();
    let mut received: Vec<u8> = Vec::with_capacity(expected.len().max(64));
    let start = Instant::now();
    while start.elapsed() < budget {
        if channel.bytes_to_read()? == 0 {
            continue;
        }

        received.extend_from_slice(&channel.read_existing_bytes()?);
        tracing::debug!(
            port = channel.name(),
            received = %String::from_utf8_lossy(&received),
            "handshake chunk"
        );

        match classify(&received, expected) {
            ResponseMatch::Exact => {
                let elapsed = start.elapsed();
                // Confirmed live: writes may block as long as they need
                channel.set_write_timeout(None)?;
                return Ok(HandshakeOutcome::Found(BoundPort { channel, elapsed }));
            }
            ResponseMatch::Partial => {}
            ResponseMatch::Mismatch => {
                return Ok(HandshakeOutcome::NotThisPort {
                    received: lossy(received),
                })
            }
        }
    }

    Ok(HandshakeOutcome::Timeout {
        received: lossy(received),
    })
}

fn lossy(bytes: Vec<u8>) -> String {
    String::from_utf8_lossy(&bytes).into_owned()
}
