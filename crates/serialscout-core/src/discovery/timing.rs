//! Handshake timing
//!
//! How long to listen for a handshake response, and the fixed settle delays
//! around the probe.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum time to wait for `response_len` bytes to arrive.
///
/// `bonus + ceil(1000 * response_len / (baud_rate / data_bits))` ms. A zero
/// baud rate or symbol width is clamped to 1 rather than dividing by zero.
pub fn timing_budget(
    response_len: usize,
    baud_rate: u32,
    data_bits: u8,
    bonus: Duration,
) -> Duration {
    let baud = u64::from(baud_rate.max(1));
    let bits = u64::from(data_bits.max(1));
    let transfer_ms = (1000 * response_len as u64 * bits).div_ceil(baud);
    bonus + Duration::from_millis(transfer_ms)
}

fn default_first_pass_bonus_ms() -> u64 {
    300
}

fn default_retry_bonus_ms() -> u64 {
    600
}

fn default_post_open_settle_ms() -> u64 {
    50
}

fn default_pre_read_settle_ms() -> u64 {
    30
}

fn default_precheck_hold_ms() -> u64 {
    50
}

fn default_probe_write_timeout_ms() -> u64 {
    1000
}

/// Timing constants for discovery and synchronous reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanTiming {
    /// Budget bonus on the first scan pass
    #[serde(default = "default_first_pass_bonus_ms")]
    pub first_pass_bonus_ms: u64,
    /// Budget bonus on every pass after a retry
    #[serde(default = "default_retry_bonus_ms")]
    pub retry_bonus_ms: u64,
    /// Pause between sending the call string and polling for a response
    #[serde(default = "default_post_open_settle_ms")]
    pub post_open_settle_ms: u64,
    /// Pause between sending the read command and reading its line
    #[serde(default = "default_pre_read_settle_ms")]
    pub pre_read_settle_ms: u64,
    /// How long the liveness pre-check holds a candidate open
    #[serde(default = "default_precheck_hold_ms")]
    pub precheck_hold_ms: u64,
    /// Write timeout while the probe is transmitted
    #[serde(default = "default_probe_write_timeout_ms")]
    pub probe_write_timeout_ms: u64,
}

impl Default for ScanTiming {
    fn default() -> Self {
        Self {
            first_pass_bonus_ms: default_first_pass_bonus_ms(),
            retry_bonus_ms: default_retry_bonus_ms(),
            post_open_settle_ms: default_post_open_settle_ms(),
            pre_read_settle_ms: default_pre_read_settle_ms(),
            precheck_hold_ms: default_precheck_hold_ms(),
            probe_write_timeout_ms: default_probe_write_timeout_ms(),
        }
    }
}

impl ScanTiming {
    /// Bonus for the given 1-based pass number
    pub fn bonus_for_pass(&self, pass: u32) -> Duration {
        if pass <= 1 {
            Duration::from_millis(self.first_pass_bonus_ms)
        } else {
            Duration::from_millis(self.retry_bonus_ms)
        }
    }

    /// See [`ScanTiming::post_open_settle_ms`]
    pub fn post_open_settle(&self) -> Duration {
        Duration::from_millis(self.post_open_settle_ms)
    }

    /// See [`ScanTiming::pre_read_settle_ms`]
    pub fn pre_read_settle(&self) -> Duration {
        Duration::from_millis(self.pre_read_settle_ms)
    }

    /// See [`ScanTiming::precheck_hold_ms`]
    pub fn precheck_hold(&self) -> Duration {
        Duration::from_millis(self.precheck_hold_ms)
    }

    /// See [`ScanTiming::probe_write_timeout_ms`]
    pub fn probe_write_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_write_timeout_ms)
    }
}
