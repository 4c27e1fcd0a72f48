//! Device configuration
//!
//! A device is described by a JSON document; everything but the name, the
//! handshake strings and the baud rate has a default.
//!
//! ```json
//! {
//!   "name": "Flow meter",
//!   "kind": "multi_field",
//!   "call": "ID?\r",
//!   "response": "FM-200",
//!   "read_command": "R",
//!   "channel": { "baud_rate": 9600, "flow_control": "none" },
//!   "timing": { "retry_bonus_ms": 900 },
//!   "results": [
//!     { "kind": "Flow" },
//!     { "kind": "Temperature", "axis": "Secondary" }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::device::{DeviceKind, ReadResult, VALUE_PLACEHOLDER};
use crate::discovery::{HandshakeSpec, ScanTiming};
use crate::protocol::ChannelSpec;

/// Errors loading or validating a configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        /// File that was being read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid JSON for a [`DeviceConfig`]
    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A field holds a value the device cannot work with
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue {
        /// Offending field
        field: &'static str,
        /// What is wrong with it
        message: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field,
            message: message.into(),
        }
    }
}

/// Everything needed to construct a device and find its port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Display name, also shown by the port-not-found confirmation
    pub name: String,
    /// Device variant
    #[serde(default)]
    pub kind: DeviceKind,
    /// Identifier to preset before the device is started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Call, response and read command, stored at the top level
    #[serde(flatten)]
    pub handshake: HandshakeSpec,
    /// Settings for opening each candidate
    pub channel: ChannelSpec,
    /// Discovery and read timing
    #[serde(default)]
    pub timing: ScanTiming,
    /// Ordered result template
    #[serde(default)]
    pub results: Vec<ReadResult>,
    /// Command sent by `send_val`, with `{value}` standing for the value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setpoint_format: Option<String>,
}

impl DeviceConfig {
    /// Scalar device with default timing and no result template
    pub fn new(name: impl Into<String>, handshake: HandshakeSpec, channel: ChannelSpec) -> Self {
        Self {
            name: name.into(),
            kind: DeviceKind::Scalar,
            device_id: None,
            handshake,
            channel,
            timing: ScanTiming::default(),
            results: Vec::new(),
            setpoint_format: None,
        }
    }

    /// Set the device variant
    pub fn with_kind(mut self, kind: DeviceKind) -> Self {
        self.kind = kind;
        self
    }

    /// Replace the timing constants
    pub fn with_timing(mut self, timing: ScanTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Replace the result template
    pub fn with_results(mut self, results: Vec<ReadResult>) -> Self {
        self.results = results;
        self
    }

    /// Set the `send_val` command format
    pub fn with_setpoint_format(mut self, format: impl Into<String>) -> Self {
        self.setpoint_format = Some(format.into());
        self
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: DeviceConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Serialize for saving
    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the fields the device relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("name", "must not be empty"));
        }
        if self.handshake.call.is_empty() {
            return Err(ConfigError::invalid("call", "must not be empty"));
        }
        if self.handshake.response.is_empty() {
            return Err(ConfigError::invalid("response", "must not be empty"));
        }
        if self.channel.baud_rate == 0 {
            return Err(ConfigError::invalid("channel.baud_rate", "must be positive"));
        }
        if !(5..=8).contains(&self.channel.data_bits) {
            return Err(ConfigError::invalid(
                "channel.data_bits",
                format!("{} is not between 5 and 8", self.channel.data_bits),
            ));
        }
        if self.channel.newline.is_empty() {
            return Err(ConfigError::invalid("channel.newline", "must not be empty"));
        }
        if self.kind == DeviceKind::MultiField && self.results.is_empty() {
            return Err(ConfigError::invalid(
                "results",
                "a multi_field device needs at least one entry",
            ));
        }
        if self.kind == DeviceKind::Scalar && self.results.len() > 1 {
            return Err(ConfigError::invalid(
                "results",
                format!(
                    "a scalar device reports one reading, {} entries given",
                    self.results.len()
                ),
            ));
        }
        if let Some(format) = &self.setpoint_format {
            if !format.contains(VALUE_PLACEHOLDER) {
                return Err(ConfigError::invalid(
                    "setpoint_format",
                    format!("{format:?} has no {VALUE_PLACEHOLDER} placeholder"),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ResultKind;

    fn base() -> DeviceConfig {
        DeviceConfig::new(
            "Gauge",
            HandshakeSpec::new("?", "GAUGE", "R"),
            ChannelSpec::new(9600),
        )
    }

    #[test]
    fn test_valid_config() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn test_rejects_empty_response() {
        let mut config = base();
        config.handshake.response.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "response", .. })
        ));
    }

    #[test]
    fn test_rejects_zero_baud() {
        let mut config = base();
        config.channel.baud_rate = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_data_bits() {
        let mut config = base();
        config.channel.data_bits = 9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_multi_field_needs_results() {
        let config = base().with_kind(DeviceKind::MultiField);
        assert!(config.validate().is_err());
        let config = config.with_results(vec![ReadResult::new(ResultKind::Flow)]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scalar_takes_at_most_one_result() {
        let one = base().with_results(vec![ReadResult::new(ResultKind::Pressure)]);
        assert!(one.validate().is_ok());
        let two = base().with_results(vec![
            ReadResult::new(ResultKind::Pressure),
            ReadResult::new(ResultKind::Temperature),
        ]);
        assert!(matches!(
            two.validate(),
            Err(ConfigError::InvalidValue { field: "results", .. })
        ));
    }

    #[test]
    fn test_setpoint_needs_placeholder() {
        assert!(base().with_setpoint_format("SP").validate().is_err());
        assert!(base().with_setpoint_format("SP {value}").validate().is_ok());
    }
}
