//! Single-reading device

use super::parse::first_number;
use super::{DeviceCore, DeviceError, DeviceLink, MeasurementDevice, ReadResult, ResultKind};
use crate::config::DeviceConfig;

/// Placeholder replaced by the value in a setpoint format
pub const VALUE_PLACEHOLDER: &str = "{value}";

/// A device whose every response carries one reading, e.g. a pressure gauge
/// or a flow controller. When a setpoint format is configured, values can
/// also be sent to it.
pub struct ScalarDevice {
    core: DeviceCore,
    setpoint_format: Option<String>,
}

impl ScalarDevice {
    /// Uninitialized device; the template holds the configured result, or a
    /// plain [`ResultKind::Value`] when none is given
    pub fn new(config: &DeviceConfig, link: DeviceLink) -> Result<Self, DeviceError> {
        let mut core = DeviceCore::new(config, link)?;
        let first = config
            .results
            .first()
            .copied()
            .unwrap_or_else(|| ReadResult::new(ResultKind::Value));
        core.template_mut().push(first);
        Ok(Self {
            core,
            setpoint_format: config.setpoint_format.clone(),
        })
    }

    /// Command text for a setpoint of `value`
    pub fn format_setpoint(&self, value: f64) -> Option<String> {
        self.setpoint_format
            .as_deref()
            .map(|fmt| fmt.replace(VALUE_PLACEHOLDER, &value.to_string()))
    }
}

impl MeasurementDevice for ScalarDevice {
    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        self.core.discover()
    }

    fn send_val(&mut self, value: f64) -> Result<(), DeviceError> {
        let command = self.format_setpoint(value).ok_or_else(|| {
            DeviceError::Unsupported(format!("{} has no setpoint command", self.core.name()))
        })?;
        tracing::debug!(device = %self.core.name(), command = %command, "sending value");
        self.core.write_line(&command)
    }

    fn parse_and_set_all(&mut self, word: &str) -> Result<f64, DeviceError> {
        let value = first_number(word)?;
        for result in self.core.template_mut() {
            result.value = value;
        }
        Ok(value)
    }
}
