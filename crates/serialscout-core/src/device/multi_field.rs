//! Multi-reading device

use super::parse::numbers;
use super::{DeviceCore, DeviceError, DeviceLink, MeasurementDevice};
use crate::config::DeviceConfig;

/// A read-only device answering with several numbers per response,
/// e.g. `"P=101.3 T=22.4 F=0.82"`. The numbers fill the result template in
/// order; the first one is the primary value.
pub struct MultiFieldDevice {
    core: DeviceCore,
}

impl MultiFieldDevice {
    /// Uninitialized device with the configured template
    pub fn new(config: &DeviceConfig, link: DeviceLink) -> Result<Self, DeviceError> {
        let mut core = DeviceCore::new(config, link)?;
        core.template_mut().extend(config.results.iter().copied());
        Ok(Self { core })
    }
}

impl MeasurementDevice for MultiFieldDevice {
    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        self.core.discover()
    }

    fn send_val(&mut self, _value: f64) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported(format!(
            "{} is read-only",
            self.core.name()
        )))
    }

    fn parse_and_set_all(&mut self, word: &str) -> Result<f64, DeviceError> {
        let values = numbers(word);
        let template = self.core.template_mut();
        if values.len() < template.len() {
            return Err(DeviceError::parse(
                word,
                format!("expected {} values, found {}", template.len(), values.len()),
            ));
        }
        for (result, value) in template.iter_mut().zip(&values) {
            result.value = *value;
        }
        values
            .first()
            .copied()
            .ok_or_else(|| DeviceError::parse(word, "no numeric value"))
    }
}
