//! Measurement Devices
//!
//! A uniform read/send protocol over a port found by discovery. Each device
//! variant supplies how it starts, decodes a response into its result
//! template, and encodes a value to send; [`DeviceCore`] carries the state and
//! the read round trips they all share.

mod error;
mod multi_field;
pub mod parse;
mod result;
mod scalar;

pub use error::DeviceError;
pub use multi_field::MultiFieldDevice;
pub use parse::ReadParser;
pub use result::{AxisType, ReadResult, ResultKind};
pub use scalar::{ScalarDevice, VALUE_PLACEHOLDER};

use serde::{Deserialize, Serialize};

use crate::config::DeviceConfig;
use crate::discovery::{BoundPort, HandshakeSpec, PortScanner, ScanConfirmation, ScanTiming, UsedPorts};
use crate::protocol::{Channel, PortBackend};

/// Which variant a configuration describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// One reading per response
    #[default]
    Scalar,
    /// Several readings per response, mapped onto the template in order
    MultiField,
}

/// Port discovery collaborators a device is constructed with
pub struct DeviceLink {
    /// Enumerates and opens candidate ports
    pub backend: Box<dyn PortBackend + Send>,
    /// Decides between retry and abort after an empty pass
    pub confirm: Box<dyn ScanConfirmation + Send>,
}

impl DeviceLink {
    /// Box both collaborators
    pub fn new(
        backend: impl PortBackend + Send + 'static,
        confirm: impl ScanConfirmation + Send + 'static,
    ) -> Self {
        Self {
            backend: Box::new(backend),
            confirm: Box::new(confirm),
        }
    }
}

/// State shared by every device variant
pub struct DeviceCore {
    device_id: Option<String>,
    name: String,
    template: Vec<ReadResult>,
    handshake: HandshakeSpec,
    timing: ScanTiming,
    scanner: PortScanner,
    link: DeviceLink,
    port: Option<BoundPort>,
    initialized: bool,
}

impl DeviceCore {
    /// Uninitialized device with an empty result template
    pub fn new(config: &DeviceConfig, link: DeviceLink) -> Result<Self, DeviceError> {
        config.validate()?;
        let scanner = PortScanner::new(
            config.name.clone(),
            config.channel.clone(),
            config.handshake.clone(),
            config.timing,
        );
        Ok(Self {
            device_id: config.device_id.clone(),
            name: config.name.clone(),
            template: Vec::new(),
            handshake: config.handshake.clone(),
            timing: config.timing,
            scanner,
            link,
            port: None,
            initialized: false,
        })
    }

    /// Identifier, if one was set
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    /// Set the identifier. Allowed any number of times until the device is
    /// initialized, never after.
    pub fn set_device_id(&mut self, id: impl Into<String>) -> Result<(), DeviceError> {
        if self.initialized {
            return Err(DeviceError::IdentifierReassignment {
                current: self.device_id.clone(),
            });
        }
        self.device_id = Some(id.into());
        Ok(())
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set once `start()` binds a port; never cleared
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Result template, holding the latest values
    pub fn template(&self) -> &[ReadResult] {
        &self.template
    }

    /// Mutable result template
    pub fn template_mut(&mut self) -> &mut Vec<ReadResult> {
        &mut self.template
    }

    /// Handshake strings
    pub fn handshake(&self) -> &HandshakeSpec {
        &self.handshake
    }

    /// Bound port, once started
    pub fn port(&self) -> Option<&BoundPort> {
        self.port.as_ref()
    }

    /// Whether a port is bound
    pub fn is_bound(&self) -> bool {
        self.port.is_some()
    }

    /// Seconds the handshake took on the bound port
    pub fn secs_to_find_port(&self) -> Option<f64> {
        self.port.as_ref().map(BoundPort::secs_to_find_port)
    }

    /// Ports discovery has ruled out for this device
    pub fn used_ports(&self) -> &UsedPorts {
        self.scanner.used_ports()
    }

    /// Scan passes run so far
    pub fn scan_passes(&self) -> u32 {
        self.scanner.passes()
    }

    /// Find and bind the device's port, then latch initialized.
    ///
    /// A device that is already bound is left as is.
    pub fn discover(&mut self) -> Result<(), DeviceError> {
        if self.initialized {
            tracing::debug!(device = %self.name, "already initialized");
            return Ok(());
        }

        let bound = self
            .scanner
            .scan(self.link.backend.as_mut(), self.link.confirm.as_mut())?;
        self.port = Some(bound);
        self.initialized = true;
        Ok(())
    }

    /// Bound channel, or [`DeviceError::NotInitialized`]
    pub fn channel(&mut self) -> Result<&mut dyn Channel, DeviceError> {
        self.port
            .as_mut()
            .map(BoundPort::channel)
            .ok_or(DeviceError::NotInitialized)
    }

    /// Transmit `line` followed by the line terminator
    pub fn write_line(&mut self, line: &str) -> Result<(), DeviceError> {
        self.channel()?.write_line(line)?;
        Ok(())
    }

    /// Discard stale input and send the read command without waiting
    pub fn kick_off_read(&mut self) -> Result<(), DeviceError> {
        let command = self.handshake.read_command.clone();
        let channel = self.channel()?;
        channel.discard_input()?;
        channel.write_line(&command)?;
        Ok(())
    }

    /// Whatever text is currently buffered, without waiting for more
    pub fn read_existing(&mut self) -> Result<String, DeviceError> {
        Ok(self.channel()?.read_existing()?)
    }

    /// Send the read command, let the link settle, and block for one line
    pub fn request_line(&mut self) -> Result<String, DeviceError> {
        let command = self.handshake.read_command.clone();
        let settle = self.timing.pre_read_settle();
        let channel = self.channel()?;
        channel.write_line(&command)?;
        std::thread::sleep(settle);
        Ok(channel.read_line()?)
    }

    /// Parse buffered text with `parse`; the companion of [`Self::kick_off_read`]
    pub fn read_ready_data(&mut self, parse: &dyn ReadParser) -> Result<f64, DeviceError> {
        let message = self.read_existing()?;
        parse.parse(&message)
    }

    /// Synchronous round trip parsed with `parse`
    pub fn read_val(&mut self, parse: &dyn ReadParser) -> Result<f64, DeviceError> {
        let message = self.request_line()?;
        parse.parse(&message)
    }
}

/// Capabilities every device variant provides
pub trait MeasurementDevice: Send {
    /// Shared device state
    fn core(&self) -> &DeviceCore;

    /// Mutable shared device state
    fn core_mut(&mut self) -> &mut DeviceCore;

    /// Find the device's port and bind it
    fn start(&mut self) -> Result<(), DeviceError>;

    /// Encode and transmit a value, e.g. an actuator setpoint
    fn send_val(&mut self, value: f64) -> Result<(), DeviceError>;

    /// Decode `word` into every entry of the result template and return the
    /// primary value
    fn parse_and_set_all(&mut self, word: &str) -> Result<f64, DeviceError>;

    /// Display name
    fn name(&self) -> &str {
        self.core().name()
    }

    /// Template with the latest decoded values
    fn results(&self) -> &[ReadResult] {
        self.core().template()
    }

    /// Start a read without waiting for the answer. Pair with
    /// [`MeasurementDevice::read_ready_data`] or [`MeasurementDevice::collect_ready`].
    fn kick_off_read(&mut self) -> Result<(), DeviceError> {
        self.core_mut().kick_off_read()
    }

    /// Parse whatever [`MeasurementDevice::kick_off_read`] brought in
    fn read_ready_data(&mut self, parse: &dyn ReadParser) -> Result<f64, DeviceError> {
        self.core_mut().read_ready_data(parse)
    }

    /// Blocking read of one line parsed with `parse`
    fn read_val(&mut self, parse: &dyn ReadParser) -> Result<f64, DeviceError> {
        self.core_mut().read_val(parse)
    }

    /// Decode buffered text into the whole template
    fn collect_ready(&mut self) -> Result<f64, DeviceError> {
        let message = self.core_mut().read_existing()?;
        self.parse_and_set_all(&message)
    }

    /// Synchronous round trip decoded into the whole template
    fn read_all(&mut self) -> Result<f64, DeviceError> {
        let message = self.core_mut().request_line()?;
        self.parse_and_set_all(&message)
    }
}

/// Build the variant `config.kind` names
pub fn from_config(
    config: &DeviceConfig,
    link: DeviceLink,
) -> Result<Box<dyn MeasurementDevice>, DeviceError> {
    Ok(match config.kind {
        DeviceKind::Scalar => Box::new(ScalarDevice::new(config, link)?),
        DeviceKind::MultiField => Box::new(MultiFieldDevice::new(config, link)?),
    })
}
