//! Serial port handling
//!
//! Port enumeration and opening on top of the `serialport` crate.

use serde::{Deserialize, Serialize};
use serialport::{SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::time::Duration;

use super::stream::{Channel, SerialChannel};
use super::{ProtocolError, DEFAULT_DATA_BITS};

/// Flow control mode for a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    /// No flow control
    #[default]
    None,
    /// XON/XOFF
    Software,
    /// RTS/CTS
    Hardware,
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Software => serialport::FlowControl::Software,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
        }
    }
}

fn default_data_bits() -> u8 {
    DEFAULT_DATA_BITS
}

fn default_write_timeout_ms() -> u64 {
    200
}

fn default_read_timeout_ms() -> u64 {
    500
}

fn default_newline() -> String {
    "\n".to_string()
}

/// Settings used to open a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    /// Port identifier; filled in by the scanner for each candidate
    #[serde(default)]
    pub port: String,
    /// Symbol rate
    pub baud_rate: u32,
    /// Data bits per symbol (5-8)
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    /// Flow control mode
    #[serde(default)]
    pub flow_control: FlowControl,
    /// Write timeout in milliseconds
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    /// Read timeout in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Line terminator for line-oriented reads and writes
    #[serde(default = "default_newline")]
    pub newline: String,
}

impl ChannelSpec {
    /// 8N1 at `baud_rate` with no port set yet
    pub fn new(baud_rate: u32) -> Self {
        Self {
            port: String::new(),
            baud_rate,
            data_bits: DEFAULT_DATA_BITS,
            flow_control: FlowControl::None,
            write_timeout_ms: default_write_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            newline: default_newline(),
        }
    }

    /// Copy of this spec targeting another port
    pub fn for_port(&self, port: &str) -> Self {
        Self {
            port: port.to_string(),
            ..self.clone()
        }
    }

    /// Write timeout as a [`Duration`]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Read timeout as a [`Duration`]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    fn serial_data_bits(&self) -> serialport::DataBits {
        match self.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            _ => serialport::DataBits::Eight,
        }
    }
}

/// Lists candidate ports and opens channels on them
pub trait PortBackend {
    /// Current port identifiers, re-queried on every call
    fn list_ports(&mut self) -> Vec<String>;

    /// Open and configure a channel on `spec.port`
    fn open(&mut self, spec: &ChannelSpec) -> Result<Box<dyn Channel>, ProtocolError>;
}

/// [`PortBackend`] over the host's real serial ports
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialBackend;

impl PortBackend for SerialBackend {
    fn list_ports(&mut self) -> Vec<String> {
        list_ports()
    }

    fn open(&mut self, spec: &ChannelSpec) -> Result<Box<dyn Channel>, ProtocolError> {
        let port = serialport::new(&spec.port, spec.baud_rate)
            .data_bits(spec.serial_data_bits())
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(spec.flow_control.into())
            .timeout(spec.read_timeout())
            .open()
            .map_err(|e| ProtocolError::OpenFailed {
                port: spec.port.clone(),
                reason: e.to_string(),
            })?;

        let mut channel = SerialChannel::new(spec.port.clone(), port, spec.newline.clone());
        channel.set_write_timeout(Some(spec.write_timeout()))?;
        channel.set_read_timeout(Some(spec.read_timeout()))?;
        Ok(Box::new(channel))
    }
}

/// Sort key so that ttyACM* come first, then ttyUSB*, then everything else,
/// numerically by suffix within each group
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    if let Some(rest) = basename.strip_prefix("ttyACM") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (0, num, basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("ttyUSB") {
        let num = rest.parse::<usize>().unwrap_or(usize::MAX);
        return (1, num, basename.to_string());
    }
    if let Some(rest) = basename.strip_prefix("COM") {
        if let Ok(num) = rest.parse::<usize>() {
            return (2, num, basename.to_string());
        }
    }
    (3, 0, basename.to_string())
}

fn describe(info: &SerialPortInfo) -> String {
    match &info.port_type {
        SerialPortType::UsbPort(usb) => format!(
            "usb {:04x}:{:04x} {}",
            usb.vid,
            usb.pid,
            usb.product.as_deref().unwrap_or("")
        ),
        SerialPortType::BluetoothPort => "bluetooth".to_string(),
        SerialPortType::PciPort => "pci".to_string(),
        SerialPortType::Unknown => "unknown".to_string(),
    }
}

/// List the host's serial port identifiers in deterministic order
pub fn list_ports() -> Vec<String> {
    let mut found: HashMap<String, String> = HashMap::new();
    match serialport::available_ports() {
        Ok(infos) => {
            for info in infos {
                let kind = describe(&info);
                found.entry(info.port_name).or_insert(kind);
            }
        }
        Err(e) => tracing::warn!("Port enumeration failed: {e}"),
    }

    // Linux: udev may not have announced freshly plugged adapters yet
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("ttyACM") || fname.starts_with("ttyUSB") {
                    found
                        .entry(format!("/dev/{}", fname))
                        .or_insert_with(|| "unknown".to_string());
                }
            }
        }
    }

    let mut names: Vec<String> = found.keys().cloned().collect();
    names.sort_by_key(|n| port_sort_key(n));
    for name in &names {
        tracing::trace!(port = %name, kind = %found[name], "enumerated port");
    }
    names
}
