//! Byte-oriented duplex channel
//!
//! Everything above this module talks to a device through [`Channel`], so the
//! discovery and read logic can run against real serial ports or the demo
//! backend alike. Closing a channel is dropping it.

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;

use super::ProtocolError;

/// Timeout applied when the caller asks for an unbounded one.
///
/// The serialport driver has no infinite mode, so a day stands in for it.
pub const UNBOUNDED_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// An opened, configured connection to one port
pub trait Channel: Send {
    /// Identifier the channel was opened with
    fn name(&self) -> &str;

    /// Set the write timeout (`None` = unbounded)
    fn set_write_timeout(&mut self, timeout: Option<Duration>) -> Result<(), ProtocolError>;

    /// Set the read timeout used by [`Channel::read_line`] (`None` = unbounded)
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), ProtocolError>;

    /// Drop any bytes received but not yet read
    fn discard_input(&mut self) -> Result<(), ProtocolError>;

    /// Drop any bytes queued but not yet transmitted
    fn discard_output(&mut self) -> Result<(), ProtocolError>;

    /// Transmit `data` as-is
    fn write_str(&mut self, data: &str) -> Result<(), ProtocolError>;

    /// Number of bytes available to read without blocking
    fn bytes_to_read(&mut self) -> Result<u32, ProtocolError>;

    /// Read every byte currently buffered, never waiting for more
    fn read_existing_bytes(&mut self) -> Result<Vec<u8>, ProtocolError>;

    /// [`Channel::read_existing_bytes`] as text.
    ///
    /// A multi-byte character split across two reads decodes as U+FFFD here;
    /// callers that accumulate across reads should keep the raw bytes.
    fn read_existing(&mut self) -> Result<String, ProtocolError> {
        let bytes = self.read_existing_bytes()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Block until a full line arrives; the terminator is stripped
    fn read_line(&mut self) -> Result<String, ProtocolError>;

    /// Line terminator used by [`Channel::write_line`] and [`Channel::read_line`]
    fn newline(&self) -> &str {
        "\n"
    }

    /// Transmit `line` followed by the line terminator
    fn write_line(&mut self, line: &str) -> Result<(), ProtocolError> {
        let framed = format!("{}{}", line, self.newline());
        self.write_str(&framed)
    }
}

/// Serial port wrapper implementing [`Channel`]
///
/// serialport keeps a single timeout for both directions, so the wrapper
/// remembers the read and write values and swaps the active one before
/// each operation.
pub struct SerialChannel {
    name: String,
    port: Box<dyn SerialPort>,
    newline: String,
    write_timeout: Duration,
    read_timeout: Duration,
    active_timeout: Duration,
}

impl SerialChannel {
    /// Wrap an opened port; both timeouts start at the port's current one
    pub fn new(
        name: impl Into<String>,
        port: Box<dyn SerialPort>,
        newline: impl Into<String>,
    ) -> Self {
        let active_timeout = port.timeout();
        Self {
            name: name.into(),
            port,
            newline: newline.into(),
            write_timeout: active_timeout,
            read_timeout: active_timeout,
            active_timeout,
        }
    }

    fn activate(&mut self, timeout: Duration) -> Result<(), ProtocolError> {
        if self.active_timeout != timeout {
            self.port.set_timeout(timeout)?;
            self.active_timeout = timeout;
        }
        Ok(())
    }
}

impl Channel for SerialChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_write_timeout(&mut self, timeout: Option<Duration>) -> Result<(), ProtocolError> {
        self.write_timeout = timeout.unwrap_or(UNBOUNDED_TIMEOUT);
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), ProtocolError> {
        self.read_timeout = timeout.unwrap_or(UNBOUNDED_TIMEOUT);
        Ok(())
    }

    fn discard_input(&mut self) -> Result<(), ProtocolError> {
        self.port.clear(serialport::ClearBuffer::Input)?;
        Ok(())
    }

    fn discard_output(&mut self) -> Result<(), ProtocolError> {
        self.port.clear(serialport::ClearBuffer::Output)?;
        Ok(())
    }

    fn write_str(&mut self, data: &str) -> Result<(), ProtocolError> {
        self.activate(self.write_timeout)?;
        // No flush: tcdrain can block indefinitely on some USB adapters
        match self.port.write_all(data.as_bytes()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Err(ProtocolError::WriteTimeout),
            Err(e) => Err(e.into()),
        }
    }

    fn bytes_to_read(&mut self) -> Result<u32, ProtocolError> {
        Ok(self.port.bytes_to_read()?)
    }

    fn read_existing_bytes(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let available = self.port.bytes_to_read()? as usize;
        let mut buf = vec![0u8; available];
        let mut filled = 0;
        while filled < available {
            match self.port.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e)
                    if e.kind() == io::ErrorKind::TimedOut
                        || e.kind() == io::ErrorKind::WouldBlock =>
                {
                    break
                }
                Err(e) => return Err(e.into()),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }

    fn read_line(&mut self) -> Result<String, ProtocolError> {
        self.activate(self.read_timeout)?;
        let terminator = self.newline.as_bytes().to_vec();
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match self.port.read(&mut byte) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
                Ok(_) => {
                    line.push(byte[0]);
                    if !terminator.is_empty() && line.ends_with(&terminator) {
                        line.truncate(line.len() - terminator.len());
                        return Ok(String::from_utf8_lossy(&line).into_owned());
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    return Err(ProtocolError::Timeout)
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn newline(&self) -> &str {
        &self.newline
    }
}
