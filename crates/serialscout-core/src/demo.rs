//! Demo Mode - Simulated serial ports for running without hardware
//!
//! [`DemoBackend`] presents a scripted set of ports. Each one behaves like a
//! real candidate would during discovery: the right device answers the call
//! string (optionally in several chunks), other equipment answers with
//! something else or nothing at all, and some ports are locked or fault.
//!
//! Clones share state, so a test can keep one handle to inspect what the
//! scanner did or to plug in a port between passes.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::protocol::{Channel, ChannelSpec, PortBackend, ProtocolError};

/// Readings produced by a simulated device
#[derive(Debug, Clone, PartialEq)]
pub enum DemoReading {
    /// Same text every time
    Fixed(String),
    /// `values`, each with up to `jitter` of uniform noise, comma-separated
    Noisy {
        /// Centre values
        values: Vec<f64>,
        /// Largest deviation added to each
        jitter: f64,
    },
}

impl DemoReading {
    fn render(&self, rng: &mut StdRng) -> String {
        match self {
            DemoReading::Fixed(text) => text.clone(),
            DemoReading::Noisy { values, jitter } => values
                .iter()
                .map(|v| {
                    let noise = if *jitter > 0.0 {
                        rng.gen_range(-*jitter..=*jitter)
                    } else {
                        0.0
                    };
                    format!("{:.3}", v + noise)
                })
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

/// How a simulated port reacts
#[derive(Debug, Clone, PartialEq)]
pub enum DemoBehavior {
    /// The device we are looking for
    Device {
        /// Probe it answers
        call: String,
        /// Its handshake answer
        response: String,
        /// Handshake response is delivered in chunks of this many bytes
        chunk_size: usize,
        /// Answer to every newline-terminated write
        reading: DemoReading,
    },
    /// Answers any write with this text
    Replies(String),
    /// Accepts writes, never answers
    Silent,
    /// Open fails, as if another process holds the port
    Locked,
    /// Opens, then faults on the first poll
    Faulty,
    /// Opens, then every write times out
    SlowWrite,
}

impl DemoBehavior {
    /// Device answering `call` with `response` in one piece
    pub fn device(call: &str, response: &str, reading: DemoReading) -> Self {
        DemoBehavior::Device {
            call: call.to_string(),
            response: response.to_string(),
            chunk_size: usize::MAX,
            reading,
        }
    }

    /// Same behavior, handshake response split into `chunk_size` pieces
    pub fn chunked(self, chunk_size: usize) -> Self {
        match self {
            DemoBehavior::Device {
                call,
                response,
                reading,
                ..
            } => DemoBehavior::Device {
                call,
                response,
                chunk_size: chunk_size.max(1),
                reading,
            },
            other => other,
        }
    }
}

/// Per-port activity counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemoPortStats {
    /// Successful opens
    pub opens: u32,
    /// Failed open attempts
    pub rejected_opens: u32,
    /// Every string written, in order
    pub writes: Vec<String>,
    /// Every write timeout set, in order (`None` = unbounded)
    pub write_timeouts: Vec<Option<Duration>>,
    /// Times the receive buffer was discarded
    pub input_discards: u32,
    /// Times the transmit buffer was discarded
    pub output_discards: u32,
}

struct DemoState {
    ports: Vec<(String, DemoBehavior)>,
    stale: BTreeMap<String, Vec<u8>>,
    stats: BTreeMap<String, DemoPortStats>,
    open_now: usize,
    max_open: usize,
    rng: StdRng,
}

/// Scripted [`PortBackend`]
#[derive(Clone)]
pub struct DemoBackend {
    state: Arc<Mutex<DemoState>>,
}

impl Default for DemoBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoBackend {
    /// No ports, entropy-seeded readings
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Reproducible readings
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            state: Arc::new(Mutex::new(DemoState {
                ports: Vec::new(),
                stale: BTreeMap::new(),
                stats: BTreeMap::new(),
                open_now: 0,
                max_open: 0,
                rng,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DemoState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a port; enumeration returns ports in the order they were added
    pub fn add_port(&self, name: &str, behavior: DemoBehavior) {
        let mut state = self.lock();
        state.ports.retain(|(n, _)| n != name);
        state.ports.push((name.to_string(), behavior));
    }

    /// [`DemoBackend::add_port`] for builder chains
    pub fn with_port(self, name: &str, behavior: DemoBehavior) -> Self {
        self.add_port(name, behavior);
        self
    }

    /// Leave `bytes` sitting in the port's receive buffer on every open, like
    /// line noise or the tail of an earlier session
    pub fn add_stale_input(&self, name: &str, bytes: &[u8]) {
        self.lock()
            .stale
            .entry(name.to_string())
            .or_default()
            .extend_from_slice(bytes);
    }

    /// Unplug a port; open channels on it keep working
    pub fn remove_port(&self, name: &str) {
        self.lock().ports.retain(|(n, _)| n != name);
    }

    /// Activity on `name` so far
    pub fn stats(&self, name: &str) -> DemoPortStats {
        self.lock().stats.get(name).cloned().unwrap_or_default()
    }

    /// Channels currently open
    pub fn open_channels(&self) -> usize {
        self.lock().open_now
    }

    /// Most channels ever open at once
    pub fn max_open_channels(&self) -> usize {
        self.lock().max_open
    }
}

impl PortBackend for DemoBackend {
    fn list_ports(&mut self) -> Vec<String> {
        self.lock().ports.iter().map(|(n, _)| n.clone()).collect()
    }

    fn open(&mut self, spec: &ChannelSpec) -> Result<Box<dyn Channel>, ProtocolError> {
        let mut state = self.lock();
        let behavior = state
            .ports
            .iter()
            .find(|(n, _)| *n == spec.port)
            .map(|(_, b)| b.clone());

        let behavior = match behavior {
            Some(DemoBehavior::Locked) => return Err(reject(&mut state, &spec.port, "Access denied")),
            None => return Err(reject(&mut state, &spec.port, "No such device")),
            Some(b) => b,
        };

        state.stats.entry(spec.port.clone()).or_default().opens += 1;
        state.open_now += 1;
        state.max_open = state.max_open.max(state.open_now);

        let rx = state
            .stale
            .get(&spec.port)
            .filter(|bytes| !bytes.is_empty())
            .cloned()
            .into_iter()
            .collect();

        Ok(Box::new(DemoChannel {
            name: spec.port.clone(),
            behavior,
            newline: spec.newline.clone(),
            rx,
            state: Arc::clone(&self.state),
        }))
    }
}

fn reject(state: &mut DemoState, port: &str, reason: &str) -> ProtocolError {
    state.stats.entry(port.to_string()).or_default().rejected_opens += 1;
    ProtocolError::OpenFailed {
        port: port.to_string(),
        reason: reason.to_string(),
    }
}

struct DemoChannel {
    name: String,
    behavior: DemoBehavior,
    newline: String,
    /// Pending chunks; each poll sees only the front one
    rx: VecDeque<Vec<u8>>,
    state: Arc<Mutex<DemoState>>,
}

impl DemoChannel {
    fn lock(&self) -> MutexGuard<'_, DemoState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Split on byte boundaries, so a multi-byte character may straddle two
    /// chunks just as it can on a real line
    fn queue_chunks(&mut self, text: &str, chunk_size: usize) {
        for piece in text.as_bytes().chunks(chunk_size.max(1)) {
            self.rx.push_back(piece.to_vec());
        }
    }
}

impl Drop for DemoChannel {
    fn drop(&mut self) {
        let mut state = self.lock();
        state.open_now = state.open_now.saturating_sub(1);
    }
}

impl Channel for DemoChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_write_timeout(&mut self, timeout: Option<Duration>) -> Result<(), ProtocolError> {
        self.lock()
            .stats
            .entry(self.name.clone())
            .or_default()
            .write_timeouts
            .push(timeout);
        Ok(())
    }

    fn set_read_timeout(&mut self, _timeout: Option<Duration>) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn discard_input(&mut self) -> Result<(), ProtocolError> {
        self.rx.clear();
        self.lock()
            .stats
            .entry(self.name.clone())
            .or_default()
            .input_discards += 1;
        Ok(())
    }

    fn discard_output(&mut self) -> Result<(), ProtocolError> {
        self.lock()
            .stats
            .entry(self.name.clone())
            .or_default()
            .output_discards += 1;
        Ok(())
    }

    fn write_str(&mut self, data: &str) -> Result<(), ProtocolError> {
        self.lock()
            .stats
            .entry(self.name.clone())
            .or_default()
            .writes
            .push(data.to_string());

        match self.behavior.clone() {
            DemoBehavior::SlowWrite => Err(ProtocolError::WriteTimeout),
            DemoBehavior::Replies(text) => {
                self.rx.push_back(text.into_bytes());
                Ok(())
            }
            DemoBehavior::Device {
                call,
                response,
                chunk_size,
                reading,
            } => {
                if data == call {
                    self.queue_chunks(&response, chunk_size);
                } else if data.ends_with(&self.newline) {
                    let line = {
                        let mut state = self.lock();
                        reading.render(&mut state.rng)
                    };
                    self.rx
                        .push_back(format!("{}{}", line, self.newline).into_bytes());
                }
                Ok(())
            }
            DemoBehavior::Silent | DemoBehavior::Faulty | DemoBehavior::Locked => Ok(()),
        }
    }

    fn bytes_to_read(&mut self) -> Result<u32, ProtocolError> {
        if self.behavior == DemoBehavior::Faulty {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device disconnected").into());
        }
        Ok(self.rx.front().map(|c| c.len() as u32).unwrap_or(0))
    }

    fn read_existing_bytes(&mut self) -> Result<Vec<u8>, ProtocolError> {
        Ok(self.rx.pop_front().unwrap_or_default())
    }

    fn read_line(&mut self) -> Result<String, ProtocolError> {
        let terminator = self.newline.as_bytes().to_vec();
        let mut buffered = Vec::new();
        while let Some(chunk) = self.rx.pop_front() {
            buffered.extend_from_slice(&chunk);
            let end = buffered
                .windows(terminator.len().max(1))
                .position(|w| w == terminator.as_slice());
            if let Some(end) = end.filter(|_| !terminator.is_empty()) {
                let rest = buffered.split_off(end + terminator.len());
                if !rest.is_empty() {
                    self.rx.push_front(rest);
                }
                buffered.truncate(end);
                return Ok(String::from_utf8_lossy(&buffered).into_owned());
            }
        }
        if !buffered.is_empty() {
            self.rx.push_front(buffered);
        }
        Err(ProtocolError::Timeout)
    }

    fn newline(&self) -> &str {
        &self.newline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(port: &str) -> ChannelSpec {
        ChannelSpec::new(9600).for_port(port)
    }

    #[test]
    fn test_device_answers_call_in_chunks() {
        let mut backend = DemoBackend::with_seed(1).with_port(
            "A",
            DemoBehavior::device("?", "HELLO", DemoReading::Fixed("1".into())).chunked(2),
        );
        let mut ch = backend.open(&spec("A")).unwrap();
        ch.write_str("?").unwrap();
        let mut chunks = Vec::new();
        while ch.bytes_to_read().unwrap() > 0 {
            chunks.push(ch.read_existing().unwrap());
        }
        assert_eq!(chunks, vec!["HE", "LL", "O"]);
    }

    #[test]
    fn test_chunks_split_on_byte_boundaries() {
        let mut backend = DemoBackend::with_seed(1).with_port(
            "A",
            DemoBehavior::device("?", "25\u{b0}", DemoReading::Fixed("1".into())).chunked(3),
        );
        let mut ch = backend.open(&spec("A")).unwrap();
        ch.write_str("?").unwrap();
        assert_eq!(ch.read_existing_bytes().unwrap(), vec![b'2', b'5', 0xC2]);
        assert_eq!(ch.read_existing_bytes().unwrap(), vec![0xB0]);
        assert_eq!(ch.bytes_to_read().unwrap(), 0);
    }

    #[test]
    fn test_stale_input_present_on_every_open() {
        let mut backend = DemoBackend::new().with_port("S", DemoBehavior::Silent);
        backend.add_stale_input("S", b"NOISE");
        for _ in 0..2 {
            let mut ch = backend.open(&spec("S")).unwrap();
            assert_eq!(ch.bytes_to_read().unwrap(), 5);
            ch.discard_input().unwrap();
            ch.discard_output().unwrap();
            assert_eq!(ch.bytes_to_read().unwrap(), 0);
        }
        let stats = backend.stats("S");
        assert_eq!(stats.input_discards, 2);
        assert_eq!(stats.output_discards, 2);
    }

    #[test]
    fn test_device_answers_read_command_with_line() {
        let mut backend = DemoBackend::with_seed(1).with_port(
            "A",
            DemoBehavior::device("?", "OK", DemoReading::Fixed("12.5".into())),
        );
        let mut ch = backend.open(&spec("A")).unwrap();
        ch.write_line("R").unwrap();
        assert_eq!(ch.read_line().unwrap(), "12.5");
        assert!(matches!(ch.read_line(), Err(ProtocolError::Timeout)));
        assert_eq!(backend.stats("A").writes, vec!["R\n".to_string()]);
    }

    #[test]
    fn test_noisy_reading_stays_within_jitter() {
        let mut rng = StdRng::seed_from_u64(7);
        let reading = DemoReading::Noisy {
            values: vec![10.0, -5.0],
            jitter: 0.5,
        };
        for _ in 0..20 {
            let text = reading.render(&mut rng);
            let parts: Vec<f64> = text.split(',').map(|p| p.parse().unwrap()).collect();
            assert_eq!(parts.len(), 2);
            assert!((parts[0] - 10.0).abs() <= 0.5 + 1e-9);
            assert!((parts[1] + 5.0).abs() <= 0.5 + 1e-9);
        }
    }

    #[test]
    fn test_locked_and_missing_ports_fail_to_open() {
        let mut backend = DemoBackend::new().with_port("L", DemoBehavior::Locked);
        assert!(matches!(
            backend.open(&spec("L")),
            Err(ProtocolError::OpenFailed { .. })
        ));
        assert!(backend.open(&spec("missing")).is_err());
        assert_eq!(backend.stats("L").rejected_opens, 1);
        assert_eq!(backend.open_channels(), 0);
    }

    #[test]
    fn test_drop_closes_channel() {
        let mut backend = DemoBackend::new().with_port("S", DemoBehavior::Silent);
        let ch = backend.open(&spec("S")).unwrap();
        assert_eq!(backend.open_channels(), 1);
        drop(ch);
        assert_eq!(backend.open_channels(), 0);
        assert_eq!(backend.max_open_channels(), 1);
    }
}
