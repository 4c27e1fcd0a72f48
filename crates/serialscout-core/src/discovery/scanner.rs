//! Port scanner
//!
//! Runs handshake attempts across every enumerated port, keeps the blacklist
//! of ports proven unsuitable, and asks the confirmation collaborator what to
//! do when a whole pass comes up empty.

use std::collections::BTreeSet;
use std::time::Duration;

use super::handshake::{self, BoundPort, HandshakeOutcome, HandshakeSpec};
use super::timing::{timing_budget, ScanTiming};
use super::DiscoveryError;
use crate::protocol::{ChannelSpec, PortBackend};

/// Answer from the confirmation collaborator after an empty pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDecision {
    /// Stop and report the port as not found
    Abort,
    /// Run another pass
    Retry,
}

/// Asked once per exhausted pass whether to keep looking
pub trait ScanConfirmation {
    /// No candidate for `device_name` answered on the pass just finished
    fn port_not_found(&mut self, device_name: &str) -> ScanDecision;
}

impl<F> ScanConfirmation for F
where
    F: FnMut(&str) -> ScanDecision,
{
    fn port_not_found(&mut self, device_name: &str) -> ScanDecision {
        self(device_name)
    }
}

/// Gives up after the first empty pass
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysAbort;

impl ScanConfirmation for AlwaysAbort {
    fn port_not_found(&mut self, _device_name: &str) -> ScanDecision {
        ScanDecision::Abort
    }
}

/// Retries up to `n` times, then aborts
#[derive(Debug, Clone, Copy)]
pub struct RetryTimes(pub u32);

impl ScanConfirmation for RetryTimes {
    fn port_not_found(&mut self, _device_name: &str) -> ScanDecision {
        if self.0 == 0 {
            ScanDecision::Abort
        } else {
            self.0 -= 1;
            ScanDecision::Retry
        }
    }
}

/// Port identifiers excluded from every later pass. Only ever grows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsedPorts(BTreeSet<String>);

impl UsedPorts {
    /// Whether `port` is excluded
    pub fn contains(&self, port: &str) -> bool {
        self.0.contains(port)
    }

    /// Returns `true` if the port was not already excluded
    pub fn insert(&mut self, port: &str) -> bool {
        self.0.insert(port.to_string())
    }

    /// Number of excluded ports
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// No port excluded yet
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Excluded ports in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Discovery state for one device
#[derive(Debug, Clone)]
pub struct PortScanner {
    device_name: String,
    channel: ChannelSpec,
    handshake: HandshakeSpec,
    timing: ScanTiming,
    used_ports: UsedPorts,
    passes: u32,
}

impl PortScanner {
    /// Scanner with an empty blacklist; `channel.port` is ignored
    pub fn new(
        device_name: impl Into<String>,
        channel: ChannelSpec,
        handshake: HandshakeSpec,
        timing: ScanTiming,
    ) -> Self {
        Self {
            device_name: device_name.into(),
            channel,
            handshake,
            timing,
            used_ports: UsedPorts::default(),
            passes: 0,
        }
    }

    /// Ports excluded so far, including the one bound
    pub fn used_ports(&self) -> &UsedPorts {
        &self.used_ports
    }

    /// Passes run so far
    pub fn passes(&self) -> u32 {
        self.passes
    }

    /// Scan until a port answers or the confirmation says to stop.
    ///
    /// Each exhausted pass asks `confirm` once. Retry passes use the larger
    /// bonus and skip everything already in [`UsedPorts`].
    pub fn scan(
        &mut self,
        backend: &mut dyn PortBackend,
        confirm: &mut dyn ScanConfirmation,
    ) -> Result<BoundPort, DiscoveryError> {
        loop {
            self.passes += 1;
            let bonus = self.timing.bonus_for_pass(self.passes);
            tracing::info!(
                device = %self.device_name,
                pass = self.passes,
                bonus_ms = bonus.as_millis() as u64,
                "scanning for port"
            );

            if let Some(bound) = self.run_pass(backend, bonus) {
                tracing::info!(
                    device = %self.device_name,
                    port = bound.name(),
                    secs = bound.secs_to_find_port(),
                    "port found"
                );
                return Ok(bound);
            }

            tracing::warn!(
                device = %self.device_name,
                pass = self.passes,
                excluded = self.used_ports.len(),
                "port not found"
            );
            match confirm.port_not_found(&self.device_name) {
                ScanDecision::Retry => continue,
                ScanDecision::Abort => {
                    return Err(DiscoveryError::PortNotFound {
                        device: self.device_name.clone(),
                    })
                }
            }
        }
    }

    /// One pass over the current port list
    pub fn run_pass(&mut self, backend: &mut dyn PortBackend, bonus: Duration) -> Option<BoundPort> {
        for port in backend.list_ports() {
            if self.used_ports.contains(&port) {
                tracing::trace!(port = %port, "skipping excluded port");
                continue;
            }
            if let Some(bound) = self.try_port(backend, &port, bonus) {
                self.used_ports.insert(&port);
                return Some(bound);
            }
        }
        None
    }

    fn try_port(&mut self, backend: &mut dyn PortBackend, port: &str, bonus: Duration) -> Option<BoundPort> {
        let spec = self.channel.for_port(port);

        // Liveness pre-check: ports the OS has locked fail to open here
        match backend.open(&spec) {
            Ok(channel) => {
                std::thread::sleep(self.timing.precheck_hold());
                drop(channel);
            }
            Err(e) => {
                tracing::debug!(port, error = %e, "pre-check failed, excluding");
                self.used_ports.insert(port);
                return None;
            }
        }

        let budget = timing_budget(
            self.handshake.response.len(),
            spec.baud_rate,
            spec.data_bits,
            bonus,
        );
        tracing::debug!(port, budget_ms = budget.as_millis() as u64, "probing");

        let result = backend
            .open(&spec)
            .and_then(|channel| handshake::attempt(channel, &self.handshake, &self.timing, budget));

        match result {
            Ok(HandshakeOutcome::Found(bound)) => Some(bound),
            Ok(HandshakeOutcome::NotThisPort { received }) => {
                tracing::debug!(port, received = ?received, "wrong response");
                None
            }
            Ok(HandshakeOutcome::Timeout { received }) => {
                tracing::debug!(port, received = ?received, "no full response within budget");
                None
            }
            Err(e) if e.is_write_timeout() => {
                // Slow, not necessarily wrong; try it again next pass
                tracing::debug!(port, "probe write timed out");
                None
            }
            Err(e) => {
                tracing::warn!(port, error = %e, "I/O fault, excluding port");
                self.used_ports.insert(port);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_used_ports_grow_only() {
        let mut used = UsedPorts::default();
        assert!(used.is_empty());
        assert!(used.insert("COM1"));
        assert!(!used.insert("COM1"));
        assert!(used.insert("COM2"));
        assert_eq!(used.len(), 2);
        assert!(used.contains("COM1"));
        assert_eq!(used.iter().collect::<Vec<_>>(), vec!["COM1", "COM2"]);
    }

    #[test]
    fn test_retry_times() {
        let mut confirm = RetryTimes(2);
        assert_eq!(confirm.port_not_found("x"), ScanDecision::Retry);
        assert_eq!(confirm.port_not_found("x"), ScanDecision::Retry);
        assert_eq!(confirm.port_not_found("x"), ScanDecision::Abort);
        assert_eq!(AlwaysAbort.port_not_found("x"), ScanDecision::Abort);
    }

    #[test]
    fn test_closure_confirmation() {
        let mut asked = Vec::new();
        let mut confirm = |name: &str| {
            asked.push(name.to_string());
            ScanDecision::Abort
        };
        assert_eq!(confirm.port_not_found("Flow meter"), ScanDecision::Abort);
        drop(confirm);
        assert_eq!(asked, vec!["Flow meter".to_string()]);
    }
}
