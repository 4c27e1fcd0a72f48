//! Device Discovery Tool
//!
//! Scans the host's serial ports for the device described by a JSON config,
//! then takes a few readings from it.
//!
//! Usage:
//!   cargo run --example find_device -- [OPTIONS] [CONFIG]
//!
//! Options:
//!   --config PATH     Device configuration (JSON)
//!   --demo            Use simulated ports instead of real ones
//!   --reads N         Readings to take once bound (default: 5)
//!   --interval MS     Pause between readings in ms (default: 500)
//!   --retries N       Retry automatically N times instead of asking
//!   --list            Only list serial ports
//!
//! Set RUST_LOG=debug to watch every handshake attempt.

use anyhow::{bail, Context, Result};
use std::io::{self, BufRead, Write};
use std::time::Duration;

use serialscout_core::demo::{DemoBackend, DemoBehavior, DemoReading};
use serialscout_core::prelude::*;
use serialscout_core::protocol::{list_ports, PortBackend};
use tracing_subscriber::EnvFilter;

/// Asks on the terminal whether to keep scanning
struct TerminalConfirmation;

impl ScanConfirmation for TerminalConfirmation {
    fn port_not_found(&mut self, device_name: &str) -> ScanDecision {
        print!("{device_name}: port not found. Retry? [y/N] ");
        let _ = io::stdout().flush();
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return ScanDecision::Abort;
        }
        match answer.trim() {
            "y" | "Y" | "yes" => ScanDecision::Retry,
            _ => ScanDecision::Abort,
        }
    }
}

fn demo_config() -> DeviceConfig {
    DeviceConfig::new(
        "Demo flow meter",
        HandshakeSpec::new("ID?\r", "FM-200 rev C", "R"),
        ChannelSpec::new(9600),
    )
    .with_kind(DeviceKind::MultiField)
    .with_results(vec![
        ReadResult::new(ResultKind::Flow),
        ReadResult::new(ResultKind::Temperature).on_axis(AxisType::Secondary),
    ])
}

fn demo_backend(config: &DeviceConfig) -> DemoBackend {
    DemoBackend::new()
        .with_port("/dev/ttyS0", DemoBehavior::Silent)
        .with_port("/dev/ttyACM0", DemoBehavior::Replies("ERR\r\n".into()))
        .with_port("/dev/ttyACM1", DemoBehavior::Locked)
        .with_port(
            "/dev/ttyUSB0",
            DemoBehavior::device(
                &config.handshake.call,
                &config.handshake.response,
                DemoReading::Noisy {
                    values: vec![0.82, 22.4],
                    jitter: 0.05,
                },
            )
            .chunked(4),
        )
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut config_path: Option<String> = None;
    let mut demo = false;
    let mut reads = 5u32;
    let mut interval_ms = 500u64;
    let mut retries: Option<u32> = None;
    let mut list_only = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                config_path = args.get(i).cloned();
            }
            "--demo" => demo = true,
            "--reads" | "-n" => {
                i += 1;
                reads = args.get(i).and_then(|v| v.parse().ok()).unwrap_or(reads);
            }
            "--interval" | "-i" => {
                i += 1;
                interval_ms = args.get(i).and_then(|v| v.parse().ok()).unwrap_or(interval_ms);
            }
            "--retries" | "-r" => {
                i += 1;
                retries = args.get(i).and_then(|v| v.parse().ok());
            }
            "--list" | "-l" => list_only = true,
            "--help" | "-h" => {
                println!("Usage: find_device [--demo] [--config PATH] [--reads N] [--interval MS] [--retries N] [--list] [CONFIG]");
                return Ok(());
            }
            other if !other.starts_with('-') => config_path = Some(other.to_string()),
            other => bail!("unknown option {other}"),
        }
        i += 1;
    }

    if list_only {
        let ports = if demo {
            demo_backend(&demo_config()).list_ports()
        } else {
            list_ports()
        };
        for port in ports {
            println!("{port}");
        }
        return Ok(());
    }

    let config = match (&config_path, demo) {
        (Some(path), _) => DeviceConfig::from_file(path)
            .with_context(|| format!("loading device config {path}"))?,
        (None, true) => demo_config(),
        (None, false) => bail!("no device config given (use --config PATH or --demo)"),
    };

    let confirm: Box<dyn ScanConfirmation + Send> = match retries {
        Some(n) => Box::new(RetryTimes(n)),
        None => Box::new(TerminalConfirmation),
    };
    let backend: Box<dyn PortBackend + Send> = if demo {
        Box::new(demo_backend(&config))
    } else {
        Box::new(SerialBackend)
    };
    let link = DeviceLink { backend, confirm };

    let mut device = device::from_config(&config, link)?;
    device.start()?;

    if let Some(port) = device.core().port() {
        println!(
            "{} found on {} in {:.3}s",
            device.name(),
            port.name(),
            port.secs_to_find_port()
        );
    }

    for _ in 0..reads {
        device.kick_off_read()?;
        std::thread::sleep(Duration::from_millis(interval_ms.max(10)));
        match device.collect_ready() {
            Ok(primary) => {
                let all: Vec<String> = device
                    .results()
                    .iter()
                    .map(|r| format!("{:?}={:.3}", r.kind, r.value))
                    .collect();
                println!("{primary:.3}  [{}]", all.join(", "));
            }
            Err(e) => println!("read failed: {e}"),
        }
    }

    Ok(())
}
