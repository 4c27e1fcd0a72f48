//! Measurement device protocol over simulated ports

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use serialscout_core::config::DeviceConfig;
use serialscout_core::demo::{DemoBackend, DemoBehavior, DemoReading};
use serialscout_core::device::{
    self, parse, AxisType, DeviceError, DeviceKind, DeviceLink, MeasurementDevice,
    MultiFieldDevice, ReadResult, ResultKind, ScalarDevice,
};
use serialscout_core::discovery::{AlwaysAbort, HandshakeSpec, ScanDecision, ScanTiming};
use serialscout_core::protocol::ChannelSpec;

fn fast_timing() -> ScanTiming {
    ScanTiming {
        first_pass_bonus_ms: 30,
        retry_bonus_ms: 60,
        post_open_settle_ms: 0,
        pre_read_settle_ms: 0,
        precheck_hold_ms: 0,
        probe_write_timeout_ms: 100,
    }
}

fn gauge_config() -> DeviceConfig {
    DeviceConfig::new(
        "Pressure gauge",
        HandshakeSpec::new("ID?", "PG-1", "R"),
        ChannelSpec::new(9600),
    )
    .with_timing(fast_timing())
    .with_results(vec![ReadResult::new(ResultKind::Pressure)])
}

fn gauge_backend(reading: &str) -> DemoBackend {
    DemoBackend::with_seed(3)
        .with_port("COM1", DemoBehavior::Replies("?".into()))
        .with_port(
            "COM2",
            DemoBehavior::device("ID?", "PG-1", DemoReading::Fixed(reading.into())),
        )
}

fn started_gauge(reading: &str) -> (ScalarDevice, DemoBackend) {
    let backend = gauge_backend(reading);
    let mut gauge = ScalarDevice::new(&gauge_config(), DeviceLink::new(backend.clone(), AlwaysAbort))
        .expect("valid config");
    gauge.start().expect("gauge found");
    (gauge, backend)
}

#[test]
fn test_start_binds_and_initializes() {
    let (gauge, _backend) = started_gauge("1");
    let core = gauge.core();
    assert!(core.is_initialized());
    assert_eq!(core.port().map(|p| p.name()), Some("COM2"));
    assert!(core.secs_to_find_port().is_some());
    assert_eq!(gauge.name(), "Pressure gauge");
}

#[test]
fn test_identifier_settable_only_before_initialization() {
    let backend = gauge_backend("1");
    let mut gauge =
        ScalarDevice::new(&gauge_config(), DeviceLink::new(backend, AlwaysAbort)).unwrap();

    assert!(gauge.core_mut().set_device_id("gauge-a").is_ok());
    assert!(gauge.core_mut().set_device_id("gauge-b").is_ok());
    assert_eq!(gauge.core().device_id(), Some("gauge-b"));

    gauge.start().unwrap();

    let err = gauge.core_mut().set_device_id("gauge-c").unwrap_err();
    assert!(matches!(
        err,
        DeviceError::IdentifierReassignment { current: Some(ref id) } if id == "gauge-b"
    ));
    assert_eq!(gauge.core().device_id(), Some("gauge-b"));
    assert!(gauge.core().is_initialized());
}

#[test]
fn test_failed_start_leaves_device_unusable() {
    let backend = DemoBackend::new().with_port("COM1", DemoBehavior::Silent);
    let mut gauge =
        ScalarDevice::new(&gauge_config(), DeviceLink::new(backend, AlwaysAbort)).unwrap();

    let err = gauge.start().unwrap_err();
    assert!(err.is_port_not_found());
    assert!(!gauge.core().is_initialized());
    assert!(!gauge.core().is_bound());
    assert!(matches!(gauge.read_all(), Err(DeviceError::NotInitialized)));
    assert!(matches!(gauge.kick_off_read(), Err(DeviceError::NotInitialized)));
    // Still uninitialized, so the identifier can change
    assert!(gauge.core_mut().set_device_id("retry-later").is_ok());
}

#[test]
fn test_start_twice_does_not_rescan() {
    let (mut gauge, backend) = started_gauge("1");
    let opens = backend.stats("COM2").opens;
    gauge.start().unwrap();
    assert_eq!(gauge.core().scan_passes(), 1);
    assert_eq!(backend.stats("COM2").opens, opens);
}

#[test]
fn test_kick_off_then_read_ready_data() {
    let (mut gauge, backend) = started_gauge("+101.325 kPa");
    gauge.kick_off_read().unwrap();
    let value = gauge.read_ready_data(&parse::first_number).unwrap();
    assert_eq!(value, 101.325);
    assert_eq!(
        backend.stats("COM2").writes,
        vec!["ID?".to_string(), "R\n".to_string()]
    );
}

#[test]
fn test_read_val_strips_line_terminator() {
    let (mut gauge, _backend) = started_gauge("42.5");
    let value = gauge.read_val(&parse::plain_number).unwrap();
    assert_eq!(value, 42.5);
}

#[test]
fn test_read_val_waits_pre_read_settle() {
    let backend = gauge_backend("3.5");
    let config = gauge_config().with_timing(ScanTiming {
        pre_read_settle_ms: 30,
        ..fast_timing()
    });
    let mut gauge = ScalarDevice::new(&config, DeviceLink::new(backend, AlwaysAbort)).unwrap();
    gauge.start().unwrap();

    let started = Instant::now();
    assert_eq!(gauge.read_val(&parse::plain_number).unwrap(), 3.5);
    assert!(
        started.elapsed() >= Duration::from_millis(30),
        "took {:?}",
        started.elapsed()
    );
}

#[test]
fn test_scalar_with_several_results_rejected() {
    let config = gauge_config().with_results(vec![
        ReadResult::new(ResultKind::Pressure),
        ReadResult::new(ResultKind::Temperature),
    ]);
    let result = ScalarDevice::new(&config, DeviceLink::new(DemoBackend::new(), AlwaysAbort));
    assert!(matches!(result, Err(DeviceError::Config(_))));
}

#[test]
fn test_read_val_with_custom_parser() {
    let (mut gauge, _backend) = started_gauge("0x1F");
    let hex = |word: &str| {
        let digits = word.trim().trim_start_matches("0x");
        i64::from_str_radix(digits, 16)
            .map(|v| v as f64)
            .map_err(|e| DeviceError::parse(word, e.to_string()))
    };
    assert_eq!(gauge.read_val(&hex).unwrap(), 31.0);
}

#[test]
fn test_read_all_sets_template() {
    let (mut gauge, _backend) = started_gauge("P 7.25");
    assert_eq!(gauge.read_all().unwrap(), 7.25);
    assert_eq!(
        gauge.results(),
        &[ReadResult::with_value(7.25, ResultKind::Pressure)]
    );
}

#[test]
fn test_parse_error_surfaces() {
    let (mut gauge, _backend) = started_gauge("ERR");
    assert!(matches!(gauge.read_all(), Err(DeviceError::Parse { .. })));
}

#[test]
fn test_send_val_uses_setpoint_format() {
    let backend = gauge_backend("0");
    let config = gauge_config().with_setpoint_format("SP {value}");
    let mut gauge = ScalarDevice::new(&config, DeviceLink::new(backend.clone(), AlwaysAbort)).unwrap();
    gauge.start().unwrap();

    gauge.send_val(2.5).unwrap();
    assert_eq!(backend.stats("COM2").writes.last().map(String::as_str), Some("SP 2.5\n"));
}

#[test]
fn test_send_val_without_setpoint_is_unsupported() {
    let (mut gauge, _backend) = started_gauge("0");
    assert!(matches!(gauge.send_val(1.0), Err(DeviceError::Unsupported(_))));
}

fn meter_config() -> DeviceConfig {
    DeviceConfig::new(
        "Flow meter",
        HandshakeSpec::new("?", "FM-200", "READ"),
        ChannelSpec::new(19200),
    )
    .with_kind(DeviceKind::MultiField)
    .with_timing(fast_timing())
    .with_results(vec![
        ReadResult::new(ResultKind::Flow),
        ReadResult::new(ResultKind::Temperature).on_axis(AxisType::Secondary),
    ])
}

fn meter_backend(reading: &str) -> DemoBackend {
    DemoBackend::with_seed(5).with_port(
        "/dev/ttyUSB0",
        DemoBehavior::device("?", "FM-200", DemoReading::Fixed(reading.into())).chunked(2),
    )
}

#[test]
fn test_multi_field_populates_every_entry() {
    let mut meter = MultiFieldDevice::new(
        &meter_config(),
        DeviceLink::new(meter_backend("F=0.82 T=22.4"), AlwaysAbort),
    )
    .unwrap();
    meter.start().unwrap();

    assert_eq!(meter.read_all().unwrap(), 0.82);
    assert_eq!(
        meter.results(),
        &[
            ReadResult::with_value(0.82, ResultKind::Flow),
            ReadResult::with_value(22.4, ResultKind::Temperature).on_axis(AxisType::Secondary),
        ]
    );
}

#[test]
fn test_multi_field_short_response_is_parse_error() {
    let mut meter = MultiFieldDevice::new(
        &meter_config(),
        DeviceLink::new(meter_backend("F=0.82"), AlwaysAbort),
    )
    .unwrap();
    meter.start().unwrap();
    assert!(matches!(meter.read_all(), Err(DeviceError::Parse { .. })));
}

#[test]
fn test_multi_field_is_read_only() {
    let mut meter = MultiFieldDevice::new(
        &meter_config(),
        DeviceLink::new(meter_backend("1 2"), AlwaysAbort),
    )
    .unwrap();
    meter.start().unwrap();
    assert!(matches!(meter.send_val(3.0), Err(DeviceError::Unsupported(_))));
}

#[test]
fn test_round_robin_over_heterogeneous_devices() {
    let gauge_ports = gauge_backend("3.5");
    let meter_ports = meter_backend("1.5,20.0");
    let mut devices: Vec<Box<dyn MeasurementDevice>> = vec![
        device::from_config(&gauge_config(), DeviceLink::new(gauge_ports, AlwaysAbort)).unwrap(),
        device::from_config(&meter_config(), DeviceLink::new(meter_ports, AlwaysAbort)).unwrap(),
    ];

    for d in devices.iter_mut() {
        d.start().unwrap();
    }
    for d in devices.iter_mut() {
        d.kick_off_read().unwrap();
    }
    let primary: Vec<f64> = devices
        .iter_mut()
        .map(|d| d.collect_ready().unwrap())
        .collect();

    assert_eq!(primary, vec![3.5, 1.5]);
    assert_eq!(devices[1].results()[1].value, 20.0);
}

#[test]
fn test_retry_confirmation_wired_through_device() {
    let backend = DemoBackend::new().with_port("COM1", DemoBehavior::Silent);
    let asked = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&asked);
    let plug = backend.clone();
    let confirm = move |_: &str| {
        counter.fetch_add(1, Ordering::SeqCst);
        plug.add_port("COM9", DemoBehavior::device("ID?", "PG-1", DemoReading::Fixed("1".into())));
        ScanDecision::Retry
    };

    let mut gauge = ScalarDevice::new(&gauge_config(), DeviceLink::new(backend, confirm)).unwrap();
    gauge.start().unwrap();

    assert_eq!(asked.load(Ordering::SeqCst), 1);
    assert_eq!(gauge.core().scan_passes(), 2);
    assert_eq!(gauge.core().port().map(|p| p.name()), Some("COM9"));
}

#[test]
fn test_invalid_config_rejected_at_construction() {
    let mut config = gauge_config();
    config.channel.baud_rate = 0;
    let result = ScalarDevice::new(&config, DeviceLink::new(DemoBackend::new(), AlwaysAbort));
    assert!(matches!(result, Err(DeviceError::Config(_))));
}
