//! E2E tests for a configured session against the emulated peripheral

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tact_rs::common::{shutdown_channel, ManualClock, SessionState};
use tact_rs::config::Config;
use tact_rs::data_source_emulator::EmulatedPeripheral;
use tact_rs::reader::decoder::Command;
use tact_rs::reader::{Session, SessionError};
use tact_rs::sensor::{SensorMode, SensorState};

const CONFIG: &str = r#"
[session]
handshake_timeout_ms = 100
rest_interval_ms = 0
protocol = "simplified"

[[sensors]]
pin = 0
name = "thumb"
start = 0
readings = 24

[[sensors]]
pin = 7
mode = "bias_and_peak"

[emulator]
firmware_version = 12
handshake_noise = 16
noise_sigma = 2.0
"#;

fn build(config: &Config, seed: u64) -> Session<EmulatedPeripheral> {
    let peripheral = EmulatedPeripheral::new(config.emulator_config(Some(seed))).unwrap();
    let registry = config.build_registry().unwrap().into_shared();
    Session::new(config.session_config(), peripheral, registry)
}

#[test]
fn test_configured_session_polls_every_sensor() {
    let config = Config::from_toml(CONFIG).unwrap();
    let clock = Arc::new(ManualClock::new(0));
    let mut session = build(&config, 3).with_clock(clock.clone());

    assert_eq!(session.start().unwrap(), 12);
    for _ in 0..10 {
        clock.advance(5);
        session.poll_once().unwrap();
    }

    let registry = session.registry().lock();
    let thumb = registry.get(0).unwrap();
    assert_eq!(thumb.label(), "thumb");
    assert_eq!(thumb.received_count(), 10);
    assert_eq!(thumb.latest_spectrum().len(), 24);
    assert_eq!(thumb.latest_spectrum().time(), 50);
    // Moving average over the last 8 polls (times 15..=50)
    assert_eq!(thumb.moving_average().time(), 32);
    assert_eq!(thumb.bins(8).unwrap().len(), 8);

    let scalar = registry.get(7).unwrap();
    assert_eq!(scalar.mode(), SensorMode::BiasAndPeak);
    assert_eq!(scalar.received_count(), 0);
    assert!(scalar.peak_min() <= scalar.peak() && scalar.peak() <= scalar.peak_max());
    assert!(scalar.bias_min() <= scalar.bias() && scalar.bias() <= scalar.bias_max());

    let m = session.metrics().snapshot();
    assert_eq!(m.polls, 20);
    assert_eq!(m.measurements, 20);
    assert_eq!(m.dropped, 0);
    assert_eq!(m.unknown_words, 0);
}

#[test]
fn test_protocol_mismatch_times_out() {
    let config = Config::from_toml(CONFIG).unwrap();
    // Peripheral speaks the standard revision, session expects simplified
    let mut emulator = config.emulator_config(Some(0));
    emulator.profile = tact_rs::reader::decoder::ProtocolProfile::STANDARD;
    let peripheral = EmulatedPeripheral::new(emulator).unwrap();
    let registry = config.build_registry().unwrap().into_shared();
    let mut session = Session::new(config.session_config(), peripheral, registry);

    // Standard version word 2136 is below the simplified version tag
    let err = session.start().unwrap_err();
    assert!(matches!(err, SessionError::HandshakeTimeout { timeout_ms: 100 }));
    assert_eq!(session.state(), SessionState::Stopped);
}

#[test]
fn test_geometry_change_mid_session_resets_sensor() {
    let config = Config::from_toml(CONFIG).unwrap();
    let mut session = build(&config, 11);
    session.start().unwrap();
    session.poll_once().unwrap();
    assert_eq!(session.registry().lock().get(0).unwrap().received_count(), 1);

    session
        .registry()
        .lock()
        .get_mut(0)
        .unwrap()
        .set_readings(48)
        .unwrap();
    assert_eq!(session.registry().lock().get(0).unwrap().received_count(), 0);

    session.poll_once().unwrap();
    let registry = session.registry().lock();
    let thumb = registry.get(0).unwrap();
    assert_eq!(thumb.received_count(), 1);
    assert_eq!(thumb.latest_spectrum().len(), 48);
}

#[tokio::test]
async fn test_run_with_listener_until_shutdown() {
    let config = Config::from_toml(CONFIG).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let session = build(&config, 5).with_listener(move |sensor: &SensorState, command: Command| {
        sink.lock().push((sensor.id(), command));
    });
    let registry = session.registry().clone();
    let (tx, rx) = shutdown_channel();

    let task = tokio::spawn(session.run(rx));
    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(()).unwrap();
    let snapshot = task.await.unwrap().unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len() as u64, snapshot.measurements);
    assert!(seen.contains(&(0, Command::Spectrum)));
    assert!(seen.contains(&(7, Command::BiasAndPeak)));
    assert!(registry.lock().get(0).unwrap().received_count() > 0);
}
