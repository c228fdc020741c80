//! Reader binary - polls capacitive sensors over a serial link
//!
//! Usage:
//!   cargo run --bin reader -- --list-ports
//!   cargo run --bin reader -- --port /dev/ttyACM0 -s 0 -s 1
//!   cargo run --bin reader -- --config reader.toml --json
//!   cargo run --bin reader -- --emulate --seed 7 -s 0

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use tact_rs::common::{setup_shutdown, ReaderArgs, SessionMetrics, ShutdownReceiver};
use tact_rs::config::Config;
use tact_rs::data_source_emulator::EmulatedPeripheral;
use tact_rs::reader::decoder::Command;
use tact_rs::reader::transport::{list_ports, SerialTransport, Transport};
use tact_rs::reader::Session;
use tact_rs::sensor::{SensorConfig, SensorState};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Interval between rate reports
const REPORT_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so --json output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tact_rs=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = ReaderArgs::parse();

    if args.list_ports {
        for (i, name) in list_ports()?.iter().enumerate() {
            println!("[{}] {}", i, name);
        }
        return Ok(());
    }

    let mut config = match &args.config_file {
        Some(path) => {
            Config::load(path).with_context(|| format!("Failed to load config {}", path))?
        }
        None => Config::default(),
    };

    // Command line overrides file
    if let Some(port) = &args.port {
        config.session.port = Some(port.clone());
        config.session.port_index = None;
    }
    if let Some(index) = args.port_index {
        config.session.port = None;
        config.session.port_index = Some(index);
    }
    if config.sensors.is_empty() {
        config.sensors = args.sensors.iter().map(|&pin| SensorConfig::new(pin)).collect();
    }
    config.validate()?;

    let registry = config.build_registry()?.into_shared();
    let session_config = config.session_config();
    info!(
        sensors = ?registry.lock().pins(),
        protocol = %config.session.protocol,
        emulate = args.emulate,
        "Reader configured"
    );

    let (_shutdown_tx, shutdown_rx) = setup_shutdown();

    if args.emulate {
        let peripheral = EmulatedPeripheral::new(config.emulator_config(args.seed))?;
        let session = Session::new(session_config, peripheral, registry);
        run_session(session, args.json, shutdown_rx).await
    } else {
        let baud_rate = config.session.baud_rate;
        let read_timeout = config.session.read_timeout();
        let transport = match &config.session.port {
            Some(path) => SerialTransport::open(path, baud_rate, read_timeout)?,
            None => SerialTransport::open_index(
                config.session.port_index.unwrap_or(0),
                baud_rate,
                read_timeout,
            )?,
        };
        let session = Session::new(session_config, transport, registry);
        run_session(session, args.json, shutdown_rx).await
    }
}

async fn run_session<T: Transport + 'static>(
    session: Session<T>,
    json: bool,
    shutdown: ShutdownReceiver,
) -> anyhow::Result<()> {
    let session = if json {
        session.with_listener(|sensor: &SensorState, _command: Command| {
            match serde_json::to_string(&sensor.snapshot()) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!(error = %e, "Failed to serialize sensor snapshot"),
            }
        })
    } else {
        session.with_listener(|sensor: &SensorState, command: Command| {
            debug!(
                sensor = %sensor.label(),
                %command,
                bias = sensor.bias(),
                peak = sensor.peak(),
                "Measurement"
            );
        })
    };

    let reporter = tokio::spawn(report_rates(
        session.metrics().clone(),
        shutdown.resubscribe(),
    ));

    let result = session.run(shutdown).await;
    reporter.abort();

    let snapshot = result?;
    info!(
        measurements = snapshot.measurements,
        dropped = snapshot.dropped,
        unknown_words = snapshot.unknown_words,
        total_bytes = snapshot.bytes_read,
        "Reader stopped"
    );
    Ok(())
}

/// Log throughput every [`REPORT_INTERVAL`]
async fn report_rates(metrics: Arc<SessionMetrics>, mut shutdown: ShutdownReceiver) {
    let mut interval = tokio::time::interval(REPORT_INTERVAL);
    interval.tick().await;
    let mut prev = metrics.snapshot();
    let mut last = Instant::now();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let current = metrics.snapshot();
                let rate = current.rate_from(&prev, last.elapsed().as_secs_f64());
                info!(
                    bytes = %rate.format_bytes_rate(),
                    measurements_per_sec = rate.measurement_rate,
                    polls_per_sec = rate.poll_rate,
                    dropped = current.dropped,
                    "Throughput"
                );
                prev = current;
                last = Instant::now();
            }
            _ = shutdown.recv() => break,
        }
    }
}
