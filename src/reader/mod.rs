//! Reader - polls the peripheral and feeds sensor state
//!
//! A [`Session`] owns one transport and one [`StreamDecoder`]. It sends the
//! handshake request, waits for the version tag, then polls every registered
//! sensor in turn. Completed measurements are applied to the shared
//! [`SensorRegistry`](crate::sensor::SensorRegistry) and reported to an
//! optional [`SensorListener`].
//!
//! The polling loop is blocking; [`Session::run`] moves it onto
//! `spawn_blocking` and stops it from a broadcast shutdown receiver.

pub mod decoder;
pub mod transport;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::common::{Clock, MetricsSnapshot, SessionMetrics, SessionState, SystemClock};
use crate::sensor::{SensorState, SharedRegistry};
use decoder::{Command, ProtocolEvent, ProtocolProfile, StreamDecoder};
use transport::{Transport, TransportError};

/// Handshake request line
pub const HANDSHAKE_REQUEST: &[u8] = b"V\n";

/// Shortest pause between reads while waiting for the version tag
const HANDSHAKE_MIN_PAUSE: Duration = Duration::from_millis(1);

/// Session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Sensor is not responding after {timeout_ms} ms, check that the firmware is flashed and the port is correct")]
    HandshakeTimeout { timeout_ms: u64 },

    #[error("No sensors registered, add at least one before starting")]
    NoSensors,

    #[error("Invalid session state: {0}")]
    InvalidState(SessionState),

    #[error("Stopped before the handshake completed")]
    Cancelled,

    #[error("Polling task failed: {0}")]
    Join(String),
}

/// Runtime session parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    pub profile: ProtocolProfile,
    /// Maximum wait for the version tag
    pub handshake_timeout: Duration,
    /// Pause after each sensor poll
    pub rest_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            profile: ProtocolProfile::STANDARD,
            handshake_timeout: Duration::from_millis(2000),
            rest_interval: Duration::from_millis(2),
        }
    }
}

/// Receives session events
///
/// Called on the polling thread while the registry lock is held; keep the
/// bodies short and do not lock the registry from inside.
pub trait SensorListener: Send {
    fn on_handshake(&mut self, _version: u16) {}

    /// A measurement was applied to `sensor`
    fn on_measurement(&mut self, sensor: &SensorState, command: Command);

    fn on_unknown_word(&mut self, _word: u16) {}
}

impl<F> SensorListener for F
where
    F: FnMut(&SensorState, Command) + Send,
{
    fn on_measurement(&mut self, sensor: &SensorState, command: Command) {
        self(sensor, command)
    }
}

/// Cloneable handle that stops a running session from another thread
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Polling session over one transport
pub struct Session<T: Transport> {
    config: SessionConfig,
    transport: Option<T>,
    decoder: StreamDecoder,
    registry: SharedRegistry,
    clock: Arc<dyn Clock>,
    listener: Option<Box<dyn SensorListener>>,
    metrics: Arc<SessionMetrics>,
    state: SessionState,
    stop: Arc<AtomicBool>,
    version: Option<u16>,
}

impl<T: Transport> Session<T> {
    pub fn new(config: SessionConfig, transport: T, registry: SharedRegistry) -> Self {
        Self {
            decoder: StreamDecoder::new(config.profile),
            config,
            transport: Some(transport),
            registry,
            clock: Arc::new(SystemClock),
            listener: None,
            metrics: Arc::new(SessionMetrics::new()),
            state: SessionState::Idle,
            stop: Arc::new(AtomicBool::new(false)),
            version: None,
        }
    }

    /// Replace the wall clock used to timestamp spectra
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_listener(mut self, listener: impl SensorListener + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Firmware version reported by the last handshake
    pub fn version(&self) -> Option<u16> {
        self.version
    }

    pub fn is_handshaken(&self) -> bool {
        self.decoder.is_handshaken()
    }

    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<SessionMetrics> {
        &self.metrics
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.stop.clone())
    }

    fn transition(&mut self, to: SessionState) {
        if self.state != to {
            debug_assert!(
                self.state.can_transition_to(to),
                "invalid transition {} -> {}",
                self.state,
                to
            );
            info!(from = %self.state, to = %to, "State transition");
            self.state = to;
        }
    }

    /// Drop the transport and enter `Stopped`
    fn release(&mut self) {
        if self.transport.take().is_some() {
            debug!("Transport released");
        }
        self.transition(SessionState::Stopped);
    }

    /// Send the handshake request and wait for the version tag
    ///
    /// On timeout or transport failure the transport is released; use
    /// [`Session::restart`] with a fresh one.
    pub fn start(&mut self) -> Result<u16, SessionError> {
        if self.state.is_active() {
            return Err(SessionError::InvalidState(self.state));
        }
        if self.transport.is_none() {
            return Err(TransportError::Closed.into());
        }
        if self.registry.lock().is_empty() {
            warn!("No sensors registered, refusing to start");
            self.release();
            return Err(SessionError::NoSensors);
        }

        self.decoder.reset();
        self.version = None;

        if let Err(e) = self.send_handshake() {
            self.release();
            return Err(e);
        }
        self.transition(SessionState::AwaitingHandshake);

        let timeout = self.config.handshake_timeout;
        let deadline = Instant::now() + timeout;
        loop {
            if let Err(e) = self.receive() {
                self.release();
                return Err(e);
            }
            if let Some(version) = self.version {
                self.transition(SessionState::Running);
                return Ok(version);
            }
            if self.stop.load(Ordering::Relaxed) {
                self.release();
                return Err(SessionError::Cancelled);
            }
            if Instant::now() >= deadline {
                let timeout_ms = timeout.as_millis() as u64;
                warn!(timeout_ms, "Handshake timed out");
                self.release();
                return Err(SessionError::HandshakeTimeout { timeout_ms });
            }
            let pause = self.config.rest_interval.max(HANDSHAKE_MIN_PAUSE);
            std::thread::sleep(pause.min(deadline.saturating_duration_since(Instant::now())));
        }
    }

    fn send_handshake(&mut self) -> Result<(), SessionError> {
        let transport = self.transport.as_mut().ok_or(TransportError::Closed)?;
        transport.clear()?;
        transport.write(HANDSHAKE_REQUEST)?;
        debug!("Handshake request sent");
        Ok(())
    }

    /// Attach a fresh transport and handshake again
    pub fn restart(&mut self, transport: T) -> Result<u16, SessionError> {
        if self.state.is_active() {
            self.release();
        }
        self.transport = Some(transport);
        self.stop.store(false, Ordering::Relaxed);
        info!("Session restarting");
        self.start()
    }

    /// Release the transport; the session can only be resumed with
    /// [`Session::restart`]
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        self.release();
    }

    /// Poll every registered sensor once
    ///
    /// The stop flag is checked before each sensor.
    pub fn poll_once(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Running {
            return Err(SessionError::InvalidState(self.state));
        }

        // Build requests up front so the lock is not held across I/O
        let requests: Vec<(u16, String)> = self
            .registry
            .lock()
            .iter()
            .map(|s| (s.id(), s.poll_request()))
            .collect();

        if requests.is_empty() {
            self.receive()?;
            self.rest();
            return Ok(());
        }

        for (pin, request) in requests {
            if self.stop.load(Ordering::Relaxed) {
                break;
            }
            let transport = self.transport.as_mut().ok_or(TransportError::Closed)?;
            transport.write(request.as_bytes())?;
            self.metrics.inc_polls();
            trace!(pin, request = request.trim_end(), "Poll request sent");

            self.receive()?;
            self.rest();
        }
        Ok(())
    }

    /// Drain the transport through the decoder
    ///
    /// Returns the number of bytes consumed.
    pub fn receive(&mut self) -> Result<usize, SessionError> {
        let transport = self.transport.as_mut().ok_or(TransportError::Closed)?;

        let words_before = self.decoder.words_decoded();
        let mut events = Vec::new();
        let mut consumed = 0usize;
        // Events decoded before a transport failure are still dispatched
        let drained = loop {
            match transport.available() {
                Ok(0) => break Ok(()),
                Ok(_) => {}
                Err(e) => break Err(e),
            }
            match transport.read_byte() {
                Ok(byte) => {
                    consumed += 1;
                    if let Some(event) = self.decoder.feed(byte) {
                        events.push(event);
                    }
                }
                Err(e) => break Err(e),
            }
        };

        if consumed > 0 {
            self.metrics.add_bytes(consumed as u64);
            self.metrics
                .add_words(self.decoder.words_decoded() - words_before);
        }
        for event in events {
            self.handle_event(event);
        }
        drained?;
        Ok(consumed)
    }

    fn handle_event(&mut self, event: ProtocolEvent) {
        match event {
            ProtocolEvent::HandshakeComplete { version } => {
                self.version = Some(version);
                if let Some(listener) = self.listener.as_mut() {
                    listener.on_handshake(version);
                }
            }
            ProtocolEvent::MeasurementReady(measurement) => {
                let now = self.clock.now();
                let mut registry = self.registry.lock();
                match registry.apply_measurement(&measurement, now) {
                    Ok(pin) => {
                        self.metrics.inc_measurements();
                        if let (Some(listener), Some(sensor), Some(command)) =
                            (self.listener.as_mut(), registry.get(pin), measurement.command)
                        {
                            listener.on_measurement(sensor, command);
                        }
                    }
                    Err(e) => {
                        self.metrics.inc_dropped();
                        warn!(error = %e, "Dropping measurement");
                    }
                }
            }
            ProtocolEvent::UnknownWord { word } => {
                self.metrics.inc_unknown_words();
                if let Some(listener) = self.listener.as_mut() {
                    listener.on_unknown_word(word);
                }
            }
        }
    }

    fn rest(&self) {
        if !self.config.rest_interval.is_zero() {
            std::thread::sleep(self.config.rest_interval);
        }
    }

    /// Handshake, then poll until stopped
    ///
    /// The transport is released on return. Returns the final counters.
    pub fn run_blocking(&mut self) -> Result<MetricsSnapshot, SessionError> {
        let version = self.start()?;
        info!(version, "Handshake complete, polling sensors");

        while !self.stop.load(Ordering::Relaxed) {
            if let Err(e) = self.poll_once() {
                warn!(error = %e, "Polling failed");
                self.release();
                return Err(e);
            }
        }

        self.release();
        let snapshot = self.metrics.snapshot();
        info!(
            measurements = snapshot.measurements,
            dropped = snapshot.dropped,
            total_bytes = snapshot.bytes_read,
            polls = snapshot.polls,
            "Session stopped"
        );
        Ok(snapshot)
    }
}

impl<T: Transport + 'static> Session<T> {
    /// Run the polling loop on the blocking pool until `shutdown` fires
    pub async fn run(
        mut self,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<MetricsSnapshot, SessionError> {
        let stop = self.stop_handle();
        let mut handle = tokio::task::spawn_blocking(move || self.run_blocking());

        tokio::select! {
            result = &mut handle => {
                return result.map_err(|e| SessionError::Join(e.to_string()))?;
            }
            _ = shutdown.recv() => {
                info!("Session received shutdown signal");
                stop.stop();
            }
        }

        handle
            .await
            .map_err(|e| SessionError::Join(e.to_string()))?
    }
}
