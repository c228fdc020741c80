//! Emulated peripheral - answers poll requests with synthetic data
//!
//! Implements [`Transport`] in-process: request lines written by the session
//! are parsed and answered with tagged words, exactly as the firmware would
//! send them (low byte first). Spectra are a drifting Gaussian bump with
//! normally distributed noise.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::reader::decoder::{Command, ProtocolProfile};
use crate::reader::transport::{Transport, TransportError};

/// Emulator configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Wire format to speak (taken from the session, not the file)
    #[serde(skip)]
    pub profile: ProtocolProfile,
    /// Version reported in the handshake
    pub firmware_version: u16,
    /// RNG seed (same seed -> same byte stream)
    pub seed: u64,
    /// Never answer anything (simulates a missing/unflashed device)
    pub silent: bool,
    /// Random words sent before the version tag
    pub handshake_noise: usize,
    /// Append an unknown word after every N-th response (0 = never)
    pub unknown_word_every: u64,
    /// Standard deviation of the additive amplitude noise
    pub noise_sigma: f64,
    /// Height of the bump (0..1023)
    pub peak_amplitude: f64,
    /// Width (sigma) of the bump in samples
    pub bump_width: f64,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            profile: ProtocolProfile::STANDARD,
            firmware_version: 1,
            seed: 0,
            silent: false,
            handshake_noise: 0,
            unknown_word_every: 0,
            noise_sigma: 4.0,
            peak_amplitude: 700.0,
            bump_width: 3.0,
        }
    }
}

/// Emulator errors
#[derive(Error, Debug)]
pub enum EmulatorError {
    #[error("Invalid noise distribution: {0}")]
    Noise(#[from] rand_distr::NormalError),

    #[error("Firmware version {version} does not fit the handshake word (max {max})")]
    FirmwareVersionOutOfRange { version: u16, max: u16 },
}

/// Parsed poll request line: `"{c} {pin} {start} {readings} {step}"`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollRequest {
    pub command: Command,
    pub pin: u16,
    pub start: u32,
    pub readings: u32,
    pub step: u32,
}

impl PollRequest {
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let mut tag = parts.next()?.chars();
        let command = Command::from_request_char(tag.next()?)?;
        if tag.next().is_some() {
            return None;
        }
        let pin = parts.next()?.parse().ok()?;
        let start = parts.next()?.parse().ok()?;
        let readings = parts.next()?.parse().ok()?;
        let step = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            command,
            pin,
            start,
            readings,
            step,
        })
    }
}

/// In-process stand-in for the sensing peripheral
pub struct EmulatedPeripheral {
    config: EmulatorConfig,
    rng: StdRng,
    noise: Normal<f64>,
    line: Vec<u8>,
    outbox: VecDeque<u8>,
    handshaken: bool,
    phase: f64,
    responses: u64,
}

impl EmulatedPeripheral {
    pub fn new(config: EmulatorConfig) -> Result<Self, EmulatorError> {
        let max = config.profile.max_version();
        if config.firmware_version > max {
            return Err(EmulatorError::FirmwareVersionOutOfRange {
                version: config.firmware_version,
                max,
            });
        }
        let noise = Normal::new(0.0, config.noise_sigma)?;
        info!(
            version = config.firmware_version,
            seed = config.seed,
            silent = config.silent,
            "Emulated peripheral created"
        );
        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            noise,
            config,
            line: Vec::new(),
            outbox: VecDeque::new(),
            handshaken: false,
            phase: 0.0,
            responses: 0,
        })
    }

    /// Number of poll requests answered
    pub fn responses(&self) -> u64 {
        self.responses
    }

    pub fn is_handshaken(&self) -> bool {
        self.handshaken
    }

    /// Bytes queued for the host
    pub fn pending_bytes(&self) -> usize {
        self.outbox.len()
    }

    fn push_word(&mut self, word: u16) {
        self.outbox.extend(word.to_le_bytes());
    }

    fn handle_line(&mut self, line: &str) {
        if self.config.silent {
            return;
        }

        if line == "V" {
            let p = self.config.profile;
            for _ in 0..self.config.handshake_noise {
                let word = self.rng.gen_range(0..p.version_tag);
                self.push_word(word);
            }
            // Range checked in new()
            if let Some(word) = p.version_word(self.config.firmware_version) {
                self.push_word(word);
            }
            self.handshaken = true;
            debug!("Emulator answered handshake");
            return;
        }

        match PollRequest::parse(line) {
            Some(request) => self.respond(request),
            None => debug!(line, "Emulator ignoring malformed request"),
        }
    }

    fn respond(&mut self, request: PollRequest) {
        let p = self.config.profile;
        let (Some(index_word), Some(command_word)) = (
            p.sensor_index_word(request.pin),
            p.command_word(request.command),
        ) else {
            debug!(
                pin = request.pin,
                command = %request.command,
                "Emulator ignoring request it cannot frame"
            );
            return;
        };
        let readings = request.readings.min(p.value_count_limit as u32).max(1) as u16;

        // Bump centre drifts across the window
        let centre = (0.5 + 0.35 * self.phase.sin()) * (readings as f64 - 1.0);
        self.phase += 0.3;

        let values: Vec<u16> = match request.command {
            Command::Spectrum => (0..readings)
                .map(|i| {
                    let d = i as f64 - centre;
                    let w = self.config.bump_width.max(f64::EPSILON);
                    let v = self.config.peak_amplitude * (-(d * d) / (2.0 * w * w)).exp();
                    self.sample(v)
                })
                .collect(),
            Command::Bias => vec![centre.round() as u16],
            Command::Peak => vec![self.sample(self.config.peak_amplitude)],
            Command::BiasAndPeak => {
                let peak = self.sample(self.config.peak_amplitude);
                vec![centre.round() as u16, peak]
            }
            Command::Unknown(_) => return,
        };

        self.push_word(index_word);
        self.push_word(command_word);
        self.push_word(p.value_count_word(values.len() as u16));
        for v in values {
            self.push_word(v);
        }
        self.push_word(p.end_of_transmission_tag);

        self.responses += 1;
        let every = self.config.unknown_word_every;
        if every > 0 && self.responses % every == 0 {
            self.push_word(u16::MAX);
        }
    }

    /// Add noise and clamp into the plain-value range
    fn sample(&mut self, clean: f64) -> u16 {
        let max = (self.config.profile.value_limit - 1) as f64;
        let noisy = clean + self.noise.sample(&mut self.rng);
        noisy.round().clamp(0.0, max) as u16
    }
}

impl Transport for EmulatedPeripheral {
    fn available(&mut self) -> Result<usize, TransportError> {
        Ok(self.outbox.len())
    }

    fn read_byte(&mut self) -> Result<u8, TransportError> {
        self.outbox.pop_front().ok_or(TransportError::NoData)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        for &b in bytes {
            if b == b'\n' {
                let line = String::from_utf8_lossy(&self.line).trim().to_string();
                self.line.clear();
                self.handle_line(&line);
            } else {
                self.line.push(b);
            }
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<(), TransportError> {
        self.outbox.clear();
        self.line.clear();
        Ok(())
    }
}
