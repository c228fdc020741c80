//! Per-sensor history and statistics
//!
//! This module provides:
//! - Spectrum value object and its derived views (spectrum)
//! - Fixed-capacity circular history (history)
//! - SensorState: spectrum buffer, bias/peak histories, running bounds
//! - SensorRegistry: pin -> SensorState lookup and measurement dispatch

pub mod history;
pub mod registry;
pub mod spectrum;

pub use history::History;
pub use registry::{DispatchError, SensorRegistry, SharedRegistry};
pub use spectrum::{Spectrum, SpectrumError, AMPLITUDE_MAX};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::reader::decoder::Command;

/// Capacity of the bias and peak histories
pub const HISTORY_CAPACITY: usize = 1024;

pub const DEFAULT_SPECTRUM_BUFFER_SIZE: usize = 8;
pub const DEFAULT_SPECTRUM_READINGS: u32 = 32;
pub const DEFAULT_SPECTRUM_START: u32 = 32;
pub const DEFAULT_SPECTRUM_STEP: u32 = 1;

/// Sensor errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SensorError {
    #[error("Sensor {field} must be at least 1")]
    ZeroGeometry { field: &'static str },
}

/// What a sensor is polled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorMode {
    #[default]
    Spectrum,
    Bias,
    Peak,
    BiasAndPeak,
}

impl SensorMode {
    /// Wire command requested for this mode
    pub fn command(self) -> Command {
        match self {
            SensorMode::Spectrum => Command::Spectrum,
            SensorMode::Bias => Command::Bias,
            SensorMode::Peak => Command::Peak,
            SensorMode::BiasAndPeak => Command::BiasAndPeak,
        }
    }

    pub fn has_bias(self) -> bool {
        self != SensorMode::Peak
    }

    pub fn has_peak(self) -> bool {
        self != SensorMode::Bias
    }

    pub fn has_spectrum(self) -> bool {
        self == SensorMode::Spectrum
    }

    /// First character of the poll request line
    pub fn request_char(self) -> char {
        match self {
            SensorMode::Spectrum => 's',
            SensorMode::Bias => 'b',
            SensorMode::Peak => 'p',
            SensorMode::BiasAndPeak => 'x',
        }
    }
}

impl std::fmt::Display for SensorMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorMode::Spectrum => write!(f, "spectrum"),
            SensorMode::Bias => write!(f, "bias"),
            SensorMode::Peak => write!(f, "peak"),
            SensorMode::BiasAndPeak => write!(f, "bias and peak"),
        }
    }
}

/// Sensor registration parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Pin / sensor index addressed on the wire
    pub pin: u16,
    /// Optional human-readable label
    #[serde(default)]
    pub name: Option<String>,
    /// First address of the reading window
    #[serde(default = "default_start")]
    pub start: u32,
    /// Number of requested samples
    #[serde(default = "default_readings")]
    pub readings: u32,
    /// Stride between samples
    #[serde(default = "default_step")]
    pub step: u32,
    #[serde(default)]
    pub mode: SensorMode,
    /// Number of spectra kept for moving averages
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

fn default_start() -> u32 {
    DEFAULT_SPECTRUM_START
}

fn default_readings() -> u32 {
    DEFAULT_SPECTRUM_READINGS
}

fn default_step() -> u32 {
    DEFAULT_SPECTRUM_STEP
}

fn default_buffer_size() -> usize {
    DEFAULT_SPECTRUM_BUFFER_SIZE
}

impl SensorConfig {
    /// Default geometry for `pin`
    pub fn new(pin: u16) -> Self {
        Self {
            pin,
            name: None,
            start: DEFAULT_SPECTRUM_START,
            readings: DEFAULT_SPECTRUM_READINGS,
            step: DEFAULT_SPECTRUM_STEP,
            mode: SensorMode::default(),
            buffer_size: DEFAULT_SPECTRUM_BUFFER_SIZE,
        }
    }

    pub fn with_window(mut self, start: u32, readings: u32, step: u32) -> Self {
        self.start = start;
        self.readings = readings;
        self.step = step;
        self
    }

    pub fn with_mode(mut self, mode: SensorMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Reject zero readings, step or buffer size
    pub fn validate(&self) -> Result<(), SensorError> {
        if self.readings == 0 {
            return Err(SensorError::ZeroGeometry { field: "readings" });
        }
        if self.step == 0 {
            return Err(SensorError::ZeroGeometry { field: "step" });
        }
        if self.buffer_size == 0 {
            return Err(SensorError::ZeroGeometry {
                field: "buffer_size",
            });
        }
        Ok(())
    }
}

/// History and running statistics of one sensor
#[derive(Debug, Clone)]
pub struct SensorState {
    id: u16,
    name: Option<String>,
    start: u32,
    readings: u32,
    step: u32,
    mode: SensorMode,
    buffer: History<Spectrum>,
    bias_history: History<f32>,
    peak_history: History<f32>,
    bias_min: f32,
    bias_max: f32,
    peak_min: f32,
    peak_max: f32,
    received_count: u64,
}

impl SensorState {
    /// Create a sensor with a placeholder-filled buffer
    pub fn new(config: SensorConfig) -> Result<Self, SensorError> {
        config.validate()?;

        let placeholder = Spectrum::zeroed(0, config.start, config.readings as usize, config.step);
        Ok(Self {
            id: config.pin,
            name: config.name,
            start: config.start,
            readings: config.readings,
            step: config.step,
            mode: config.mode,
            buffer: History::filled(config.buffer_size, placeholder),
            bias_history: History::filled(HISTORY_CAPACITY, 0.0),
            peak_history: History::filled(HISTORY_CAPACITY, 0.0),
            bias_min: f32::INFINITY,
            bias_max: f32::NEG_INFINITY,
            peak_min: f32::INFINITY,
            peak_max: f32::NEG_INFINITY,
            received_count: 0,
        })
    }

    /// Append a spectrum and its derived bias/peak
    pub fn push(&mut self, spectrum: Spectrum) {
        let bias = spectrum.bias();
        let peak = spectrum.peak();
        self.buffer.push(spectrum);
        self.push_bias(bias);
        self.push_peak(peak);
        self.received_count += 1;
    }

    pub fn push_bias(&mut self, bias: f32) {
        self.bias_history.push(bias);
        if bias > self.bias_max {
            self.bias_max = bias;
        }
        if bias < self.bias_min {
            self.bias_min = bias;
        }
    }

    pub fn push_peak(&mut self, peak: f32) {
        self.peak_history.push(peak);
        if peak > self.peak_max {
            self.peak_max = peak;
        }
        if peak < self.peak_min {
            self.peak_min = peak;
        }
    }

    /// Element-wise mean over the populated buffer slots
    ///
    /// Only the last `min(received_count, capacity)` spectra count. With no
    /// pushes yet the result is a zero-filled spectrum at time 0.
    pub fn moving_average(&self) -> Spectrum {
        let newest = self.buffer.newest();
        let included = (self.received_count.min(self.buffer.capacity() as u64)) as usize;
        if included == 0 {
            return Spectrum::zeroed(0, newest.start(), newest.len(), newest.step());
        }

        let len = newest.len();
        let mut sums = vec![0.0f32; len];
        let mut counts = vec![0u32; len];
        let mut time: i128 = 0;

        for spectrum in self.buffer.newest_n(included) {
            time += spectrum.time() as i128;
            for (j, &v) in spectrum.values().iter().take(len).enumerate() {
                sums[j] += v;
                counts[j] += 1;
            }
        }

        let values = sums
            .into_iter()
            .zip(counts)
            .map(|(sum, count)| if count > 0 { sum / count as f32 } else { 0.0 })
            .collect();

        Spectrum::from_parts(
            (time / included as i128) as i64,
            values,
            newest.start(),
            newest.step(),
        )
    }

    /// Clear histories, bounds, buffer and counter
    pub fn reset(&mut self) {
        self.reset_bias();
        self.reset_peak();
        self.bias_history.fill(0.0);
        self.peak_history.fill(0.0);
        self.buffer.fill(Spectrum::zeroed(
            0,
            self.start,
            self.readings as usize,
            self.step,
        ));
        self.received_count = 0;
        debug!(pin = self.id, "Sensor reset");
    }

    /// Forget the recorded bias bounds
    pub fn reset_bias(&mut self) {
        self.bias_min = f32::INFINITY;
        self.bias_max = f32::NEG_INFINITY;
    }

    /// Forget the recorded peak bounds
    pub fn reset_peak(&mut self) {
        self.peak_min = f32::INFINITY;
        self.peak_max = f32::NEG_INFINITY;
    }

    /// Request line polling this sensor: `"{c} {pin} {start} {readings} {step}\n"`
    pub fn poll_request(&self) -> String {
        format!(
            "{} {} {} {} {}\n",
            self.mode.request_char(),
            self.id,
            self.start,
            self.readings,
            self.step
        )
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Display label: name if set, else the pin
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("pin {}", self.id),
        }
    }

    pub fn mode(&self) -> SensorMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: SensorMode) {
        self.mode = mode;
    }

    pub fn has_bias(&self) -> bool {
        self.mode.has_bias()
    }

    pub fn has_peak(&self) -> bool {
        self.mode.has_peak()
    }

    pub fn has_spectrum(&self) -> bool {
        self.mode.has_spectrum()
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    /// Change the window start; resets the sensor if the value differs
    pub fn set_start(&mut self, start: u32) {
        if self.start != start {
            self.start = start;
            self.reset();
        }
    }

    pub fn readings(&self) -> u32 {
        self.readings
    }

    /// Change the sample count; resets the sensor if the value differs
    pub fn set_readings(&mut self, readings: u32) -> Result<(), SensorError> {
        if readings == 0 {
            return Err(SensorError::ZeroGeometry { field: "readings" });
        }
        if self.readings != readings {
            self.readings = readings;
            self.reset();
        }
        Ok(())
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    /// Change the stride; resets the sensor if the value differs
    pub fn set_step(&mut self, step: u32) -> Result<(), SensorError> {
        if step == 0 {
            return Err(SensorError::ZeroGeometry { field: "step" });
        }
        if self.step != step {
            self.step = step;
            self.reset();
        }
        Ok(())
    }

    /// Spectrum buffer capacity
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn received_count(&self) -> u64 {
        self.received_count
    }

    pub fn latest_spectrum(&self) -> &Spectrum {
        self.buffer.newest()
    }

    pub fn latest_values(&self) -> &[f32] {
        self.buffer.newest().values()
    }

    /// Buffered spectra, oldest first
    pub fn spectra(&self) -> impl Iterator<Item = &Spectrum> + '_ {
        self.buffer.iter()
    }

    /// Latest bias
    pub fn bias(&self) -> f32 {
        *self.bias_history.newest()
    }

    /// Latest peak
    pub fn peak(&self) -> f32 {
        *self.peak_history.newest()
    }

    /// Bias history, oldest first
    pub fn bias_history(&self) -> Vec<f32> {
        self.bias_history.to_vec()
    }

    /// Peak history, oldest first
    pub fn peak_history(&self) -> Vec<f32> {
        self.peak_history.to_vec()
    }

    pub fn bias_min(&self) -> f32 {
        self.bias_min
    }

    pub fn bias_max(&self) -> f32 {
        self.bias_max
    }

    pub fn peak_min(&self) -> f32 {
        self.peak_min
    }

    pub fn peak_max(&self) -> f32 {
        self.peak_max
    }

    /// Bins of the latest spectrum
    pub fn bins(&self, resolution: usize) -> Result<Vec<f32>, SpectrumError> {
        self.latest_spectrum().bins(resolution)
    }

    /// Serializable summary of the current statistics
    pub fn snapshot(&self) -> SensorSnapshot {
        SensorSnapshot {
            pin: self.id,
            name: self.name.clone(),
            mode: self.mode,
            received_count: self.received_count,
            bias: self.bias(),
            peak: self.peak(),
            bias_min: self.bias_min,
            bias_max: self.bias_max,
            peak_min: self.peak_min,
            peak_max: self.peak_max,
            latest: self
                .has_spectrum()
                .then(|| self.latest_spectrum().clone()),
        }
    }
}

/// Point-in-time sensor statistics (JSON output)
#[derive(Debug, Clone, Serialize)]
pub struct SensorSnapshot {
    pub pin: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub mode: SensorMode,
    pub received_count: u64,
    pub bias: f32,
    pub peak: f32,
    pub bias_min: f32,
    pub bias_max: f32,
    pub peak_min: f32,
    pub peak_max: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<Spectrum>,
}
