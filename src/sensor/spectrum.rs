//! Spectrum value object
//!
//! One timestamped snapshot of amplitude readings across a sensor's
//! configured address range, plus the derived views computed from it.

use serde::Serialize;
use thiserror::Error;

/// Maximum representable amplitude of a single reading
pub const AMPLITUDE_MAX: f32 = 1024.0;

/// Spectrum errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpectrumError {
    #[error("Spectrum must contain at least one value")]
    Empty,

    #[error("Bin resolution {0} is not a power of two (use 2, 4, 8, ...)")]
    InvalidResolution(usize),

    #[error("Bin resolution {resolution} exceeds spectrum length {len}")]
    ResolutionExceedsLength { resolution: usize, len: usize },
}

/// Immutable timestamped amplitude array
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Spectrum {
    time: i64,
    values: Vec<f32>,
    start: u32,
    step: u32,
}

impl Spectrum {
    /// Create a spectrum from received values
    pub fn new(time: i64, values: Vec<f32>, start: u32, step: u32) -> Result<Self, SpectrumError> {
        if values.is_empty() {
            return Err(SpectrumError::Empty);
        }
        Ok(Self {
            time,
            values,
            start,
            step,
        })
    }

    /// Assemble from values the caller already knows to be non-empty
    pub(crate) fn from_parts(time: i64, values: Vec<f32>, start: u32, step: u32) -> Self {
        debug_assert!(!values.is_empty());
        Self {
            time,
            values,
            start,
            step,
        }
    }

    /// Create a zero-filled placeholder
    ///
    /// `len` is clamped to at least one value so the derived views stay defined.
    pub fn zeroed(time: i64, start: u32, len: usize, step: u32) -> Self {
        Self {
            time,
            values: vec![0.0; len.max(1)],
            start,
            step,
        }
    }

    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always false for a constructed spectrum; provided for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    /// Address one past the last reading
    pub fn end(&self) -> u64 {
        self.start as u64 + self.values.len() as u64 * self.step as u64
    }

    pub fn max(&self) -> f32 {
        self.values[self.max_at()]
    }

    pub fn min(&self) -> f32 {
        self.values[self.min_at()]
    }

    /// Index of the first occurrence of the maximum value
    pub fn max_at(&self) -> usize {
        let mut index = 0;
        for (i, &v) in self.values.iter().enumerate().skip(1) {
            if v > self.values[index] {
                index = i;
            }
        }
        index
    }

    /// Index of the first occurrence of the minimum value
    pub fn min_at(&self) -> usize {
        let mut index = 0;
        for (i, &v) in self.values.iter().enumerate().skip(1) {
            if v < self.values[index] {
                index = i;
            }
        }
        index
    }

    /// Relative position (0..1) of the maximum within the window
    pub fn bias(&self) -> f32 {
        self.max_at() as f32 / self.len() as f32
    }

    /// Maximum normalized to [`AMPLITUDE_MAX`]
    pub fn peak(&self) -> f32 {
        self.max() / AMPLITUDE_MAX
    }

    /// 3-point moving average with 2-point averages at both ends
    pub fn smooth(&self) -> Vec<f32> {
        let v = &self.values;
        let n = v.len();
        if n <= 2 {
            return v.clone();
        }

        let mut out = vec![0.0; n];
        out[0] = (v[0] + v[1]) / 2.0;
        out[n - 1] = (v[n - 2] + v[n - 1]) / 2.0;
        for i in 1..n - 1 {
            out[i] = (v[i - 1] + v[i] + v[i + 1]) / 3.0;
        }
        out
    }

    /// Downsample into `resolution` averaging bins
    ///
    /// `bin_size = len / resolution`; samples past `resolution * bin_size`
    /// belong to no bin.
    pub fn bins(&self, resolution: usize) -> Result<Vec<f32>, SpectrumError> {
        if !resolution.is_power_of_two() {
            return Err(SpectrumError::InvalidResolution(resolution));
        }
        let bin_size = self.len() / resolution;
        if bin_size == 0 {
            return Err(SpectrumError::ResolutionExceedsLength {
                resolution,
                len: self.len(),
            });
        }

        Ok(self.values[..resolution * bin_size]
            .chunks_exact(bin_size)
            .map(|chunk| chunk.iter().sum::<f32>() / bin_size as f32)
            .collect())
    }
}
