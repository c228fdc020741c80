//! Configuration for the reader
//!
//! Loaded from a TOML file:
//! - `[session]` - port selection, timing, protocol revision
//! - `[[sensors]]` - one entry per polled pin
//! - `[emulator]` - synthetic peripheral used with `--emulate`
//!
//! # Example
//! ```ignore
//! let config = Config::load("config.toml")?;
//! let registry = config.build_registry()?.into_shared();
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::data_source_emulator::EmulatorConfig;
use crate::reader::decoder::ProtocolProfile;
use crate::reader::transport::BAUD_RATE;
use crate::reader::SessionConfig;
use crate::sensor::{SensorConfig, SensorError, SensorRegistry};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid sensor {pin}: {source}")]
    InvalidSensor {
        pin: u16,
        #[source]
        source: SensorError,
    },

    #[error("Sensor pin {0} listed more than once")]
    DuplicatePin(u16),

    #[error("Sensor pin {pin} outside the {revision} protocol range (0..{limit})")]
    PinOutOfRange {
        pin: u16,
        revision: ProtocolRevision,
        limit: u16,
    },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionFileConfig,
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,
    #[serde(default)]
    pub emulator: EmulatorConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check sensor geometry, pin uniqueness and timing values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.baud_rate == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.baud_rate",
                reason: "must be positive".to_string(),
            });
        }
        if self.session.handshake_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.handshake_timeout_ms",
                reason: "must be positive".to_string(),
            });
        }

        let profile = self.session.protocol.profile();
        if self.emulator.firmware_version > profile.max_version() {
            return Err(ConfigError::InvalidValue {
                field: "emulator.firmware_version",
                reason: format!(
                    "{} exceeds {} for the {} protocol",
                    self.emulator.firmware_version,
                    profile.max_version(),
                    self.session.protocol
                ),
            });
        }

        let limit = profile.sensor_index_limit;
        let mut seen = HashSet::new();
        for sensor in &self.sensors {
            sensor.validate().map_err(|source| ConfigError::InvalidSensor {
                pin: sensor.pin,
                source,
            })?;
            if sensor.pin >= limit {
                return Err(ConfigError::PinOutOfRange {
                    pin: sensor.pin,
                    revision: self.session.protocol,
                    limit,
                });
            }
            if !seen.insert(sensor.pin) {
                return Err(ConfigError::DuplicatePin(sensor.pin));
            }
        }
        Ok(())
    }

    /// Registry holding every configured sensor
    pub fn build_registry(&self) -> Result<SensorRegistry, ConfigError> {
        let mut registry = SensorRegistry::new();
        for sensor in &self.sensors {
            registry
                .add_sensor(sensor.clone())
                .map_err(|source| ConfigError::InvalidSensor {
                    pin: sensor.pin,
                    source,
                })?;
        }
        Ok(registry)
    }

    /// Runtime session parameters
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            profile: self.session.protocol.profile(),
            handshake_timeout: Duration::from_millis(self.session.handshake_timeout_ms),
            rest_interval: Duration::from_millis(self.session.rest_interval_ms),
        }
    }

    /// Emulator settings speaking the configured protocol revision
    pub fn emulator_config(&self, seed: Option<u64>) -> EmulatorConfig {
        let mut emulator = self.emulator.clone();
        emulator.profile = self.session.protocol.profile();
        if let Some(seed) = seed {
            emulator.seed = seed;
        }
        emulator
    }
}

// =============================================================================
// Session Configuration
// =============================================================================

/// Firmware protocol revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolRevision {
    #[default]
    Standard,
    Simplified,
}

impl ProtocolRevision {
    pub fn profile(self) -> ProtocolProfile {
        match self {
            ProtocolRevision::Standard => ProtocolProfile::STANDARD,
            ProtocolRevision::Simplified => ProtocolProfile::SIMPLIFIED,
        }
    }
}

impl std::fmt::Display for ProtocolRevision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolRevision::Standard => write!(f, "standard"),
            ProtocolRevision::Simplified => write!(f, "simplified"),
        }
    }
}

/// `[session]` table
#[derive(Debug, Clone, Deserialize)]
pub struct SessionFileConfig {
    /// Serial port path (takes precedence over `port_index`)
    #[serde(default)]
    pub port: Option<String>,
    /// Index into the enumerated port list
    #[serde(default)]
    pub port_index: Option<usize>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Pause between consecutive sensor polls
    #[serde(default = "default_rest_interval_ms")]
    pub rest_interval_ms: u64,
    /// Serial read timeout
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default)]
    pub protocol: ProtocolRevision,
}

impl Default for SessionFileConfig {
    fn default() -> Self {
        Self {
            port: None,
            port_index: None,
            baud_rate: default_baud_rate(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            rest_interval_ms: default_rest_interval_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            protocol: ProtocolRevision::default(),
        }
    }
}

impl SessionFileConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

fn default_baud_rate() -> u32 {
    BAUD_RATE
}

fn default_handshake_timeout_ms() -> u64 {
    2000
}

fn default_rest_interval_ms() -> u64 {
    2
}

fn default_read_timeout_ms() -> u64 {
    10
}

// =============================================================================
// Tests
// =============================================================================
