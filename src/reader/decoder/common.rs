//! Common types for decoder module

use serde::Serialize;

/// Command code announced by the peripheral before a transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Command {
    Spectrum,
    Peak,
    Bias,
    BiasAndPeak,
    /// Inside the command range but not a known command
    Unknown(u16),
}

impl Command {
    pub const SPECTRUM: u16 = 0;
    pub const PEAK: u16 = 1;
    pub const BIAS: u16 = 2;
    pub const BIAS_AND_PEAK: u16 = 3;

    /// Map a command offset (`word - COMMAND_TAG`) to a command
    pub fn from_code(code: u16) -> Self {
        match code {
            Self::SPECTRUM => Command::Spectrum,
            Self::PEAK => Command::Peak,
            Self::BIAS => Command::Bias,
            Self::BIAS_AND_PEAK => Command::BiasAndPeak,
            other => Command::Unknown(other),
        }
    }

    pub fn code(self) -> u16 {
        match self {
            Command::Spectrum => Self::SPECTRUM,
            Command::Peak => Self::PEAK,
            Command::Bias => Self::BIAS,
            Command::BiasAndPeak => Self::BIAS_AND_PEAK,
            Command::Unknown(code) => code,
        }
    }

    /// Request character sent upstream to poll for this command
    pub fn request_char(self) -> Option<char> {
        match self {
            Command::Spectrum => Some('s'),
            Command::Peak => Some('p'),
            Command::Bias => Some('b'),
            Command::BiasAndPeak => Some('x'),
            Command::Unknown(_) => None,
        }
    }

    /// Inverse of [`Command::request_char`]
    pub fn from_request_char(c: char) -> Option<Self> {
        match c {
            's' => Some(Command::Spectrum),
            'p' => Some(Command::Peak),
            'b' => Some(Command::Bias),
            'x' => Some(Command::BiasAndPeak),
            _ => None,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Spectrum => write!(f, "Spectrum"),
            Command::Peak => write!(f, "Peak"),
            Command::Bias => write!(f, "Bias"),
            Command::BiasAndPeak => write!(f, "BiasAndPeak"),
            Command::Unknown(code) => write!(f, "Unknown({})", code),
        }
    }
}

/// Values collected between a begin tag and the end-of-transmission tag
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    /// Sensor index active at end of transmission
    pub sensor_id: u16,
    /// Command active at end of transmission (None if never announced)
    pub command: Option<Command>,
    pub values: Vec<f32>,
}

/// Event emitted by the protocol decoder
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    /// Version tag seen; decoder is now running
    HandshakeComplete { version: u16 },
    /// End of transmission reached
    MeasurementReady(Measurement),
    /// Word outside every known range (diagnostic only)
    UnknownWord { word: u16 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_codes_round_trip() {
        for code in 0..10 {
            assert_eq!(Command::from_code(code).code(), code);
        }
        assert_eq!(Command::from_code(0), Command::Spectrum);
        assert_eq!(Command::from_code(3), Command::BiasAndPeak);
        assert_eq!(Command::from_code(4), Command::Unknown(4));
    }

    #[test]
    fn test_request_chars() {
        assert_eq!(Command::Spectrum.request_char(), Some('s'));
        assert_eq!(Command::BiasAndPeak.request_char(), Some('x'));
        assert_eq!(Command::Unknown(9).request_char(), None);
        for c in [Command::Spectrum, Command::Peak, Command::Bias, Command::BiasAndPeak] {
            assert_eq!(c.request_char().and_then(Command::from_request_char), Some(c));
        }
        assert_eq!(Command::from_request_char('V'), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Command::Peak.to_string(), "Peak");
        assert_eq!(Command::Unknown(5).to_string(), "Unknown(5)");
    }
}
