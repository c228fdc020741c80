//! Transport error handling

use thiserror::Error;

/// Transport error type
#[derive(Debug, Error)]
pub enum TransportError {
    /// Requested port index is not in the enumerated port list
    #[error("Serial index {index} is out of bounds ({} ports available)", available.len())]
    PortOutOfRange { index: usize, available: Vec<String> },

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// read_byte called with nothing available
    #[error("No data available")]
    NoData,

    /// The transport was released by a stop
    #[error("Transport closed")]
    Closed,
}
