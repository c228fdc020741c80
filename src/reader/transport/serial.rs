//! Serial port transport
//!
//! Wraps a `serialport` handle. Bytes are pulled from the OS in blocks and
//! handed out one at a time from a local buffer.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::time::Duration;

use serialport::{ClearBuffer, SerialPort};
use tracing::{info, warn};

use super::{Transport, TransportError};

/// Default baud rate of the peripheral
pub const BAUD_RATE: u32 = 115_200;

/// Names of the serial ports present on this machine
pub fn list_ports() -> Result<Vec<String>, TransportError> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(|p| p.port_name)
        .collect())
}

/// Serial connection to the peripheral
///
/// The port is closed when dropped.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    buffer: VecDeque<u8>,
}

impl SerialTransport {
    /// Open a port by path (e.g., "/dev/ttyACM0")
    pub fn open(path: &str, baud_rate: u32, read_timeout: Duration) -> Result<Self, TransportError> {
        let port = serialport::new(path, baud_rate)
            .timeout(read_timeout)
            .open()?;
        info!(port = path, baud_rate, "Serial port opened");
        Ok(Self {
            port,
            buffer: VecDeque::new(),
        })
    }

    /// Open the `index`-th port of [`list_ports`]
    pub fn open_index(
        index: usize,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let available = list_ports()?;
        match available.get(index) {
            Some(path) => Self::open(path, baud_rate, read_timeout),
            None => {
                warn!(index, "Serial index out of bounds, available ports:");
                for (i, name) in available.iter().enumerate() {
                    warn!("[{}] {}", i, name);
                }
                Err(TransportError::PortOutOfRange { index, available })
            }
        }
    }

    /// Move everything the OS has into the local buffer
    fn fill(&mut self) -> Result<(), TransportError> {
        let pending = self.port.bytes_to_read()? as usize;
        if pending == 0 {
            return Ok(());
        }
        let mut chunk = vec![0u8; pending];
        let n = self.port.read(&mut chunk)?;
        self.buffer.extend(&chunk[..n]);
        Ok(())
    }
}

impl Transport for SerialTransport {
    fn available(&mut self) -> Result<usize, TransportError> {
        if self.buffer.is_empty() {
            self.fill()?;
        }
        Ok(self.buffer.len())
    }

    fn read_byte(&mut self) -> Result<u8, TransportError> {
        if self.buffer.is_empty() {
            self.fill()?;
        }
        self.buffer.pop_front().ok_or(TransportError::NoData)
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), TransportError> {
        self.buffer.clear();
        self.port.clear(ClearBuffer::All)?;
        Ok(())
    }
}
