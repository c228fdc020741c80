//! Byte transport between host and peripheral
//!
//! The core only needs to know how many bytes are waiting, read them one at
//! a time and write request commands. Connection management stays with the
//! concrete transport.

pub mod error;
pub mod serial;

pub use error::TransportError;
pub use serial::{list_ports, SerialTransport, BAUD_RATE};

/// Byte source/sink driven by the polling loop
pub trait Transport: Send {
    /// Number of bytes that can be read without blocking
    fn available(&mut self) -> Result<usize, TransportError>;

    /// Read one byte; only called when `available() > 0`
    fn read_byte(&mut self) -> Result<u8, TransportError>;

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Discard anything buffered in either direction
    fn clear(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn available(&mut self) -> Result<usize, TransportError> {
        (**self).available()
    }

    fn read_byte(&mut self) -> Result<u8, TransportError> {
        (**self).read_byte()
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).write(bytes)
    }

    fn clear(&mut self) -> Result<(), TransportError> {
        (**self).clear()
    }
}
