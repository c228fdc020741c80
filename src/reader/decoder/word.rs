//! 16-bit word assembly
//!
//! The peripheral sends every word as two bytes, low byte first.

/// Pairs incoming bytes into little-endian 16-bit words
#[derive(Debug, Clone, Default)]
pub struct WordAssembler {
    pending_low: Option<u8>,
}

impl WordAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte; returns a word on every second byte
    pub fn feed(&mut self, byte: u8) -> Option<u16> {
        match self.pending_low.take() {
            None => {
                self.pending_low = Some(byte);
                None
            }
            Some(low) => Some(u16::from(low) | (u16::from(byte) << 8)),
        }
    }

    /// True if a low byte is waiting for its high half
    pub fn is_pending(&self) -> bool {
        self.pending_low.is_some()
    }

    /// Drop any half-received word
    pub fn reset(&mut self) {
        self.pending_low = None;
    }
}
