//! Byte stream decoder (word assembly + protocol state machine)

use super::common::ProtocolEvent;
use super::protocol::{ProtocolDecoder, ProtocolProfile};
use super::word::WordAssembler;

/// Raw bytes in, protocol events out
#[derive(Debug, Clone)]
pub struct StreamDecoder {
    words: WordAssembler,
    protocol: ProtocolDecoder,
    words_decoded: u64,
}

impl StreamDecoder {
    pub fn new(profile: ProtocolProfile) -> Self {
        Self {
            words: WordAssembler::new(),
            protocol: ProtocolDecoder::new(profile),
            words_decoded: 0,
        }
    }

    /// Feed one byte
    pub fn feed(&mut self, byte: u8) -> Option<ProtocolEvent> {
        let word = self.words.feed(byte)?;
        self.words_decoded += 1;
        self.protocol.decode(word)
    }

    /// Feed a byte slice, collecting every event
    pub fn feed_all(&mut self, bytes: &[u8]) -> Vec<ProtocolEvent> {
        bytes.iter().filter_map(|&b| self.feed(b)).collect()
    }

    pub fn protocol(&self) -> &ProtocolDecoder {
        &self.protocol
    }

    pub fn is_handshaken(&self) -> bool {
        self.protocol.is_handshaken()
    }

    pub fn words_decoded(&self) -> u64 {
        self.words_decoded
    }

    /// Pre-handshake, no half word, nothing accumulated
    pub fn reset(&mut self) {
        self.words.reset();
        self.protocol.reset();
    }
}

/// Encode words as the peripheral sends them (low byte first)
pub fn encode_words(words: &[u16]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}
