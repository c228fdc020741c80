//! Decoder module for the peripheral byte stream
//!
//! Converts raw bytes into 16-bit words and words into protocol events.

pub mod common;
pub mod protocol;
pub mod stream;
pub mod word;

pub use common::{Command, Measurement, ProtocolEvent};
pub use protocol::{ProtocolDecoder, ProtocolProfile};
pub use stream::{encode_words, StreamDecoder};
pub use word::WordAssembler;
