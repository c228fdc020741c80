//! TACT-RS: reader for capacitive-sensing peripherals
//!
//! Decodes the peripheral's tagged 16-bit word stream, keeps per-sensor
//! history and running statistics, and drives the poll loop.

pub mod common;
pub mod config;
pub mod data_source_emulator;
pub mod reader;
pub mod sensor;
