//! Tagged-word protocol decoder
//!
//! Every 16-bit word is classified by the numeric range it falls into.
//! Plain values (`< 1024`) accumulate between a value-count tag and the
//! end-of-transmission tag; command and sensor-index tags select what the
//! accumulated values mean and which sensor they belong to.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use super::common::{Command, Measurement, ProtocolEvent};

/// Standard firmware tag values
mod constants {
    pub const VERSION_TAG: u16 = 2124;
    pub const COMMAND_TAG: u16 = 1088;
    pub const COMMAND_LIMIT: u16 = 10;
    pub const VALUE_COUNT_TAG: u16 = 1098;
    pub const VALUE_COUNT_LIMIT: u16 = 1024;
    pub const END_OF_TRANSMISSION_TAG: u16 = 2123;
    pub const SENSOR_INDEX_TAG: u16 = 1024;
    pub const SENSOR_INDEX_LIMIT: u16 = 64;
    pub const VALUE_LIMIT: u16 = 1024;

    // Simplified firmware
    pub const SIMPLIFIED_VERSION_TAG: u16 = 5000;
    pub const SIMPLIFIED_END_OF_TRANSMISSION_TAG: u16 = 2999;
    pub const SIMPLIFIED_SENSOR_INDEX_TAG: u16 = 3000;
}

/// Tag values and limits of one firmware revision
///
/// Revisions are not wire-compatible with each other; pick the profile
/// matching the peripheral's firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolProfile {
    pub version_tag: u16,
    pub command_tag: u16,
    pub command_limit: u16,
    pub value_count_tag: u16,
    pub value_count_limit: u16,
    pub end_of_transmission_tag: u16,
    pub sensor_index_tag: u16,
    pub sensor_index_limit: u16,
    /// Words below this are plain values
    pub value_limit: u16,
}

impl ProtocolProfile {
    /// Standard firmware (canonical)
    pub const STANDARD: Self = Self {
        version_tag: constants::VERSION_TAG,
        command_tag: constants::COMMAND_TAG,
        command_limit: constants::COMMAND_LIMIT,
        value_count_tag: constants::VALUE_COUNT_TAG,
        value_count_limit: constants::VALUE_COUNT_LIMIT,
        end_of_transmission_tag: constants::END_OF_TRANSMISSION_TAG,
        sensor_index_tag: constants::SENSOR_INDEX_TAG,
        sensor_index_limit: constants::SENSOR_INDEX_LIMIT,
        value_limit: constants::VALUE_LIMIT,
    };

    /// Simplified firmware: relocated version, end and sensor-index tags
    pub const SIMPLIFIED: Self = Self {
        version_tag: constants::SIMPLIFIED_VERSION_TAG,
        end_of_transmission_tag: constants::SIMPLIFIED_END_OF_TRANSMISSION_TAG,
        sensor_index_tag: constants::SIMPLIFIED_SENSOR_INDEX_TAG,
        ..Self::STANDARD
    };

    pub fn is_value(&self, word: u16) -> bool {
        word < self.value_limit
    }

    pub fn is_command(&self, word: u16) -> bool {
        word >= self.command_tag && word - self.command_tag < self.command_limit
    }

    pub fn is_value_count(&self, word: u16) -> bool {
        word >= self.value_count_tag && word - self.value_count_tag <= self.value_count_limit
    }

    pub fn is_end_of_transmission(&self, word: u16) -> bool {
        word == self.end_of_transmission_tag
    }

    pub fn is_sensor_index(&self, word: u16) -> bool {
        word >= self.sensor_index_tag && word - self.sensor_index_tag < self.sensor_index_limit
    }

    /// Highest firmware version a handshake word can carry
    pub fn max_version(&self) -> u16 {
        u16::MAX - self.version_tag
    }

    // Encoders used by the emulator and tests. `None` when the input does not
    // fit the tag's range.

    pub fn version_word(&self, version: u16) -> Option<u16> {
        self.version_tag.checked_add(version)
    }

    pub fn command_word(&self, command: Command) -> Option<u16> {
        let code = command.code();
        if code < self.command_limit {
            self.command_tag.checked_add(code)
        } else {
            None
        }
    }

    pub fn value_count_word(&self, count: u16) -> u16 {
        self.value_count_tag
            .saturating_add(count.min(self.value_count_limit))
    }

    pub fn sensor_index_word(&self, pin: u16) -> Option<u16> {
        if pin < self.sensor_index_limit {
            self.sensor_index_tag.checked_add(pin)
        } else {
            None
        }
    }
}

impl Default for ProtocolProfile {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Protocol state machine: awaiting handshake -> running
#[derive(Debug, Clone)]
pub struct ProtocolDecoder {
    profile: ProtocolProfile,
    handshake_complete: bool,
    active_command: Option<Command>,
    active_sensor: u16,
    accumulator: Vec<f32>,
}

impl ProtocolDecoder {
    pub fn new(profile: ProtocolProfile) -> Self {
        Self {
            profile,
            handshake_complete: false,
            active_command: None,
            active_sensor: 0,
            accumulator: Vec::new(),
        }
    }

    /// Create a decoder for the standard firmware
    pub fn with_defaults() -> Self {
        Self::new(ProtocolProfile::STANDARD)
    }

    pub fn profile(&self) -> &ProtocolProfile {
        &self.profile
    }

    pub fn is_handshaken(&self) -> bool {
        self.handshake_complete
    }

    pub fn active_command(&self) -> Option<Command> {
        self.active_command
    }

    pub fn active_sensor(&self) -> u16 {
        self.active_sensor
    }

    /// Values received since the last begin/end tag
    pub fn pending_values(&self) -> &[f32] {
        &self.accumulator
    }

    /// Back to pre-handshake with nothing accumulated
    pub fn reset(&mut self) {
        self.handshake_complete = false;
        self.active_command = None;
        self.active_sensor = 0;
        self.accumulator.clear();
    }

    /// Classify one word and advance the state machine
    pub fn decode(&mut self, word: u16) -> Option<ProtocolEvent> {
        let p = self.profile;

        if !self.handshake_complete {
            if word >= p.version_tag {
                self.handshake_complete = true;
                let version = word - p.version_tag;
                info!(version, "Peripheral handshake complete");
                return Some(ProtocolEvent::HandshakeComplete { version });
            }
            trace!(word, "Ignoring word before handshake");
            return None;
        }

        if p.is_value(word) {
            self.accumulator.push(word as f32);
            None
        } else if p.is_command(word) {
            self.active_command = Some(Command::from_code(word - p.command_tag));
            None
        } else if p.is_value_count(word) {
            // Begin of a new transmission
            self.accumulator.clear();
            None
        } else if p.is_end_of_transmission(word) {
            let measurement = Measurement {
                sensor_id: self.active_sensor,
                command: self.active_command,
                values: std::mem::take(&mut self.accumulator),
            };
            trace!(
                sensor = measurement.sensor_id,
                values = measurement.values.len(),
                "End of transmission"
            );
            Some(ProtocolEvent::MeasurementReady(measurement))
        } else if p.is_sensor_index(word) {
            self.active_sensor = word - p.sensor_index_tag;
            None
        } else {
            debug!(word, "Received unknown word");
            Some(ProtocolEvent::UnknownWord { word })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Test helpers
    // -----------------------------------------------------------------------

    const P: ProtocolProfile = ProtocolProfile::STANDARD;

    fn handshaken() -> ProtocolDecoder {
        let mut dec = ProtocolDecoder::with_defaults();
        dec.decode(P.version_word(0).unwrap());
        dec
    }

    fn feed(dec: &mut ProtocolDecoder, words: &[u16]) -> Vec<ProtocolEvent> {
        words.iter().filter_map(|&w| dec.decode(w)).collect()
    }

    // -----------------------------------------------------------------------
    // Handshake
    // -----------------------------------------------------------------------

    #[test]
    fn test_handshake_reports_version() {
        let mut dec = ProtocolDecoder::with_defaults();
        assert!(!dec.is_handshaken());
        let ev = dec.decode(P.version_tag + 3);
        assert_eq!(ev, Some(ProtocolEvent::HandshakeComplete { version: 3 }));
        assert!(dec.is_handshaken());
    }

    #[test]
    fn test_noise_before_handshake_ignored() {
        let mut dec = ProtocolDecoder::with_defaults();
        let noise = [0, 5, 1023, 1024, 1088, 1098, 2123, 2000];
        assert!(feed(&mut dec, &noise).is_empty());
        assert!(!dec.is_handshaken());
        assert!(dec.pending_values().is_empty());
        assert_eq!(dec.active_command(), None);
        assert_eq!(dec.active_sensor(), 0);
    }

    #[test]
    fn test_version_tag_only_once() {
        let mut dec = handshaken();
        // After the handshake a version-range word is unknown
        assert_eq!(
            dec.decode(P.version_tag + 1),
            Some(ProtocolEvent::UnknownWord {
                word: P.version_tag + 1
            })
        );
    }

    // -----------------------------------------------------------------------
    // Transmissions
    // -----------------------------------------------------------------------

    #[test]
    fn test_spectrum_transmission() {
        let mut dec = handshaken();
        let events = feed(
            &mut dec,
            &[
                P.command_word(Command::Spectrum).unwrap(),
                P.value_count_word(3),
                10,
                20,
                30,
                P.end_of_transmission_tag,
            ],
        );
        assert_eq!(
            events,
            vec![ProtocolEvent::MeasurementReady(Measurement {
                sensor_id: 0,
                command: Some(Command::Spectrum),
                values: vec![10.0, 20.0, 30.0],
            })]
        );
        assert!(dec.pending_values().is_empty());
    }

    #[test]
    fn test_begin_tag_clears_accumulator() {
        let mut dec = handshaken();
        feed(&mut dec, &[1, 2, 3]);
        assert_eq!(dec.pending_values(), &[1.0, 2.0, 3.0]);
        feed(&mut dec, &[P.value_count_word(2), 7]);
        assert_eq!(dec.pending_values(), &[7.0]);
    }

    #[test]
    fn test_sensor_index_and_command_persist() {
        let mut dec = handshaken();
        let events = feed(
            &mut dec,
            &[
                P.sensor_index_word(12).unwrap(),
                P.command_word(Command::BiasAndPeak).unwrap(),
                P.value_count_word(2),
                16,
                512,
                P.end_of_transmission_tag,
                // Second transmission reuses sensor and command
                P.value_count_word(2),
                1,
                2,
                P.end_of_transmission_tag,
            ],
        );
        assert_eq!(events.len(), 2);
        for ev in events {
            match ev {
                ProtocolEvent::MeasurementReady(m) => {
                    assert_eq!(m.sensor_id, 12);
                    assert_eq!(m.command, Some(Command::BiasAndPeak));
                    assert_eq!(m.values.len(), 2);
                }
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[test]
    fn test_end_without_command() {
        let mut dec = handshaken();
        let events = feed(&mut dec, &[5, P.end_of_transmission_tag]);
        assert_eq!(
            events,
            vec![ProtocolEvent::MeasurementReady(Measurement {
                sensor_id: 0,
                command: None,
                values: vec![5.0],
            })]
        );
    }

    #[test]
    fn test_unknown_command_code() {
        let mut dec = handshaken();
        dec.decode(P.command_tag + 7);
        assert_eq!(dec.active_command(), Some(Command::Unknown(7)));
    }

    // -----------------------------------------------------------------------
    // Range boundaries
    // -----------------------------------------------------------------------

    #[test]
    fn test_standard_boundaries() {
        let mut dec = handshaken();

        // Last plain value
        assert_eq!(dec.decode(1023), None);
        assert_eq!(dec.pending_values(), &[1023.0]);

        // Sensor index range [1024, 1088)
        assert_eq!(dec.decode(1024), None);
        assert_eq!(dec.active_sensor(), 0);
        assert_eq!(dec.decode(1087), None);
        assert_eq!(dec.active_sensor(), 63);

        // Command range [1088, 1098)
        assert_eq!(dec.decode(1097), None);
        assert_eq!(dec.active_command(), Some(Command::Unknown(9)));

        // Value count range [1098, 2122] inclusive
        assert_eq!(dec.decode(2122), None);
        assert!(dec.pending_values().is_empty());

        // End of transmission
        assert!(matches!(
            dec.decode(2123),
            Some(ProtocolEvent::MeasurementReady(_))
        ));

        // Above every range
        assert_eq!(
            dec.decode(2124),
            Some(ProtocolEvent::UnknownWord { word: 2124 })
        );
    }

    #[test]
    fn test_simplified_profile() {
        let s = ProtocolProfile::SIMPLIFIED;
        let mut dec = ProtocolDecoder::new(s);

        // Standard version tag is noise for the simplified firmware
        assert_eq!(dec.decode(ProtocolProfile::STANDARD.version_tag), None);
        assert_eq!(
            dec.decode(s.version_word(1).unwrap()),
            Some(ProtocolEvent::HandshakeComplete { version: 1 })
        );

        let events = feed(
            &mut dec,
            &[
                s.sensor_index_word(2).unwrap(),
                s.command_word(Command::Peak).unwrap(),
                s.value_count_word(1),
                900,
                s.end_of_transmission_tag,
            ],
        );
        assert_eq!(
            events,
            vec![ProtocolEvent::MeasurementReady(Measurement {
                sensor_id: 2,
                command: Some(Command::Peak),
                values: vec![900.0],
            })]
        );

        // Standard end-of-transmission word is unknown here
        assert_eq!(
            dec.decode(2123),
            Some(ProtocolEvent::UnknownWord { word: 2123 })
        );
    }

    #[test]
    fn test_reset_returns_to_pre_handshake() {
        let mut dec = handshaken();
        feed(
            &mut dec,
            &[
                P.sensor_index_word(4).unwrap(),
                P.command_word(Command::Bias).unwrap(),
                9,
            ],
        );
        dec.reset();

        assert!(!dec.is_handshaken());
        assert!(dec.pending_values().is_empty());
        assert_eq!(dec.active_sensor(), 0);
        assert_eq!(dec.active_command(), None);
        // Values are ignored again until the next version tag
        assert_eq!(dec.decode(5), None);
        assert!(dec.pending_values().is_empty());
    }

    #[test]
    fn test_encoders_reject_out_of_range() {
        assert_eq!(P.max_version(), u16::MAX - 2124);
        assert_eq!(P.version_word(P.max_version()), Some(u16::MAX));
        assert_eq!(P.version_word(P.max_version() + 1), None);
        assert_eq!(P.version_word(65000), None);
        assert_eq!(P.sensor_index_word(63), Some(1087));
        assert_eq!(P.sensor_index_word(64), None);
        assert_eq!(P.command_word(Command::Unknown(9)), Some(1097));
        assert_eq!(P.command_word(Command::Unknown(10)), None);
        assert_eq!(P.command_word(Command::Unknown(u16::MAX)), None);
    }

    #[test]
    fn test_profile_deserialize() {
        let json = serde_json::to_string(&ProtocolProfile::SIMPLIFIED).unwrap();
        let back: ProtocolProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ProtocolProfile::SIMPLIFIED);
        assert_eq!(ProtocolProfile::default(), ProtocolProfile::STANDARD);
    }
}
