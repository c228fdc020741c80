//! Sensor registry and measurement dispatch
//!
//! Sensors are registered explicitly by the caller. Completed measurements
//! from the protocol decoder are routed to the addressed sensor here.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use super::{SensorConfig, SensorError, SensorState, Spectrum, AMPLITUDE_MAX};
use crate::reader::decoder::{Command, Measurement};

/// Registry shared between the polling loop and readers
pub type SharedRegistry = Arc<Mutex<SensorRegistry>>;

/// Dispatch errors (the measurement is dropped, decoding continues)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("No sensor registered for index {0}")]
    UnknownSensor(u16),

    #[error("No command received before end of transmission for sensor {sensor_id}")]
    MissingCommand { sensor_id: u16 },

    #[error("Unknown command type {code} for sensor {sensor_id}")]
    UnknownCommand { sensor_id: u16, code: u16 },

    #[error("{command} for sensor {sensor_id} needs {expected} values, got {actual}")]
    MissingValues {
        sensor_id: u16,
        command: Command,
        expected: usize,
        actual: usize,
    },
}

/// Pin -> sensor map
#[derive(Debug, Default)]
pub struct SensorRegistry {
    sensors: BTreeMap<u16, SensorState>,
}

impl SensorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap into a [`SharedRegistry`]
    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(Mutex::new(self))
    }

    /// Register a sensor, replacing any sensor on the same pin
    pub fn add_sensor(&mut self, config: SensorConfig) -> Result<&mut SensorState, SensorError> {
        let pin = config.pin;
        let state = SensorState::new(config)?;
        match self.sensors.entry(pin) {
            Entry::Occupied(mut entry) => {
                debug!(pin, "Replaced existing sensor");
                entry.insert(state);
                Ok(entry.into_mut())
            }
            Entry::Vacant(entry) => Ok(entry.insert(state)),
        }
    }

    pub fn get(&self, pin: u16) -> Option<&SensorState> {
        self.sensors.get(&pin)
    }

    pub fn get_mut(&mut self, pin: u16) -> Option<&mut SensorState> {
        self.sensors.get_mut(&pin)
    }

    pub fn remove(&mut self, pin: u16) -> Option<SensorState> {
        self.sensors.remove(&pin)
    }

    pub fn contains(&self, pin: u16) -> bool {
        self.sensors.contains_key(&pin)
    }

    /// Sensors in ascending pin order
    pub fn iter(&self) -> impl Iterator<Item = &SensorState> + '_ {
        self.sensors.values()
    }

    pub fn pins(&self) -> Vec<u16> {
        self.sensors.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    /// Apply a completed measurement to the addressed sensor
    ///
    /// Returns the pin that was updated.
    pub fn apply_measurement(
        &mut self,
        measurement: &Measurement,
        now: i64,
    ) -> Result<u16, DispatchError> {
        let sensor_id = measurement.sensor_id;
        let sensor = self
            .sensors
            .get_mut(&sensor_id)
            .ok_or(DispatchError::UnknownSensor(sensor_id))?;

        let command = measurement
            .command
            .ok_or(DispatchError::MissingCommand { sensor_id })?;
        let values = &measurement.values;

        let require = |expected: usize| {
            if values.len() < expected {
                Err(DispatchError::MissingValues {
                    sensor_id,
                    command,
                    expected,
                    actual: values.len(),
                })
            } else {
                Ok(())
            }
        };

        match command {
            Command::Bias => {
                require(1)?;
                sensor.push_bias(values[0] / sensor.readings() as f32);
            }
            Command::Peak => {
                require(1)?;
                sensor.push_peak(values[0] / AMPLITUDE_MAX);
            }
            Command::BiasAndPeak => {
                require(2)?;
                sensor.push_bias(values[0] / sensor.readings() as f32);
                sensor.push_peak(values[1] / AMPLITUDE_MAX);
            }
            Command::Spectrum => {
                require(1)?;
                let spectrum =
                    Spectrum::from_parts(now, values.clone(), sensor.start(), sensor.step());
                sensor.push(spectrum);
            }
            Command::Unknown(code) => {
                return Err(DispatchError::UnknownCommand { sensor_id, code });
            }
        }

        Ok(sensor_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::SensorMode;

    fn registry() -> SensorRegistry {
        let mut registry = SensorRegistry::new();
        registry
            .add_sensor(SensorConfig::new(0).with_window(0, 4, 1))
            .unwrap();
        registry
            .add_sensor(
                SensorConfig::new(5)
                    .with_window(8, 16, 2)
                    .with_mode(SensorMode::BiasAndPeak),
            )
            .unwrap();
        registry
    }

    fn measurement(sensor_id: u16, command: Option<Command>, values: &[f32]) -> Measurement {
        Measurement {
            sensor_id,
            command,
            values: values.to_vec(),
        }
    }

    #[test]
    fn test_add_and_lookup() {
        let mut r = registry();
        assert_eq!(r.len(), 2);
        assert!(r.contains(5));
        assert_eq!(r.pins(), vec![0, 5]);
        assert_eq!(r.get(5).unwrap().step(), 2);

        r.get_mut(0).unwrap().set_name("thumb");
        assert_eq!(r.get(0).unwrap().name(), Some("thumb"));

        assert!(r.remove(0).is_some());
        assert!(r.get(0).is_none());
        assert!(!r.is_empty());
    }

    #[test]
    fn test_add_rejects_bad_geometry() {
        let mut r = SensorRegistry::new();
        assert!(r
            .add_sensor(SensorConfig::new(1).with_window(0, 4, 0))
            .is_err());
        assert!(r.is_empty());
    }

    #[test]
    fn test_apply_spectrum() {
        let mut r = registry();
        let pin = r
            .apply_measurement(
                &measurement(0, Some(Command::Spectrum), &[10.0, 20.0, 30.0]),
                1234,
            )
            .unwrap();
        assert_eq!(pin, 0);

        let s = r.get(0).unwrap();
        assert_eq!(s.received_count(), 1);
        assert_eq!(s.latest_values(), &[10.0, 20.0, 30.0]);
        assert_eq!(s.latest_spectrum().time(), 1234);
        assert_eq!(s.latest_spectrum().start(), 0);
    }

    #[test]
    fn test_apply_bias_uses_readings() {
        let mut r = registry();
        r.apply_measurement(&measurement(5, Some(Command::Bias), &[4.0]), 0)
            .unwrap();
        assert_eq!(r.get(5).unwrap().bias(), 0.25);
        assert_eq!(r.get(5).unwrap().received_count(), 0);
    }

    #[test]
    fn test_apply_peak() {
        let mut r = registry();
        r.apply_measurement(&measurement(5, Some(Command::Peak), &[512.0]), 0)
            .unwrap();
        assert_eq!(r.get(5).unwrap().peak(), 0.5);
    }

    #[test]
    fn test_apply_bias_and_peak() {
        let mut r = registry();
        r.apply_measurement(
            &measurement(5, Some(Command::BiasAndPeak), &[8.0, 256.0]),
            0,
        )
        .unwrap();
        let s = r.get(5).unwrap();
        assert_eq!(s.bias(), 0.5);
        assert_eq!(s.peak(), 0.25);
    }

    #[test]
    fn test_unknown_sensor_dropped() {
        let mut r = registry();
        let err = r
            .apply_measurement(&measurement(9, Some(Command::Spectrum), &[1.0]), 0)
            .unwrap_err();
        assert_eq!(err, DispatchError::UnknownSensor(9));
    }

    #[test]
    fn test_missing_values() {
        let mut r = registry();
        let err = r
            .apply_measurement(&measurement(5, Some(Command::BiasAndPeak), &[1.0]), 0)
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::MissingValues {
                expected: 2,
                actual: 1,
                ..
            }
        ));

        let err = r
            .apply_measurement(&measurement(0, Some(Command::Spectrum), &[]), 0)
            .unwrap_err();
        assert!(matches!(err, DispatchError::MissingValues { .. }));
        assert_eq!(r.get(0).unwrap().received_count(), 0);
    }

    #[test]
    fn test_missing_and_unknown_command() {
        let mut r = registry();
        assert_eq!(
            r.apply_measurement(&measurement(0, None, &[1.0]), 0),
            Err(DispatchError::MissingCommand { sensor_id: 0 })
        );
        assert_eq!(
            r.apply_measurement(&measurement(0, Some(Command::Unknown(7)), &[1.0]), 0),
            Err(DispatchError::UnknownCommand {
                sensor_id: 0,
                code: 7
            })
        );
    }

    #[test]
    fn test_shared_registry() {
        let shared = registry().into_shared();
        let clone = shared.clone();
        clone
            .lock()
            .apply_measurement(&measurement(0, Some(Command::Spectrum), &[1.0; 4]), 0)
            .unwrap();
        assert_eq!(shared.lock().get(0).unwrap().received_count(), 1);
    }
}
