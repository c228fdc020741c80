//! Session metrics
//!
//! Lock-free atomic counters updated by the polling loop and read from any
//! thread. All operations use Relaxed ordering; readers see eventually
//! consistent values, which is enough for monitoring.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters maintained by one session
#[derive(Debug, Default)]
pub struct SessionMetrics {
    /// Bytes read from the transport
    pub bytes_read: AtomicU64,
    /// 16-bit words assembled
    pub words_decoded: AtomicU64,
    /// Measurements applied to a sensor
    pub measurements: AtomicU64,
    /// Measurements dropped by dispatch (unknown sensor, missing values, ...)
    pub dropped: AtomicU64,
    /// Words outside every protocol range
    pub unknown_words: AtomicU64,
    /// Sensor poll requests written
    pub polls: AtomicU64,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn add_bytes(&self, n: u64) {
        self.bytes_read.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_words(&self, n: u64) {
        self.words_decoded.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_measurements(&self) {
        self.measurements.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_unknown_words(&self) {
        self.unknown_words.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_polls(&self) {
        self.polls.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of current values
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            words_decoded: self.words_decoded.load(Ordering::Relaxed),
            measurements: self.measurements.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            unknown_words: self.unknown_words.load(Ordering::Relaxed),
            polls: self.polls.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero
    pub fn reset(&self) {
        self.bytes_read.store(0, Ordering::Relaxed);
        self.words_decoded.store(0, Ordering::Relaxed);
        self.measurements.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
        self.unknown_words.store(0, Ordering::Relaxed);
        self.polls.store(0, Ordering::Relaxed);
    }
}

/// Snapshot of counter values at a point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub bytes_read: u64,
    pub words_decoded: u64,
    pub measurements: u64,
    pub dropped: u64,
    pub unknown_words: u64,
    pub polls: u64,
}

impl MetricsSnapshot {
    /// Calculate rates between two snapshots given elapsed seconds
    pub fn rate_from(&self, prev: &MetricsSnapshot, elapsed_secs: f64) -> RateSnapshot {
        if elapsed_secs <= 0.0 {
            return RateSnapshot::default();
        }

        RateSnapshot {
            bytes_rate: self.bytes_read.saturating_sub(prev.bytes_read) as f64 / elapsed_secs,
            measurement_rate: self.measurements.saturating_sub(prev.measurements) as f64
                / elapsed_secs,
            poll_rate: self.polls.saturating_sub(prev.polls) as f64 / elapsed_secs,
        }
    }
}

/// Rate calculations from counter snapshots
#[derive(Debug, Clone, Copy, Default)]
pub struct RateSnapshot {
    /// Bytes per second
    pub bytes_rate: f64,
    /// Measurements per second
    pub measurement_rate: f64,
    /// Poll requests per second
    pub poll_rate: f64,
}

impl RateSnapshot {
    /// Format bytes rate as human-readable string
    pub fn format_bytes_rate(&self) -> String {
        if self.bytes_rate >= 1_000_000.0 {
            format!("{:.2} MB/s", self.bytes_rate / 1_000_000.0)
        } else if self.bytes_rate >= 1_000.0 {
            format!("{:.2} KB/s", self.bytes_rate / 1_000.0)
        } else {
            format!("{:.0} B/s", self.bytes_rate)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zero() {
        let m = SessionMetrics::new();
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_counters() {
        let m = SessionMetrics::new();
        m.add_bytes(10);
        m.add_words(5);
        m.inc_measurements();
        m.inc_measurements();
        m.inc_dropped();
        m.inc_unknown_words();
        m.inc_polls();

        let snap = m.snapshot();
        assert_eq!(snap.bytes_read, 10);
        assert_eq!(snap.words_decoded, 5);
        assert_eq!(snap.measurements, 2);
        assert_eq!(snap.dropped, 1);
        assert_eq!(snap.unknown_words, 1);
        assert_eq!(snap.polls, 1);
    }

    #[test]
    fn test_reset() {
        let m = SessionMetrics::new();
        m.add_bytes(100);
        m.inc_polls();
        m.reset();
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_rate_calculation() {
        let prev = MetricsSnapshot {
            bytes_read: 1000,
            measurements: 10,
            polls: 10,
            ..Default::default()
        };
        let current = MetricsSnapshot {
            bytes_read: 3000,
            measurements: 30,
            polls: 14,
            ..Default::default()
        };

        let rate = current.rate_from(&prev, 2.0);
        assert_eq!(rate.bytes_rate, 1000.0);
        assert_eq!(rate.measurement_rate, 10.0);
        assert_eq!(rate.poll_rate, 2.0);
    }

    #[test]
    fn test_rate_zero_elapsed() {
        let current = MetricsSnapshot {
            bytes_read: 100,
            ..Default::default()
        };
        let rate = current.rate_from(&MetricsSnapshot::default(), 0.0);
        assert_eq!(rate.bytes_rate, 0.0);
    }

    #[test]
    fn test_format_bytes_rate() {
        let rate = RateSnapshot {
            bytes_rate: 500.0,
            ..Default::default()
        };
        assert_eq!(rate.format_bytes_rate(), "500 B/s");

        let rate = RateSnapshot {
            bytes_rate: 1500.0,
            ..Default::default()
        };
        assert_eq!(rate.format_bytes_rate(), "1.50 KB/s");

        let rate = RateSnapshot {
            bytes_rate: 2_500_000.0,
            ..Default::default()
        };
        assert_eq!(rate.format_bytes_rate(), "2.50 MB/s");
    }
}
