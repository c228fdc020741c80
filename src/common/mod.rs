//! Shared infrastructure
//!
//! Clock abstraction, session state, metrics, shutdown handling and CLI
//! arguments used by the library and the binaries.

pub mod cli;
pub mod metrics;
pub mod shutdown;
pub mod state;

pub use cli::ReaderArgs;
pub use metrics::{MetricsSnapshot, RateSnapshot, SessionMetrics};
pub use shutdown::{setup_shutdown, shutdown_channel, ShutdownReceiver, ShutdownSender};
pub use state::SessionState;

use std::sync::atomic::{AtomicI64, Ordering};

/// Timestamp source for received spectra (milliseconds)
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall clock, milliseconds since the Unix epoch
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Caller-driven clock for deterministic tests and replays
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::Relaxed);
    }

    pub fn advance(&self, delta: i64) {
        self.now.fetch_add(delta, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::Relaxed)
    }
}
