//! Injected clock, per spec.md §6 ("Clock — monotonic `now()`; injected for
//! deterministic testing.").

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// A source of the current time, injected everywhere the core needs
/// timestamps (activity entries, vulnerability records, approval timeouts,
/// loop-detector windows) so tests can drive time deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Real wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A manually-advanced clock for tests. Starts at the Unix epoch unless
/// constructed with [`MockClock::at`].
pub struct MockClock {
    millis_since_epoch: AtomicI64,
}

impl MockClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { millis_since_epoch: AtomicI64::new(0) })
    }

    pub fn at(millis_since_epoch: i64) -> Arc<Self> {
        Arc::new(Self { millis_since_epoch: AtomicI64::new(millis_since_epoch) })
    }

    pub fn advance_millis(&self, delta: i64) {
        self.millis_since_epoch.fetch_add(delta, Ordering::SeqCst);
    }

    pub fn set_millis(&self, millis_since_epoch: i64) {
        self.millis_since_epoch.store(millis_since_epoch, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        let millis = self.millis_since_epoch.load(Ordering::SeqCst);
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }
}
