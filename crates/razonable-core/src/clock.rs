// ABOUTME: Time source used to stamp records with creation and update times.
// ABOUTME: Provides the wall clock for production and a manually stepped clock for tests.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// A source of millisecond timestamps.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time in milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

/// Wall-clock time from the system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A clock that advances by a fixed step on every read.
///
/// Each call to [`Clock::now_millis`] returns the current value and then
/// moves it forward by `step`, so consecutive writes get strictly increasing
/// timestamps without depending on wall-clock resolution.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
    step: i64,
}

impl ManualClock {
    pub fn new(start: i64, step: i64) -> Self {
        Self {
            now: AtomicI64::new(start),
            step,
        }
    }

    /// Move the clock to an absolute time.
    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }

    /// The value the next read will return.
    pub fn peek(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.fetch_add(self.step, Ordering::SeqCst)
    }
}
