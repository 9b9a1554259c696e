//! Injectable time source

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt::Debug;
use std::time::Duration;

/// Source of the current time
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create clock frozen at `start`
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = add_duration(*now, by);
    }

    /// Jump to `instant`
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock() = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// `instant + by`, saturating at the largest representable time
#[must_use]
pub fn add_duration(instant: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    let millis = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
    instant
        .checked_add_signed(chrono::Duration::milliseconds(millis))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
