//! Injectable wall clock.
//!
//! Cache expiry, quote staleness and interest accrual all read time through
//! [`Clock`] so tests can pin and advance it deterministically.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::fmt::Debug;

/// Source of the current UTC time.
pub trait Clock: Send + Sync + Debug {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;

    /// Current time as unix seconds.
    fn unix_now(&self) -> u64 {
        self.now().timestamp().max(0) as u64
    }
}

/// System clock backed by [`Utc::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Create a clock frozen at the given unix timestamp.
    pub fn at_unix(secs: i64) -> Self {
        Self::new(DateTime::from_timestamp(secs, 0).unwrap_or_default())
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    /// Move the clock forward by whole seconds.
    pub fn advance_secs(&self, secs: i64) {
        self.advance(Duration::seconds(secs));
    }

    /// Jump to an absolute time.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::at_unix(1_700_000_000);
        assert_eq!(clock.unix_now(), 1_700_000_000);

        clock.advance_secs(61);
        assert_eq!(clock.unix_now(), 1_700_000_061);
    }

    #[test]
    fn test_system_clock_is_recent() {
        // 2023-11-14, anything earlier means the clock is broken
        assert!(SystemClock.unix_now() > 1_700_000_000);
    }
}
