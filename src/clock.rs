//! Injectable time source.
//!
//! Every expiry and rate-window computation in the crate goes through the
//! `Clock` trait instead of reading the wall clock directly, so tests can
//! advance time deterministically instead of sleeping.

use chrono::{ DateTime, Duration as ChronoDuration, Utc };
use std::sync::Mutex;
use std::time::Duration;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time, used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for deterministic tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward by the given amount.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now = expiry_after(*now, by);
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Absolute expiry for an entry written at `now` with the given TTL.
/// Saturates at the maximum representable timestamp instead of wrapping.
pub fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    match ChronoDuration::from_std(ttl) {
        Ok(delta) => now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC),
        Err(_) => DateTime::<Utc>::MAX_UTC,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(Utc::now());
        let start = clock.now();

        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.now() - start, ChronoDuration::seconds(90));
    }

    #[test]
    fn expiry_saturates_on_huge_ttl() {
        let now = Utc::now();
        let expiry = expiry_after(now, Duration::from_secs(u64::MAX));
        assert_eq!(expiry, DateTime::<Utc>::MAX_UTC);
    }
}
