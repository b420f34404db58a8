//! Per-device rate limiting for the FoxESS cloud request contract.
//!
//! The provider caps total calls per device over a rolling 24h window and
//! additionally requires a minimum gap between consecutive calls, with a
//! wider gap for update-class operations. Denial is a decision, not an
//! error: callers check `wait_time` to schedule a retry.

use crate::clock::Clock;
use crate::config::RateLimitSettings;
use crate::logger::{ self, LogTag };
use chrono::{ DateTime, Duration as ChronoDuration, Utc };
use std::collections::{ HashMap, VecDeque };
use std::sync::{ Arc, Mutex };
use std::time::Duration;

// =============================================================================
// REQUEST CLASSES
// =============================================================================

/// Provider-defined operation categories with their own interval policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestClass {
    /// Read-style calls (realtime, history, device info)
    Query,
    /// Write-style calls that mutate device state
    Update,
}

impl RequestClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestClass::Query => "query",
            RequestClass::Update => "update",
        }
    }
}

impl std::fmt::Display for RequestClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// RATE LIMITER
// =============================================================================

/// Accepted-request history for one device, all classes combined.
/// The provider budget is shared, so an update call counts against the
/// same window as a query call.
#[derive(Debug, Default)]
struct DeviceRecord {
    calls: VecDeque<DateTime<Utc>>,
}

impl DeviceRecord {
    /// Drop timestamps at or before the cutoff. Keeps the history
    /// bounded by the window.
    fn prune(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.calls.len();
        while let Some(oldest) = self.calls.front() {
            if *oldest > cutoff {
                break;
            }
            self.calls.pop_front();
        }
        before - self.calls.len()
    }

    fn last(&self) -> Option<DateTime<Utc>> {
        self.calls.back().copied()
    }
}

pub struct RateLimiter {
    settings: RateLimitSettings,
    clock: Arc<dyn Clock>,
    // One lock for all devices: quota-bounded call rates keep contention
    // negligible, and it makes allow() atomic per device.
    records: Mutex<HashMap<String, DeviceRecord>>,
}

impl RateLimiter {
    pub fn new(settings: RateLimitSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            clock,
            records: Mutex::new(HashMap::new()),
        }
    }

    fn min_interval(&self, class: RequestClass) -> ChronoDuration {
        let secs = match class {
            RequestClass::Query => self.settings.query_interval_secs,
            RequestClass::Update => self.settings.update_interval_secs,
        };
        ChronoDuration::seconds(secs as i64)
    }

    fn window(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.settings.window_secs as i64)
    }

    /// Check quota and interval for a device; on success the request is
    /// recorded and counts against the rolling budget.
    ///
    /// The interval check compares against the most recent accepted call
    /// of any class; the volume cap also spans all classes.
    pub fn allow(&self, device_sn: &str, class: RequestClass) -> bool {
        let now = self.clock.now();
        let mut records = self.records.lock().unwrap();
        let record = records.entry(device_sn.to_string()).or_default();

        record.prune(now - self.window());

        if record.calls.len() >= self.settings.max_in_window {
            logger::debug(
                LogTag::RateLimit,
                &format!("Window budget exhausted for {}", device_sn),
            );
            return false;
        }

        if let Some(last) = record.last() {
            if now - last < self.min_interval(class) {
                logger::debug(
                    LogTag::RateLimit,
                    &format!("Interval not elapsed for {} ({})", device_sn, class),
                );
                return false;
            }
        }

        record.calls.push_back(now);
        true
    }

    /// Time until the interval check would pass; zero with no history.
    /// Non-mutating, and does not account for an exhausted window budget.
    pub fn wait_time(&self, device_sn: &str, class: RequestClass) -> Duration {
        let now = self.clock.now();
        let records = self.records.lock().unwrap();

        let last = match records.get(device_sn).and_then(|r| r.last()) {
            Some(last) => last,
            None => return Duration::ZERO,
        };

        let ready_at = last + self.min_interval(class);
        (ready_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Remaining window budget for a device.
    pub fn remaining(&self, device_sn: &str) -> usize {
        let now = self.clock.now();
        let mut records = self.records.lock().unwrap();

        match records.get_mut(device_sn) {
            Some(record) => {
                record.prune(now - self.window());
                self.settings.max_in_window.saturating_sub(record.calls.len())
            }
            None => self.settings.max_in_window,
        }
    }

    /// Sweep: prune every device's history and drop empty records.
    /// Returns the number of timestamps removed.
    pub fn prune_history(&self) -> usize {
        let cutoff = self.clock.now() - self.window();
        let mut records = self.records.lock().unwrap();

        let mut pruned = 0;
        records.retain(|_, record| {
            pruned += record.prune(cutoff);
            !record.calls.is_empty()
        });
        pruned
    }

    /// Number of devices with live history.
    pub fn tracked_devices(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::thread;

    fn limiter_with(settings: RateLimitSettings) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        (RateLimiter::new(settings, clock.clone()), clock)
    }

    fn default_limiter() -> (RateLimiter, Arc<ManualClock>) {
        limiter_with(RateLimitSettings::default())
    }

    #[test]
    fn interval_denies_back_to_back_queries() {
        let (limiter, clock) = default_limiter();

        assert!(limiter.allow("SN1", RequestClass::Query));
        assert!(!limiter.allow("SN1", RequestClass::Query));

        clock.advance(Duration::from_secs(1));
        assert!(limiter.allow("SN1", RequestClass::Query));
    }

    #[test]
    fn update_interval_is_wider() {
        let (limiter, clock) = default_limiter();

        assert!(limiter.allow("SN1", RequestClass::Update));

        // A query one second after an update passes its own 1s threshold,
        // but another update still waits for the 2s gap
        clock.advance(Duration::from_secs(1));
        assert!(!limiter.allow("SN1", RequestClass::Update));
        assert!(limiter.allow("SN1", RequestClass::Query));
    }

    #[test]
    fn denial_does_not_consume_budget() {
        let (limiter, _clock) = default_limiter();

        assert!(limiter.allow("SN1", RequestClass::Query));
        assert!(!limiter.allow("SN1", RequestClass::Query));
        assert_eq!(limiter.remaining("SN1"), 1439, "only the accepted call counted");
    }

    #[test]
    fn window_cap_frees_one_slot_as_the_oldest_ages_out() {
        let (limiter, clock) = limiter_with(RateLimitSettings {
            query_interval_secs: 0,
            window_secs: 60,
            max_in_window: 3,
            ..RateLimitSettings::default()
        });

        assert!(limiter.allow("SN1", RequestClass::Query));
        clock.advance(Duration::from_secs(10));
        assert!(limiter.allow("SN1", RequestClass::Query));
        clock.advance(Duration::from_secs(10));
        assert!(limiter.allow("SN1", RequestClass::Query));

        assert!(!limiter.allow("SN1", RequestClass::Query));
        assert_eq!(limiter.remaining("SN1"), 0);

        // 60s after the first accepted call it leaves the window
        clock.advance(Duration::from_secs(40));
        assert_eq!(limiter.remaining("SN1"), 1);
        assert!(limiter.allow("SN1", RequestClass::Query));
        assert!(!limiter.allow("SN1", RequestClass::Query));
    }

    #[test]
    fn devices_are_isolated() {
        let (limiter, _clock) = default_limiter();

        assert!(limiter.allow("SN1", RequestClass::Query));
        assert!(limiter.allow("SN2", RequestClass::Query));
        assert!(!limiter.allow("SN1", RequestClass::Query));
    }

    #[test]
    fn wait_time_counts_down() {
        let (limiter, clock) = limiter_with(RateLimitSettings {
            update_interval_secs: 5,
            ..RateLimitSettings::default()
        });

        assert_eq!(limiter.wait_time("SN1", RequestClass::Update), Duration::ZERO);

        assert!(limiter.allow("SN1", RequestClass::Update));
        assert_eq!(limiter.wait_time("SN1", RequestClass::Update), Duration::from_secs(5));

        clock.advance(Duration::from_secs(3));
        assert_eq!(limiter.wait_time("SN1", RequestClass::Update), Duration::from_secs(2));

        clock.advance(Duration::from_secs(5));
        assert_eq!(limiter.wait_time("SN1", RequestClass::Update), Duration::ZERO);
    }

    #[test]
    fn prune_history_drops_idle_devices() {
        let (limiter, clock) = limiter_with(RateLimitSettings {
            window_secs: 60,
            ..RateLimitSettings::default()
        });

        assert!(limiter.allow("SN1", RequestClass::Query));
        assert_eq!(limiter.tracked_devices(), 1);

        clock.advance(Duration::from_secs(120));
        assert_eq!(limiter.prune_history(), 1);
        assert_eq!(limiter.tracked_devices(), 0);
    }

    #[test]
    fn concurrent_allow_accepts_exactly_the_remaining_slots() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let limiter = Arc::new(RateLimiter::new(
            RateLimitSettings {
                query_interval_secs: 0,
                window_secs: 60,
                max_in_window: 5,
                ..RateLimitSettings::default()
            },
            clock,
        ));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let limiter = limiter.clone();
            handles.push(thread::spawn(move || limiter.allow("SN1", RequestClass::Query)));
        }

        let accepted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(accepted, 5, "exactly the remaining slots are granted");
        assert_eq!(limiter.remaining("SN1"), 0);
    }
}
