//! Background sweep of expired cache entries and stale rate history.
//!
//! Foreground reads already drop expired entries lazily; the sweep keeps
//! cold keys and idle devices from accumulating. Each tick takes the same
//! locks as foreground operations, so it is safe to run concurrently with
//! them.

use crate::cache::CacheManager;
use crate::limiter::RateLimiter;
use crate::logger::{ self, LogTag };
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Default sweep period in seconds
pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 300;

/// Spawn the periodic maintenance task. Runs until the handle is aborted.
pub fn spawn_maintenance(
    cache: Arc<CacheManager>,
    limiter: Arc<RateLimiter>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick fires immediately; skip it so a fresh process
        // does not sweep an empty cache.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            run_sweep(&cache, &limiter);
        }
    })
}

/// One sweep pass over both cache tiers and the rate history.
pub fn run_sweep(cache: &CacheManager, limiter: &RateLimiter) -> (usize, usize, usize) {
    let (memory_removed, disk_removed) = cache.cleanup_expired();
    let pruned = limiter.prune_history();

    if memory_removed + disk_removed + pruned > 0 {
        logger::debug(
            LogTag::Maintenance,
            &format!(
                "Sweep removed {} memory / {} disk entries, pruned {} rate timestamps",
                memory_removed, disk_removed, pruned
            ),
        );
    }

    (memory_removed, disk_removed, pruned)
}
