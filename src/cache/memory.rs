/// In-memory cache tier with TTL and LRU eviction
///
/// Thread-safe; every entry carries its own absolute expiry so values
/// with different TTLs can coexist. Tracks metrics for monitoring.

use crate::clock::{ expiry_after, Clock };
use chrono::{ DateTime, Utc };
use serde_json::Value;
use std::collections::{ HashMap, VecDeque };
use std::sync::{ Arc, RwLock };
use std::time::Duration;

/// Cache entry with its absolute expiry
struct MemoryEntry {
    value: Value,
    expires_at: DateTime<Utc>,
}

impl MemoryEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Tier metrics for monitoring
#[derive(Debug, Clone, Default)]
pub struct TierMetrics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub inserts: u64,
}

impl TierMetrics {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Bounded key -> (value, expiry) store with LRU eviction
///
/// Lock order is data, then access_order, then metrics — every path
/// below acquires them in that order.
pub struct MemoryTier {
    capacity: usize,
    clock: Arc<dyn Clock>,
    data: RwLock<HashMap<String, MemoryEntry>>,
    access_order: RwLock<VecDeque<String>>, // front = least recently used
    metrics: RwLock<TierMetrics>,
}

impl MemoryTier {
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            capacity,
            clock,
            data: RwLock::new(HashMap::new()),
            access_order: RwLock::new(VecDeque::new()),
            metrics: RwLock::new(TierMetrics::default()),
        }
    }

    /// Get a value (None if missing or expired). An expired entry is
    /// removed as a side effect and counted as an expiration.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now();
        let mut data = self.data.write().unwrap();

        if let Some(entry) = data.get(key) {
            if entry.is_expired(now) {
                data.remove(key);
                self.remove_from_access_order(key);

                let mut metrics = self.metrics.write().unwrap();
                metrics.misses += 1;
                metrics.expirations += 1;
                return None;
            }

            let value = entry.value.clone();
            self.update_access_order(key);
            self.metrics.write().unwrap().hits += 1;
            return Some(value);
        }

        self.metrics.write().unwrap().misses += 1;
        None
    }

    /// Insert or overwrite. Evicts least-recently-used entries while the
    /// tier is over capacity.
    pub fn set(&self, key: &str, value: Value, ttl: Duration) {
        let now = self.clock.now();
        let mut data = self.data.write().unwrap();

        while data.len() >= self.capacity && !data.contains_key(key) {
            if !self.evict_lru(&mut data) {
                break;
            }
        }

        data.insert(
            key.to_string(),
            MemoryEntry {
                value,
                expires_at: expiry_after(now, ttl),
            },
        );
        self.update_access_order(key);
        self.metrics.write().unwrap().inserts += 1;
    }

    /// Remove one key; true if it was present.
    pub fn delete(&self, key: &str) -> bool {
        let mut data = self.data.write().unwrap();
        let removed = data.remove(key).is_some();
        if removed {
            self.remove_from_access_order(key);
        }
        removed
    }

    /// Remove everything; returns how many entries were dropped.
    pub fn clear(&self) -> usize {
        let mut data = self.data.write().unwrap();
        let count = data.len();
        data.clear();
        self.access_order.write().unwrap().clear();
        count
    }

    /// Remove entries whose key matches the predicate. Used for
    /// device-scoped invalidation.
    pub fn delete_matching<F: Fn(&str) -> bool>(&self, pred: F) -> usize {
        let mut data = self.data.write().unwrap();
        let before = data.len();
        data.retain(|key, _| !pred(key));
        let removed = before - data.len();
        if removed > 0 {
            self.access_order
                .write()
                .unwrap()
                .retain(|key| data.contains_key(key));
        }
        removed
    }

    /// Drop every expired entry (periodic sweep).
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut data = self.data.write().unwrap();
        let before = data.len();
        data.retain(|_, entry| !entry.is_expired(now));
        let removed = before - data.len();
        if removed > 0 {
            self.access_order
                .write()
                .unwrap()
                .retain(|key| data.contains_key(key));
            self.metrics.write().unwrap().expirations += removed as u64;
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.data.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn metrics(&self) -> TierMetrics {
        self.metrics.read().unwrap().clone()
    }

    // Private: evict the least recently used entry; false when nothing
    // was evictable.
    fn evict_lru(&self, data: &mut HashMap<String, MemoryEntry>) -> bool {
        let mut order = self.access_order.write().unwrap();
        while let Some(lru_key) = order.pop_front() {
            if data.remove(&lru_key).is_some() {
                self.metrics.write().unwrap().evictions += 1;
                return true;
            }
        }
        false
    }

    // Private: move a key to the most-recently-used position
    fn update_access_order(&self, key: &str) {
        let mut order = self.access_order.write().unwrap();
        order.retain(|k| k != key);
        order.push_back(key.to_string());
    }

    fn remove_from_access_order(&self, key: &str) {
        self.access_order.write().unwrap().retain(|k| k != key);
    }
}
