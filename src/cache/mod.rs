//! Two-tier cache for FoxESS cloud responses.
//!
//! Read path: memory first, then disk, promoting disk hits into memory
//! with the TTL they have left. Write path: write-through to both tiers.
//! The manager never talks to the remote API — callers fetch on miss
//! after consulting the rate limiter, then populate with an explicit or
//! kind-default TTL. Disk failures degrade to memory-only operation.

pub mod disk;
pub mod keys;
pub mod memory;

use crate::clock::Clock;
use crate::config::CacheSettings;
use crate::errors::CacheError;
use crate::logger::{ self, LogTag };
use disk::DiskTier;
use keys::Descriptor;
use memory::{ MemoryTier, TierMetrics };
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// CACHE MANAGER
// =============================================================================

pub struct CacheManager {
    settings: CacheSettings,
    clock: Arc<dyn Clock>,
    memory: MemoryTier,
    disk: Option<DiskTier>,
}

impl CacheManager {
    /// Build the manager from settings. When the disk root cannot be
    /// prepared the manager keeps running memory-only.
    pub fn new(settings: CacheSettings, clock: Arc<dyn Clock>) -> Self {
        let memory = MemoryTier::new(settings.memory_capacity, clock.clone());

        let disk = match &settings.disk_dir {
            Some(dir) => {
                match DiskTier::new(dir.clone(), settings.max_file_size, clock.clone()) {
                    Ok(tier) => Some(tier),
                    Err(e) => {
                        logger::warning(
                            LogTag::Cache,
                            &format!("Disk tier unavailable, running memory-only: {}", e),
                        );
                        None
                    }
                }
            }
            None => None,
        };

        Self {
            settings,
            clock,
            memory,
            disk,
        }
    }

    /// Look up a descriptor. Memory first, then disk; a disk hit is
    /// promoted into memory with whatever TTL it has left.
    pub fn get(&self, descriptor: &Descriptor) -> Option<Value> {
        let key = descriptor.cache_key();

        if let Some(value) = self.memory.get(&key) {
            logger::debug(LogTag::Cache, &format!("Memory hit: {}", key));
            return Some(value);
        }

        let disk = self.disk.as_ref()?;
        let (value, expires_at) = disk.get(&key)?;

        let remaining = (expires_at - self.clock.now()).to_std().unwrap_or_default();
        if !remaining.is_zero() {
            self.memory.set(&key, value.clone(), remaining);
        }
        logger::debug(LogTag::Cache, &format!("Disk hit, promoted: {}", key));
        Some(value)
    }

    /// Store a value under a descriptor, write-through to both tiers.
    /// Without an explicit TTL the kind's configured default applies.
    pub fn put(&self, descriptor: &Descriptor, value: Value, ttl: Option<Duration>) {
        let key = descriptor.cache_key();
        let ttl = ttl.unwrap_or_else(|| self.settings.ttl_for(descriptor.kind));

        self.memory.set(&key, value.clone(), ttl);

        if let Some(disk) = &self.disk {
            if let Err(e) = disk.set(&key, value, ttl) {
                logger::warning(LogTag::Cache, &format!("Disk write failed for {}: {}", key, e));
            }
        }
    }

    /// Typed read. A payload that no longer decodes is dropped from both
    /// tiers and surfaced as a serialization error.
    pub fn get_json<T: DeserializeOwned>(
        &self,
        descriptor: &Descriptor,
    ) -> Result<Option<T>, CacheError> {
        let Some(value) = self.get(descriptor) else {
            return Ok(None);
        };

        match serde_json::from_value(value) {
            Ok(typed) => Ok(Some(typed)),
            Err(e) => {
                self.invalidate(descriptor);
                Err(CacheError::Serialization {
                    key: descriptor.cache_key(),
                    error: e.to_string(),
                })
            }
        }
    }

    /// Typed write.
    pub fn put_json<T: Serialize>(
        &self,
        descriptor: &Descriptor,
        data: &T,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let value = serde_json::to_value(data).map_err(|e| CacheError::Serialization {
            key: descriptor.cache_key(),
            error: e.to_string(),
        })?;
        self.put(descriptor, value, ttl);
        Ok(())
    }

    /// Drop one entry from both tiers; true if anything was removed.
    pub fn invalidate(&self, descriptor: &Descriptor) -> bool {
        let key = descriptor.cache_key();
        let in_memory = self.memory.delete(&key);
        let on_disk = self.disk.as_ref().map(|d| d.delete(&key)).unwrap_or(false);
        in_memory || on_disk
    }

    /// Drop every entry belonging to a device, e.g. after an update-class
    /// call changed its state upstream.
    pub fn invalidate_device(&self, device_sn: &str) -> usize {
        let matches = |key: &str| Descriptor::device_of_key(key) == Some(device_sn);

        let mut removed = self.memory.delete_matching(matches);
        if let Some(disk) = &self.disk {
            removed += disk.delete_matching(matches);
        }

        logger::info(
            LogTag::Cache,
            &format!("Invalidated {} entries for device {}", removed, device_sn),
        );
        removed
    }

    /// Clear both tiers completely.
    pub fn clear(&self) -> usize {
        let mut removed = self.memory.clear();
        if let Some(disk) = &self.disk {
            removed += disk.clear();
        }
        removed
    }

    /// Sweep expired entries out of both tiers. Returns (memory, disk)
    /// removal counts.
    pub fn cleanup_expired(&self) -> (usize, usize) {
        let memory_removed = self.memory.purge_expired();
        let disk_removed = self.disk.as_ref().map(|d| d.purge_expired()).unwrap_or(0);
        (memory_removed, disk_removed)
    }

    /// Aggregate statistics over both tiers.
    pub fn stats(&self) -> CacheStats {
        let (disk_entries, disk_bytes) = self.disk.as_ref().map(|d| d.stats()).unwrap_or((0, 0));
        CacheStats {
            memory_entries: self.memory.len(),
            memory_metrics: self.memory.metrics(),
            disk_entries,
            disk_bytes,
            disk_enabled: self.disk.is_some(),
        }
    }

    pub fn has_disk_tier(&self) -> bool {
        self.disk.is_some()
    }
}

/// Snapshot of cache state for monitoring
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub memory_entries: usize,
    pub memory_metrics: TierMetrics,
    pub disk_entries: usize,
    pub disk_bytes: u64,
    pub disk_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Utc;
    use serde::Deserialize;
    use serde_json::json;
    use tempfile::TempDir;

    fn manager_with_disk(dir: &TempDir) -> (CacheManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let settings = CacheSettings {
            disk_dir: Some(dir.path().to_path_buf()),
            ..CacheSettings::default()
        };
        (CacheManager::new(settings, clock.clone()), clock)
    }

    fn memory_only_manager() -> (CacheManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        (CacheManager::new(CacheSettings::default(), clock.clone()), clock)
    }

    #[test]
    fn put_then_get_roundtrips() {
        let dir = TempDir::new().unwrap();
        let (manager, _clock) = manager_with_disk(&dir);
        let descriptor = Descriptor::device_info("SN1");

        manager.put(&descriptor, json!({"model": "H3-10.0-E"}), None);
        assert_eq!(manager.get(&descriptor), Some(json!({"model": "H3-10.0-E"})));
    }

    #[test]
    fn kind_default_ttl_applies() {
        let dir = TempDir::new().unwrap();
        let (manager, clock) = manager_with_disk(&dir);
        let now = clock.now();
        let descriptor = Descriptor::realtime("SN1", &[], now);

        manager.put(&descriptor, json!(42), None);

        // Realtime default is 180s; still live just before, gone at it
        clock.advance(Duration::from_secs(179));
        assert!(manager.get(&descriptor).is_some());
        clock.advance(Duration::from_secs(1));
        assert_eq!(manager.get(&descriptor), None);
    }

    #[test]
    fn restart_hits_disk_and_promotes() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let settings = CacheSettings {
            disk_dir: Some(dir.path().to_path_buf()),
            ..CacheSettings::default()
        };
        let descriptor = Descriptor::device_info("SN1");

        {
            let manager = CacheManager::new(settings.clone(), clock.clone());
            manager.put(&descriptor, json!({"model": "H3"}), Some(Duration::from_secs(600)));
        }

        // Fresh instance over the same root simulates a process restart
        let manager = CacheManager::new(settings, clock.clone());
        assert_eq!(manager.stats().memory_entries, 0);

        clock.advance(Duration::from_secs(100));
        assert_eq!(manager.get(&descriptor), Some(json!({"model": "H3"})));
        assert_eq!(manager.stats().memory_entries, 1, "disk hit promoted into memory");

        // The promoted copy carries the remaining TTL, not a fresh one
        clock.advance(Duration::from_secs(500));
        assert_eq!(manager.get(&descriptor), None);
    }

    #[test]
    fn invalidate_device_clears_both_tiers() {
        let dir = TempDir::new().unwrap();
        let (manager, clock) = manager_with_disk(&dir);
        let now = clock.now();

        manager.put(&Descriptor::realtime("SN1", &[], now), json!(1), None);
        manager.put(&Descriptor::device_info("SN1"), json!(2), None);
        manager.put(&Descriptor::device_info("SN2"), json!(3), None);

        let removed = manager.invalidate_device("SN1");
        assert_eq!(removed, 4, "two entries in each tier");
        assert_eq!(manager.get(&Descriptor::device_info("SN1")), None);
        assert!(manager.get(&Descriptor::device_info("SN2")).is_some());
    }

    #[test]
    fn memory_only_mode_stays_functional() {
        let (manager, _clock) = memory_only_manager();
        assert!(!manager.has_disk_tier());

        let descriptor = Descriptor::device_info("SN1");
        manager.put(&descriptor, json!(7), None);
        assert_eq!(manager.get(&descriptor), Some(json!(7)));
        assert!(manager.invalidate(&descriptor));
        assert_eq!(manager.get(&descriptor), None);
    }

    #[test]
    fn typed_roundtrip_and_decode_failure() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Reading {
            soc: u32,
            pv_power: f64,
        }

        let (manager, _clock) = memory_only_manager();
        let descriptor = Descriptor::device_info("SN1");

        let reading = Reading { soc: 88, pv_power: 3.4 };
        manager.put_json(&descriptor, &reading, None).unwrap();
        assert_eq!(manager.get_json::<Reading>(&descriptor).unwrap(), Some(reading));

        // A shape change upstream turns the cached payload stale
        manager.put(&descriptor, json!("not a reading"), None);
        assert!(manager.get_json::<Reading>(&descriptor).is_err());
        // The bad entry was dropped, not left to fail forever
        assert_eq!(manager.get(&descriptor), None);
    }

    #[test]
    fn cleanup_sweeps_both_tiers() {
        let dir = TempDir::new().unwrap();
        let (manager, clock) = manager_with_disk(&dir);

        manager.put(&Descriptor::device_info("SN1"), json!(1), Some(Duration::from_secs(10)));
        manager.put(&Descriptor::device_info("SN2"), json!(2), Some(Duration::from_secs(1000)));

        clock.advance(Duration::from_secs(60));
        let (memory_removed, disk_removed) = manager.cleanup_expired();
        assert_eq!(memory_removed, 1);
        assert_eq!(disk_removed, 1);
        assert!(manager.get(&Descriptor::device_info("SN2")).is_some());
    }

    #[test]
    fn stats_reflect_both_tiers() {
        let dir = TempDir::new().unwrap();
        let (manager, _clock) = manager_with_disk(&dir);

        manager.put(&Descriptor::device_info("SN1"), json!({"a": 1}), None);
        manager.get(&Descriptor::device_info("SN1"));
        manager.get(&Descriptor::device_info("MISSING"));

        let stats = manager.stats();
        assert!(stats.disk_enabled);
        assert_eq!(stats.memory_entries, 1);
        assert_eq!(stats.disk_entries, 1);
        assert!(stats.disk_bytes > 0);
        assert_eq!(stats.memory_metrics.hits, 1);
        assert!(stats.memory_metrics.hit_rate() > 0.0);
    }
}
