//! Persistent cache tier: one JSON envelope file per key.
//!
//! Filenames are the SHA-256 hex of the cache key, so arbitrary key
//! content can never traverse paths or exceed filename limits. Writes go
//! to a temp file in the same directory and are renamed into place; a
//! crash mid-write never leaves a corrupt readable entry. Reads check
//! expiry lazily per key — there is no startup scan.

use crate::clock::{ expiry_after, Clock };
use crate::errors::StorageError;
use crate::logger::{ self, LogTag };
use chrono::{ DateTime, Utc };
use serde::{ Deserialize, Serialize };
use serde_json::Value;
use sha2::{ Digest, Sha256 };
use std::fs;
use std::io::Write;
use std::path::{ Path, PathBuf };
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

const CACHE_FILE_EXT: &str = "cache";

/// On-disk record. The logical key is stored inside the envelope because
/// the filename only carries its hash.
#[derive(Debug, Serialize, Deserialize)]
struct DiskEnvelope {
    key: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    value: Value,
}

pub struct DiskTier {
    root: PathBuf,
    max_file_size: u64,
    clock: Arc<dyn Clock>,
}

impl DiskTier {
    /// Open a disk tier rooted at `root`, creating the directory with
    /// owner-only permissions if needed.
    pub fn new(
        root: impl Into<PathBuf>,
        max_file_size: u64,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StorageError::io(&root, e))?;
        restrict_dir_permissions(&root);

        Ok(Self {
            root,
            max_file_size,
            clock,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read an entry. Expired, oversized or unreadable files are deleted
    /// and reported as absent. Returns the value together with its
    /// absolute expiry so the caller can promote it with the remaining
    /// TTL.
    pub fn get(&self, key: &str) -> Option<(Value, DateTime<Utc>)> {
        let path = self.file_path(key);

        let metadata = fs::metadata(&path).ok()?;
        if metadata.len() > self.max_file_size {
            logger::warning(
                LogTag::Disk,
                &format!("Cache file over size limit, deleting: {}", path.display()),
            );
            let _ = fs::remove_file(&path);
            return None;
        }

        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) => {
                logger::warning(
                    LogTag::Disk,
                    &format!("Failed to read cache file {}: {}", path.display(), e),
                );
                return None;
            }
        };

        let envelope: DiskEnvelope = match serde_json::from_slice(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                logger::warning(
                    LogTag::Disk,
                    &format!("Unreadable cache file, deleting: {} ({})", path.display(), e),
                );
                let _ = fs::remove_file(&path);
                return None;
            }
        };

        if self.clock.now() >= envelope.expires_at {
            let _ = fs::remove_file(&path);
            return None;
        }

        Some((envelope.value, envelope.expires_at))
    }

    /// Write an entry atomically: serialize, size-check, temp file in the
    /// same directory, rename into place.
    pub fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), StorageError> {
        let now = self.clock.now();
        let envelope = DiskEnvelope {
            key: key.to_string(),
            created_at: now,
            expires_at: expiry_after(now, ttl),
            value,
        };

        let raw = serde_json::to_vec(&envelope).map_err(|e| StorageError::io(&self.root, e))?;
        if raw.len() as u64 > self.max_file_size {
            return Err(StorageError::EntryTooLarge {
                key: key.to_string(),
                size: raw.len(),
                limit: self.max_file_size as usize,
            });
        }

        let path = self.file_path(key);
        let mut tmp = NamedTempFile::new_in(&self.root).map_err(|e| StorageError::io(&self.root, e))?;
        tmp.write_all(&raw).map_err(|e| StorageError::io(tmp.path(), e))?;
        restrict_file_permissions(tmp.path());
        tmp.persist(&path).map_err(|e| StorageError::io(&path, e.error))?;

        Ok(())
    }

    /// Remove one key; true if a file was deleted.
    pub fn delete(&self, key: &str) -> bool {
        fs::remove_file(self.file_path(key)).is_ok()
    }

    /// Remove every cache file under the root.
    pub fn clear(&self) -> usize {
        let mut removed = 0;
        for path in self.cache_files() {
            if fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        removed
    }

    /// Entry count and total bytes on disk.
    pub fn stats(&self) -> (usize, u64) {
        let mut entries = 0;
        let mut bytes = 0;
        for path in self.cache_files() {
            if let Ok(metadata) = fs::metadata(&path) {
                entries += 1;
                bytes += metadata.len();
            }
        }
        (entries, bytes)
    }

    /// Periodic sweep: delete expired or unreadable envelopes.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        for path in self.cache_files() {
            let live = fs::read(&path)
                .ok()
                .and_then(|raw| serde_json::from_slice::<DiskEnvelope>(&raw).ok())
                .map(|envelope| now < envelope.expires_at)
                .unwrap_or(false);
            if !live && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        removed
    }

    /// Delete entries whose logical key matches the predicate.
    pub fn delete_matching<F: Fn(&str) -> bool>(&self, pred: F) -> usize {
        let mut removed = 0;
        for path in self.cache_files() {
            let matches = fs::read(&path)
                .ok()
                .and_then(|raw| serde_json::from_slice::<DiskEnvelope>(&raw).ok())
                .map(|envelope| pred(&envelope.key))
                .unwrap_or(false);
            if matches && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        removed
    }

    fn cache_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        if let Ok(entries) = fs::read_dir(&self.root) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path
                    .extension()
                    .map(|ext| ext == CACHE_FILE_EXT)
                    .unwrap_or(false)
                {
                    files.push(path);
                }
            }
        }
        files
    }

    /// Fixed-width, filesystem-safe filename for a cache key.
    fn file_path(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let name = format!("{:x}", hasher.finalize());
        self.root.join(format!("{}.{}", name, CACHE_FILE_EXT))
    }
}

#[cfg(unix)]
fn restrict_dir_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o700));
}

#[cfg(not(unix))]
fn restrict_dir_permissions(_path: &Path) {}

#[cfg(unix)]
fn restrict_file_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
}

#[cfg(not(unix))]
fn restrict_file_permissions(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;
    use tempfile::TempDir;

    const MAX_SIZE: u64 = 1024 * 1024;

    fn tier_in(dir: &TempDir) -> (DiskTier, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let tier = DiskTier::new(dir.path(), MAX_SIZE, clock.clone()).unwrap();
        (tier, clock)
    }

    #[test]
    fn roundtrip_and_expiry() {
        let dir = TempDir::new().unwrap();
        let (tier, clock) = tier_in(&dir);

        tier.set("key", json!({"soc": 87}), Duration::from_secs(60)).unwrap();
        let (value, _) = tier.get("key").unwrap();
        assert_eq!(value, json!({"soc": 87}));

        clock.advance(Duration::from_secs(60));
        assert!(tier.get("key").is_none());
        // The expired file is gone, not just hidden
        assert_eq!(tier.stats().0, 0);
    }

    #[test]
    fn survives_reopen_over_same_root() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));

        {
            let tier = DiskTier::new(dir.path(), MAX_SIZE, clock.clone()).unwrap();
            tier.set("key", json!([1, 2, 3]), Duration::from_secs(3600)).unwrap();
        }

        let reopened = DiskTier::new(dir.path(), MAX_SIZE, clock).unwrap();
        let (value, _) = reopened.get("key").unwrap();
        assert_eq!(value, json!([1, 2, 3]));
    }

    #[test]
    fn filenames_are_fixed_width_hashes() {
        let dir = TempDir::new().unwrap();
        let (tier, _clock) = tier_in(&dir);

        // Hostile key content never reaches the filesystem layer
        tier.set("../../etc/passwd:\u{0}:weird", json!(1), Duration::from_secs(60)).unwrap();

        let files = tier.cache_files();
        assert_eq!(files.len(), 1);
        let name = files[0].file_stem().unwrap().to_str().unwrap();
        assert_eq!(name.len(), 64);
        assert!(name.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn corrupt_file_treated_as_absent_and_removed() {
        let dir = TempDir::new().unwrap();
        let (tier, _clock) = tier_in(&dir);

        tier.set("key", json!(1), Duration::from_secs(60)).unwrap();
        let path = tier.cache_files().pop().unwrap();
        fs::write(&path, b"not json at all").unwrap();

        assert!(tier.get("key").is_none());
        assert!(!path.exists());
    }

    #[test]
    fn oversized_write_is_refused() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let tier = DiskTier::new(dir.path(), 64, clock).unwrap();

        let big = json!({ "data": "x".repeat(500) });
        let err = tier.set("key", big, Duration::from_secs(60)).unwrap_err();
        assert!(matches!(err, StorageError::EntryTooLarge { .. }));
        assert_eq!(tier.stats().0, 0);
    }

    #[test]
    fn purge_sweeps_expired_files() {
        let dir = TempDir::new().unwrap();
        let (tier, clock) = tier_in(&dir);

        tier.set("short", json!(1), Duration::from_secs(10)).unwrap();
        tier.set("long", json!(2), Duration::from_secs(1000)).unwrap();

        clock.advance(Duration::from_secs(30));
        assert_eq!(tier.purge_expired(), 1);
        assert_eq!(tier.stats().0, 1);
        assert!(tier.get("long").is_some());
    }

    #[test]
    fn delete_matching_recovers_keys_from_envelopes() {
        let dir = TempDir::new().unwrap();
        let (tier, _clock) = tier_in(&dir);

        tier.set("realtime:SN1:0:all", json!(1), Duration::from_secs(60)).unwrap();
        tier.set("realtime:SN2:0:all", json!(2), Duration::from_secs(60)).unwrap();

        let removed = tier.delete_matching(|key| key.split(':').nth(1) == Some("SN1"));
        assert_eq!(removed, 1);
        assert!(tier.get("realtime:SN1:0:all").is_none());
        assert!(tier.get("realtime:SN2:0:all").is_some());
    }
}
