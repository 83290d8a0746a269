use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::CacheStats;
use crate::error::Result;

/// On-disk shape of one cached value. Timestamps are Unix milliseconds;
/// `expiry_ms == 0` never expires.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DiskRecord {
    value: String,
    expiry_ms: i64,
    created_at: i64,
    original_key: String,
}

impl DiskRecord {
    fn is_expired(&self, now_ms: i64) -> bool {
        self.expiry_ms != 0 && now_ms >= self.expiry_ms
    }
}

fn cache_key_to_path(dir: &Path, key: &str) -> PathBuf {
    let hash = Sha256::digest(key.as_bytes());
    dir.join(format!("{hash:x}.json"))
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Persistent tier: one self-describing JSON file per key.
#[derive(Debug)]
pub struct DiskCache {
    dir: PathBuf,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>, default_ttl: Duration) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Read `key`. Files that fail to parse or have expired are removed.
    pub fn get(&self, key: &str) -> Option<String> {
        let path = cache_key_to_path(&self.dir, key);
        let Ok(data) = fs::read(&path) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        let record: DiskRecord = match serde_json::from_slice(&data) {
            Ok(record) => record,
            Err(e) => {
                warn!("removing corrupted cache file {}: {e}", path.display());
                let _ = fs::remove_file(&path);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if record.is_expired(now_ms()) {
            debug!("disk cache entry expired: {key}");
            let _ = fs::remove_file(&path);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(record.value)
    }

    pub fn set(&self, key: &str, value: &str) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    /// Write failures are logged and otherwise ignored.
    pub fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) {
        let created_at = now_ms();
        let expiry_ms = if ttl.is_zero() {
            0
        } else {
            created_at.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
        };
        let record = DiskRecord {
            value: value.to_string(),
            expiry_ms,
            created_at,
            original_key: key.to_string(),
        };

        let path = cache_key_to_path(&self.dir, key);
        match serde_json::to_vec(&record) {
            Ok(data) => {
                if let Err(e) = fs::write(&path, data) {
                    warn!("failed to write cache file {}: {e}", path.display());
                }
            }
            Err(e) => warn!("failed to serialize cache entry {key}: {e}"),
        }
    }

    pub fn delete(&self, key: &str) -> bool {
        fs::remove_file(cache_key_to_path(&self.dir, key)).is_ok()
    }

    fn cache_files(&self) -> Vec<PathBuf> {
        let Ok(read_dir) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        read_dir
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect()
    }

    /// Remove every cache file; returns how many were deleted.
    pub fn clear(&self) -> usize {
        self.cache_files()
            .into_iter()
            .filter(|path| fs::remove_file(path).is_ok())
            .count()
    }

    /// Sweep expired and unreadable files; returns how many were deleted.
    pub fn cleanup_expired(&self) -> usize {
        let now = now_ms();
        let removed = self
            .cache_files()
            .into_iter()
            .filter(|path| {
                let stale = fs::read(path)
                    .ok()
                    .and_then(|data| serde_json::from_slice::<DiskRecord>(&data).ok())
                    .is_none_or(|record| record.is_expired(now));
                stale && fs::remove_file(path).is_ok()
            })
            .count();
        if removed > 0 {
            debug!("disk cache cleanup removed {removed} files");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.cache_files().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: 0,
            entries: self.len(),
        }
    }
}
