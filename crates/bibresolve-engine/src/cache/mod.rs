//! Two-tier cache: an in-memory LRU in front of a file-backed store.
//!
//! `get` checks memory first and promotes disk hits into memory; `set`
//! writes through to every enabled tier. Either tier may be switched off.

mod disk;
mod memory;

use std::time::Duration;

use bibresolve_core::config::CacheConfig;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

pub use disk::DiskCache;
pub use memory::MemoryCache;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStoreStats {
    pub memory: Option<CacheStats>,
    pub disk: Option<CacheStats>,
}

#[derive(Debug, Default)]
pub struct CacheStore {
    memory: Option<MemoryCache>,
    disk: Option<DiskCache>,
}

impl CacheStore {
    pub fn new(memory: Option<MemoryCache>, disk: Option<DiskCache>) -> Self {
        Self { memory, disk }
    }

    /// A store that caches nothing.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn memory_only(capacity: usize, ttl: Duration) -> Self {
        Self::new(Some(MemoryCache::new(capacity, ttl)), None)
    }

    /// Build the enabled tiers. An unusable disk directory disables the disk
    /// tier rather than failing.
    pub fn from_config(cfg: &CacheConfig) -> Self {
        let memory = cfg.memory_enabled.then(|| {
            MemoryCache::new(cfg.memory_capacity, Duration::from_secs(cfg.memory_ttl_secs))
        });

        let disk = if cfg.disk_enabled {
            let dir = cfg.resolved_disk_dir();
            match DiskCache::new(&dir, Duration::from_secs(cfg.disk_ttl_secs)) {
                Ok(disk) => Some(disk),
                Err(e) => {
                    warn!("disk cache disabled, cannot use {}: {e}", dir.display());
                    None
                }
            }
        } else {
            None
        };

        Self::new(memory, disk)
    }

    pub fn memory(&self) -> Option<&MemoryCache> {
        self.memory.as_ref()
    }

    pub fn disk(&self) -> Option<&DiskCache> {
        self.disk.as_ref()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if let Some(memory) = &self.memory
            && let Some(value) = memory.get(key)
        {
            debug!("cache hit (memory): {key}");
            return Some(value);
        }

        let value = self.disk.as_ref()?.get(key)?;
        debug!("cache hit (disk): {key}");
        if let Some(memory) = &self.memory {
            memory.set(key, value.clone());
        }
        Some(value)
    }

    /// Write through to every tier using each tier's default TTL.
    pub fn set(&self, key: &str, value: &str) {
        if let Some(memory) = &self.memory {
            memory.set(key, value.to_string());
        }
        if let Some(disk) = &self.disk {
            disk.set(key, value);
        }
    }

    /// Write through with one TTL for both tiers. Zero never expires.
    pub fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) {
        if let Some(memory) = &self.memory {
            memory.set_with_ttl(key, value.to_string(), ttl);
        }
        if let Some(disk) = &self.disk {
            disk.set_with_ttl(key, value, ttl);
        }
    }

    /// Typed read. A value that no longer deserializes is dropped.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("discarding undecodable cache entry {key}: {e}");
                self.delete(key);
                None
            }
        }
    }

    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(raw) => self.set(key, &raw),
            Err(e) => warn!("failed to serialize cache entry {key}: {e}"),
        }
    }

    pub fn delete(&self, key: &str) -> bool {
        let in_memory = self.memory.as_ref().is_some_and(|m| m.delete(key));
        let on_disk = self.disk.as_ref().is_some_and(|d| d.delete(key));
        in_memory || on_disk
    }

    pub fn clear(&self) {
        if let Some(memory) = &self.memory {
            memory.clear();
        }
        if let Some(disk) = &self.disk {
            let removed = disk.clear();
            debug!("cleared {removed} disk cache files");
        }
    }

    /// Sweep expired files from the disk tier.
    pub fn cleanup_expired(&self) -> usize {
        self.disk.as_ref().map_or(0, DiskCache::cleanup_expired)
    }

    pub fn stats(&self) -> CacheStoreStats {
        CacheStoreStats {
            memory: self.memory.as_ref().map(MemoryCache::stats),
            disk: self.disk.as_ref().map(DiskCache::stats),
        }
    }
}
