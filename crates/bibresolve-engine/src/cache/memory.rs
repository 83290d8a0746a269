use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::debug;

use super::CacheStats;

#[derive(Debug)]
struct Slot {
    value: String,
    expires_at: Option<Instant>,
    tick: u64,
}

#[derive(Debug, Default)]
struct Inner {
    slots: HashMap<String, Slot>,
    /// Recency order: lowest tick is least recently used.
    order: BTreeMap<u64, String>,
    next_tick: u64,
    stats: CacheStats,
}

impl Inner {
    fn touch(&mut self, key: &str) {
        let tick = self.next_tick;
        self.next_tick += 1;
        if let Some(slot) = self.slots.get_mut(key) {
            self.order.remove(&slot.tick);
            slot.tick = tick;
            self.order.insert(tick, key.to_string());
        }
    }

    fn remove(&mut self, key: &str) -> Option<Slot> {
        let slot = self.slots.remove(key)?;
        self.order.remove(&slot.tick);
        Some(slot)
    }

    fn evict_lru(&mut self) {
        if let Some((_, key)) = self.order.pop_first() {
            self.slots.remove(&key);
            self.stats.evictions += 1;
            debug!("memory cache evicted {key}");
        }
    }
}

/// Fixed-capacity in-process tier with per-entry TTL and LRU eviction.
#[derive(Debug)]
pub struct MemoryCache {
    capacity: usize,
    default_ttl: Duration,
    inner: Mutex<Inner>,
}

impl MemoryCache {
    /// `default_ttl` of zero keeps entries until LRU pressure removes them.
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            default_ttl,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let mut inner = self.lock();
        let expired = match inner.slots.get(key) {
            None => {
                inner.stats.misses += 1;
                return None;
            }
            Some(slot) => slot.expires_at.is_some_and(|t| Instant::now() >= t),
        };

        if expired {
            inner.remove(key);
            inner.stats.misses += 1;
            debug!("memory cache entry expired: {key}");
            return None;
        }

        inner.touch(key);
        inner.stats.hits += 1;
        inner.slots.get(key).map(|slot| slot.value.clone())
    }

    pub fn set(&self, key: &str, value: String) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    /// A zero `ttl` never expires by time.
    pub fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) {
        let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        let mut inner = self.lock();

        if let Some(slot) = inner.slots.get_mut(key) {
            slot.value = value;
            slot.expires_at = expires_at;
            inner.touch(key);
            return;
        }

        while inner.slots.len() >= self.capacity {
            inner.evict_lru();
        }

        let tick = inner.next_tick;
        inner.next_tick += 1;
        inner.order.insert(tick, key.to_string());
        inner.slots.insert(
            key.to_string(),
            Slot {
                value,
                expires_at,
                tick,
            },
        );
    }

    pub fn delete(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.slots.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            entries: inner.slots.len(),
            ..inner.stats
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_recently_used_is_evicted() {
        let cache = MemoryCache::new(2, Duration::ZERO);
        cache.set("a", "1".into());
        cache.set("b", "2".into());
        assert_eq!(cache.get("a").as_deref(), Some("1"));
        cache.set("c", "3".into());

        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a").as_deref(), Some("1"));
        assert_eq!(cache.get("c").as_deref(), Some("3"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn overwrite_keeps_single_slot() {
        let cache = MemoryCache::new(2, Duration::ZERO);
        cache.set("a", "1".into());
        cache.set("a", "2".into());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a").as_deref(), Some("2"));
    }

    #[test]
    fn expired_entry_is_dropped_on_read() {
        let cache = MemoryCache::new(4, Duration::ZERO);
        cache.set_with_ttl("k", "v".into(), Duration::from_secs(1));
        assert_eq!(cache.get("k").as_deref(), Some("v"));
        std::thread::sleep(Duration::from_millis(1100));
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_ttl_survives_time_but_not_pressure() {
        let cache = MemoryCache::new(1, Duration::ZERO);
        cache.set_with_ttl("k", "v".into(), Duration::ZERO);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(cache.get("k").as_deref(), Some("v"));
        cache.set("other", "x".into());
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn stats_track_hits_and_misses() {
        let cache = MemoryCache::new(4, Duration::from_secs(60));
        cache.set("k", "v".into());
        cache.get("k");
        cache.get("nope");
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
        assert!(cache.delete("k"));
        assert!(!cache.delete("k"));
    }
}
