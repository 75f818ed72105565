use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub active_entries: usize,
    pub expired_entries: usize,
    pub cache_ttl: u64,
}

/// In-memory key/value store with per-entry expiry.
///
/// Expired entries are removed lazily by [`TtlCache::get`] or
/// [`TtlCache::clear`]; nothing runs in the background.
#[derive(Clone)]
pub struct TtlCache<V>
where
    V: Clone + Send + Sync,
{
    inner: Arc<Mutex<HashMap<String, CacheEntry<V>>>>,
    default_ttl: Duration,
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync,
{
    pub fn new() -> Self {
        Self::with_default_ttl(DEFAULT_TTL)
    }

    pub fn with_default_ttl(default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            default_ttl,
        }
    }

    /// Stores `value` under `key`, expiring after `ttl` (or the default).
    /// Returns false if the store could not be updated.
    pub fn set(&self, key: &str, value: V, ttl: Option<Duration>) -> bool {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let Ok(mut cache) = self.inner.lock() else {
            error!("Error setting cache for {}: lock poisoned", key);
            return false;
        };
        let now = Instant::now();
        cache.insert(
            key.to_string(),
            CacheEntry {
                value,
                created_at: now,
                expires_at: now + ttl,
            },
        );
        debug!("Cached {} with TTL {}s", key, ttl.as_secs_f64());
        true
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let Ok(mut cache) = self.inner.lock() else {
            error!("Error getting cache for {}: lock poisoned", key);
            return None;
        };
        let expired = match cache.get(key) {
            None => {
                debug!("Cache MISS for {}", key);
                return None;
            }
            Some(entry) => entry.is_expired(Instant::now()),
        };
        if expired {
            cache.remove(key);
            debug!("Cache expired for {}", key);
            return None;
        }
        cache.get(key).map(|entry| {
            debug!("Cache HIT for {} (age {:?})", key, entry.created_at.elapsed());
            entry.value.clone()
        })
    }

    /// Removes `key`, returning whether an entry was present.
    pub fn delete(&self, key: &str) -> bool {
        let Ok(mut cache) = self.inner.lock() else {
            error!("Error deleting cache for {}: lock poisoned", key);
            return false;
        };
        let removed = cache.remove(key).is_some();
        if removed {
            debug!("Deleted cache for {}", key);
        }
        removed
    }

    pub fn clear(&self) -> bool {
        let Ok(mut cache) = self.inner.lock() else {
            error!("Error clearing cache: lock poisoned");
            return false;
        };
        cache.clear();
        info!("Cleared all cache entries");
        true
    }

    /// Counts entries as of now. Expired entries that have not been read yet
    /// still count towards the total.
    pub fn stats(&self) -> CacheStats {
        let cache = match self.inner.lock() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = Instant::now();
        let expired_entries = cache.values().filter(|e| e.is_expired(now)).count();
        CacheStats {
            total_entries: cache.len(),
            active_entries: cache.len() - expired_entries,
            expired_entries,
            cache_ttl: self.default_ttl.as_secs(),
        }
    }
}

impl<V> Default for TtlCache<V>
where
    V: Clone + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_cache_set_get() {
        let cache = TtlCache::<i32>::new();

        // Initially, cache is empty
        assert!(cache.get("key1").is_none());

        assert!(cache.set("key1", 123, None));
        assert_eq!(cache.get("key1"), Some(123));

        // Get a non-existent key
        assert!(cache.get("key2").is_none());
    }

    #[test]
    fn test_cache_overwrite() {
        let cache = TtlCache::<String>::new();
        cache.set("key1", "a".to_string(), None);
        cache.set("key1", "b".to_string(), None);
        assert_eq!(cache.get("key1").as_deref(), Some("b"));
        assert_eq!(cache.stats().total_entries, 1);
    }

    #[test]
    fn test_cache_ttl_expiration() {
        let cache = TtlCache::<i32>::new();

        cache.set("key1", 123, Some(Duration::from_millis(20)));
        assert_eq!(cache.get("key1"), Some(123));

        sleep(Duration::from_millis(40));

        // Expired but not yet read: still counted
        let stats = cache.stats();
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.active_entries, 0);
        assert_eq!(stats.expired_entries, 1);

        assert!(cache.get("key1").is_none());
        assert_eq!(cache.stats().total_entries, 0);
    }

    #[test]
    fn test_cache_delete() {
        let cache = TtlCache::<i32>::new();

        cache.set("key1", 123, None);
        assert!(cache.delete("key1"));
        assert!(cache.get("key1").is_none());
        assert!(!cache.delete("key1"));
    }

    #[test]
    fn test_cache_clear() {
        let cache = TtlCache::<i32>::new();

        cache.set("key1", 123, None);
        cache.set("key2", 456, Some(Duration::from_millis(1)));
        sleep(Duration::from_millis(5));

        assert!(cache.clear());
        assert!(cache.get("key1").is_none());
        assert_eq!(cache.stats().total_entries, 0);
    }

    #[test]
    fn test_cache_stats() {
        let cache = TtlCache::<i32>::with_default_ttl(Duration::from_secs(60));
        cache.set("live", 1, None);
        cache.set("short", 2, Some(Duration::from_millis(5)));
        sleep(Duration::from_millis(20));

        assert_eq!(
            cache.stats(),
            CacheStats {
                total_entries: 2,
                active_entries: 1,
                expired_entries: 1,
                cache_ttl: 60,
            }
        );
    }

    #[test]
    fn test_cache_is_shared_between_clones() {
        let cache = TtlCache::<i32>::new();
        let other = cache.clone();
        cache.set("key1", 7, None);
        assert_eq!(other.get("key1"), Some(7));
    }
}
