use std::{
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use cadence_config::CacheConfig;
use indexmap::IndexMap;
use tokio::time::Instant;

use crate::CacheError;

/// Hit, miss and eviction counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries removed for capacity or expiry
    pub evictions: u64,
}

struct Entry<V> {
    value: V,
    /// `None` when the TTL reaches past the clock's range
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

struct Inner<V> {
    // Ordered least recently used first
    entries: IndexMap<String, Entry<V>>,
    stats: CacheStats,
}

/// Bounded response cache with least-recently-used eviction and per-entry expiry
///
/// Safe to share across concurrent requests; the LRU ordering and counters
/// sit behind one mutex that is never held across an await point.
pub struct ResponseCache<V> {
    inner: Mutex<Inner<V>>,
    capacity: usize,
    default_ttl: Duration,
}

impl<V> std::fmt::Debug for ResponseCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("capacity", &self.capacity)
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

impl<V: Clone> ResponseCache<V> {
    /// Create a cache holding at most `capacity` entries
    pub fn new(capacity: usize, default_ttl: Duration) -> Result<Self, CacheError> {
        if capacity == 0 {
            return Err(CacheError::Config("cache capacity must be > 0".to_string()));
        }

        Ok(Self {
            inner: Mutex::new(Inner {
                entries: IndexMap::with_capacity(capacity),
                stats: CacheStats::default(),
            }),
            capacity,
            default_ttl,
        })
    }

    /// Create from configuration, `None` when caching is disabled
    pub fn from_config(config: &CacheConfig) -> Result<Option<Self>, CacheError> {
        if !config.enabled {
            return Ok(None);
        }

        let ttl = duration_str::parse(&config.ttl)
            .map_err(|e| CacheError::Config(format!("invalid duration '{}': {e}", config.ttl)))?;

        Self::new(config.capacity, ttl).map(Some)
    }

    /// Look up a live entry and mark it most recently used
    ///
    /// An expired entry is evicted and counted as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut inner = self.lock();

        let Some(index) = inner.entries.get_index_of(key) else {
            inner.stats.misses += 1;
            tracing::debug!(cache_key = key, "cache miss");
            return None;
        };

        if inner.entries[index].is_expired(now) {
            inner.entries.shift_remove_index(index);
            inner.stats.misses += 1;
            inner.stats.evictions += 1;
            tracing::debug!(cache_key = key, "cache entry expired");
            return None;
        }

        let last = inner.entries.len() - 1;
        inner.entries.move_index(index, last);
        inner.stats.hits += 1;
        tracing::debug!(cache_key = key, "cache hit");

        Some(inner.entries[last].value.clone())
    }

    /// Store a value that expires after `ttl`
    ///
    /// Evicts the least recently used entry first when the cache is full.
    pub fn put(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let expires_at = Instant::now().checked_add(ttl);
        let mut inner = self.lock();

        if inner.entries.shift_remove(&key).is_none() && inner.entries.len() >= self.capacity {
            if let Some((evicted, _)) = inner.entries.shift_remove_index(0) {
                inner.stats.evictions += 1;
                tracing::debug!(cache_key = %evicted, "evicted least recently used entry");
            }
        }

        tracing::debug!(cache_key = %key, ttl_secs = ttl.as_secs(), "cached response");
        inner.entries.insert(key, Entry { value, expires_at });
    }

    /// Store a value with the configured default TTL
    pub fn put_default(&self, key: impl Into<String>, value: V) {
        self.put(key, value, self.default_ttl);
    }

    /// Remove every entry, keeping the counters
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Number of stored entries, including ones that expired but were not yet read
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub const fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn cache(capacity: usize) -> ResponseCache<String> {
        ResponseCache::new(capacity, Duration::from_secs(60)).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn get_returns_value_until_expiry() {
        let cache = cache(4);
        cache.put("k", "response".to_owned(), Duration::from_secs(10));

        tokio::time::advance(Duration::from_millis(9_999)).await;
        assert_eq!(cache.get("k").as_deref(), Some("response"));

        // Expiry is strict: now == put_time + ttl is already expired
        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn put_evicts_least_recently_used() {
        let cache = cache(2);
        cache.put_default("a", "1".to_owned());
        cache.put_default("b", "2".to_owned());

        // Touch "a" so "b" becomes the eviction candidate
        assert!(cache.get("a").is_some());
        cache.put_default("c", "3".to_owned());

        assert_eq!(cache.len(), 2);
        assert!(cache.get("b").is_none());
        assert_eq!(cache.get("a").as_deref(), Some("1"));
        assert_eq!(cache.get("c").as_deref(), Some("3"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn overwriting_key_does_not_evict() {
        let cache = cache(2);
        cache.put_default("a", "1".to_owned());
        cache.put_default("b", "2".to_owned());
        cache.put_default("a", "updated".to_owned());

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").as_deref(), Some("updated"));
        assert_eq!(cache.get("b").as_deref(), Some("2"));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn overwrite_refreshes_expiry() {
        let cache = cache(2);
        cache.put("a", "1".to_owned(), Duration::from_secs(5));
        tokio::time::advance(Duration::from_secs(4)).await;
        cache.put("a", "2".to_owned(), Duration::from_secs(5));
        tokio::time::advance(Duration::from_secs(4)).await;

        assert_eq!(cache.get("a").as_deref(), Some("2"));
    }

    #[tokio::test(start_paused = true)]
    async fn put_with_huge_ttl_does_not_panic() {
        let cache = cache(2);
        cache.put("k", "forever".to_owned(), Duration::MAX);

        tokio::time::advance(Duration::from_secs(86_400 * 365)).await;
        assert_eq!(cache.get("k").as_deref(), Some("forever"));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn zero_capacity_rejected() {
        let err = ResponseCache::<String>::new(0, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, CacheError::Config(_)));
    }

    #[test]
    fn from_config_disabled_yields_none() {
        let config = CacheConfig::default();
        assert!(ResponseCache::<String>::from_config(&config).unwrap().is_none());

        let config = CacheConfig {
            enabled: true,
            capacity: 8,
            ttl: "90s".to_owned(),
        };
        let cache = ResponseCache::<String>::from_config(&config).unwrap().unwrap();
        assert_eq!(cache.capacity(), 8);
        assert_eq!(cache.default_ttl(), Duration::from_secs(90));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_puts_respect_capacity() {
        let cache = Arc::new(cache(16));

        let handles: Vec<_> = (0..64)
            .map(|i| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move {
                    cache.put_default(format!("key-{i}"), i.to_string());
                    cache.get(&format!("key-{i}"))
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.len(), 16);
    }
}
