//! Read-through caching of remote API payloads
//!
//! [`ReadThroughCache::get_or_fetch`] serves a fresh stored payload when one
//! exists and otherwise performs exactly one fetch, stores the result with a
//! TTL, and returns it. Fetch failures are never cached. Store failures are
//! never treated as misses.
//!
//! Concurrent callers that miss on the same key may each fetch; the store
//! keeps the last write. There is no in-flight deduplication.

mod memory;
mod redis_store;
mod store;

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use store::KeyValueStore;

use crate::{Error, Result};

/// Cache-or-fetch wrapper around a [`KeyValueStore`]
pub struct ReadThroughCache {
    store: Arc<dyn KeyValueStore>,
    default_ttl: Duration,
    stats: CacheStats,
}

/// Cache statistics tracked atomically
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Fresh entries served from the store
    pub hits: AtomicU64,
    /// Lookups that found no fresh entry
    pub misses: AtomicU64,
    /// Fetches that failed and were propagated
    pub fetch_failures: AtomicU64,
    /// Store reads or writes that failed
    pub store_errors: AtomicU64,
}

impl CacheStats {
    /// Calculate hit rate as a fraction (0.0-1.0)
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let total = hits + self.misses.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

impl ReadThroughCache {
    /// Create a cache over `store`, using `default_ttl` when a call gives none
    pub fn new(store: Arc<dyn KeyValueStore>, default_ttl: Duration) -> Self {
        Self {
            store,
            default_ttl,
            stats: CacheStats::default(),
        }
    }

    /// Default lifetime of stored payloads
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Name of the underlying store backend
    pub fn backend_type(&self) -> &'static str {
        self.store.backend_type()
    }

    /// Return the stored payload for `key` if fresh, otherwise fetch and store it
    ///
    /// `ttl` of `None` selects the default TTL.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] for an empty key or a zero TTL
    /// - [`Error::StoreUnavailable`] if the store cannot be read or written;
    ///   no fetch is attempted when the read fails
    /// - whatever `fetch` returned, unchanged, if the fetch fails
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: &str,
        fetch: F,
        ttl: Option<Duration>,
    ) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        let ttl = ttl.unwrap_or(self.default_ttl);
        if key.is_empty() {
            return Err(Error::InvalidArgument("cache key must not be empty".to_string()));
        }
        if ttl.is_zero() {
            return Err(Error::InvalidArgument("cache ttl must be positive".to_string()));
        }

        let stored = self.store.get(key).await.inspect_err(|e| {
            self.stats.store_errors.fetch_add(1, Ordering::Relaxed);
            warn!(key = %key, error = %e, "Cache lookup failed");
        })?;

        if let Some(bytes) = stored {
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(value) => {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %key, "Cache hit");
                    return Ok(value);
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                }
            }
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, ttl_secs = ttl.as_secs(), "Cache miss, fetching");

        let value = fetch().await.inspect_err(|e| {
            self.stats.fetch_failures.fetch_add(1, Ordering::Relaxed);
            warn!(key = %key, error = %e, "Fetch failed, nothing cached");
        })?;

        let bytes = serde_json::to_vec(&value)?;
        self.store.set(key, &bytes, ttl).await.inspect_err(|e| {
            self.stats.store_errors.fetch_add(1, Ordering::Relaxed);
            warn!(key = %key, error = %e, "Cache write failed");
        })?;

        Ok(value)
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            backend: self.store.backend_type(),
            default_ttl_secs: self.default_ttl.as_secs(),
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            fetch_failures: self.stats.fetch_failures.load(Ordering::Relaxed),
            store_errors: self.stats.store_errors.load(Ordering::Relaxed),
            hit_rate: self.stats.hit_rate(),
        }
    }
}

/// Snapshot of cache statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStatsSnapshot {
    /// Store backend name
    pub backend: &'static str,
    /// Default TTL in seconds
    pub default_ttl_secs: u64,
    /// Total cache hits
    pub hits: u64,
    /// Total cache misses
    pub misses: u64,
    /// Failed fetches
    pub fetch_failures: u64,
    /// Failed store operations
    pub store_errors: u64,
    /// Hit rate (0.0-1.0)
    pub hit_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn memory_cache() -> (Arc<MemoryStore>, ReadThroughCache) {
        let store = Arc::new(MemoryStore::new());
        let cache = ReadThroughCache::new(store.clone(), Duration::from_secs(3600));
        (store, cache)
    }

    /// Store whose every operation fails, as when Redis is down
    struct DownStore;

    #[async_trait]
    impl KeyValueStore for DownStore {
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            Err(Error::StoreUnavailable("connection refused".to_string()))
        }

        async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<()> {
            Err(Error::StoreUnavailable("connection refused".to_string()))
        }

        fn backend_type(&self) -> &'static str {
            "down"
        }
    }

    /// Store that reads fine but rejects writes
    struct ReadOnlyStore;

    #[async_trait]
    impl KeyValueStore for ReadOnlyStore {
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<()> {
            Err(Error::StoreUnavailable("READONLY".to_string()))
        }

        fn backend_type(&self) -> &'static str {
            "readonly"
        }
    }

    /// Memory store that records every write in order
    #[derive(Default)]
    struct RecordingStore {
        inner: MemoryStore,
        writes: parking_lot::Mutex<Vec<Vec<u8>>>,
    }

    impl RecordingStore {
        fn writes(&self) -> Vec<Value> {
            self.writes
                .lock()
                .iter()
                .map(|bytes| serde_json::from_slice(bytes).unwrap())
                .collect()
        }
    }

    #[async_trait]
    impl KeyValueStore for RecordingStore {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
            self.writes.lock().push(value.to_vec());
            self.inner.set(key, value, ttl).await
        }

        fn backend_type(&self) -> &'static str {
            "recording"
        }
    }

    #[tokio::test]
    async fn test_miss_fetches_once_and_stores() {
        let (store, cache) = memory_cache();
        let calls = AtomicUsize::new(0);
        let payload = json!({"users": [{"id": 1, "name": "Ada"}]});

        let value = cache
            .get_or_fetch(
                "lms:users",
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(payload.clone())
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(value, payload);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stored = store.get("lms:users").await.unwrap().unwrap();
        assert_eq!(serde_json::from_slice::<Value>(&stored).unwrap(), payload);
    }

    #[tokio::test]
    async fn test_hit_avoids_fetch() {
        let (store, cache) = memory_cache();
        store
            .set("lms:courses", br#"{"courses":[]}"#, Duration::from_secs(60))
            .await
            .unwrap();
        let calls = AtomicUsize::new(0);

        let value = cache
            .get_or_fetch(
                "lms:courses",
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!("should not be fetched"))
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(value, json!({"courses": []}));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 0);
    }

    #[tokio::test]
    async fn test_hot_path_fetches_once() {
        let (_store, cache) = memory_cache();
        let calls = AtomicUsize::new(0);

        for _ in 0..5 {
            let value = cache
                .get_or_fetch(
                    "lms:users",
                    || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(json!({"users": [1, 2]}))
                    },
                    None,
                )
                .await
                .unwrap();
            assert_eq!(value, json!({"users": [1, 2]}));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.hits, 4);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.8).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_expiry_triggers_refetch() {
        let (store, cache) = memory_cache();
        let calls = AtomicUsize::new(0);
        let ttl = Some(Duration::from_millis(20));

        let fetch = |n: u64| {
            let calls = &calls;
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Error>(json!({"version": n}))
            }
        };

        let first = cache.get_or_fetch("lms:users", fetch(1), ttl).await.unwrap();
        assert_eq!(first, json!({"version": 1}));

        tokio::time::sleep(Duration::from_millis(40)).await;

        let second = cache.get_or_fetch("lms:users", fetch(2), ttl).await.unwrap();
        assert_eq!(second, json!({"version": 2}));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let stored = store.get("lms:users").await.unwrap().unwrap();
        assert_eq!(
            serde_json::from_slice::<Value>(&stored).unwrap(),
            json!({"version": 2})
        );
    }

    #[tokio::test]
    async fn test_fetch_failure_is_not_cached() {
        let (store, cache) = memory_cache();

        let result = cache
            .get_or_fetch(
                "lms:users",
                || async {
                    Err(Error::FetchFailed {
                        status: Some(503),
                        message: "LMS unavailable".to_string(),
                    })
                },
                None,
            )
            .await;

        assert!(matches!(
            result,
            Err(Error::FetchFailed {
                status: Some(503),
                ..
            })
        ));
        assert_eq!(store.get("lms:users").await.unwrap(), None);
        assert_eq!(cache.stats().fetch_failures, 1);

        // The next call fetches again rather than serving a cached failure
        let value = cache
            .get_or_fetch("lms:users", || async { Ok(json!([])) }, None)
            .await
            .unwrap();
        assert_eq!(value, json!([]));
    }

    #[tokio::test]
    async fn test_failed_refresh_of_expired_entry_writes_nothing() {
        let store = Arc::new(RecordingStore::default());
        let cache = ReadThroughCache::new(store.clone(), Duration::from_secs(3600));
        store
            .inner
            .set("lms:users", br#"{"users":["stale"]}"#, Duration::from_millis(20))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        let calls = AtomicUsize::new(0);
        let result = cache
            .get_or_fetch(
                "lms:users",
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Error::FetchFailed {
                        status: Some(502),
                        message: "LMS returned 502 Bad Gateway".to_string(),
                    })
                },
                None,
            )
            .await;

        assert!(matches!(result, Err(Error::FetchFailed { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(store.writes().is_empty());
        assert_eq!(store.get("lms:users").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_concurrent_misses_each_fetch_and_last_write_wins() {
        let store = Arc::new(RecordingStore::default());
        let cache = ReadThroughCache::new(store.clone(), Duration::from_secs(3600));
        let calls = AtomicUsize::new(0);
        // Neither fetch completes until both callers have missed
        let barrier = tokio::sync::Barrier::new(2);

        let fetch = |writer: u64| {
            let calls = &calls;
            let barrier = &barrier;
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                barrier.wait().await;
                Ok::<_, Error>(json!({"writer": writer}))
            }
        };

        let (first, second) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(
                cache.get_or_fetch("lms:users", fetch(1), None),
                cache.get_or_fetch("lms:users", fetch(2), None),
            )
        })
        .await
        .unwrap();

        assert_eq!(first.unwrap(), json!({"writer": 1}));
        assert_eq!(second.unwrap(), json!({"writer": 2}));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().misses, 2);

        let writes = store.writes();
        assert_eq!(writes.len(), 2);
        let stored = store.get("lms:users").await.unwrap().unwrap();
        assert_eq!(
            serde_json::from_slice::<Value>(&stored).unwrap(),
            writes[1]
        );
    }

    #[tokio::test]
    async fn test_store_failure_skips_fetch() {
        let cache = ReadThroughCache::new(Arc::new(DownStore), Duration::from_secs(3600));
        let calls = AtomicUsize::new(0);

        let result = cache
            .get_or_fetch(
                "lms:users",
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({}))
                },
                None,
            )
            .await;

        assert!(matches!(result, Err(Error::StoreUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.stats().store_errors, 1);
    }

    #[tokio::test]
    async fn test_store_write_failure_is_reported() {
        let cache = ReadThroughCache::new(Arc::new(ReadOnlyStore), Duration::from_secs(3600));

        let result = cache
            .get_or_fetch("lms:courses", || async { Ok(json!([])) }, None)
            .await;

        assert!(matches!(result, Err(Error::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_refetched() {
        let (store, cache) = memory_cache();
        store
            .set("lms:users", b"not json", Duration::from_secs(60))
            .await
            .unwrap();

        let value = cache
            .get_or_fetch("lms:users", || async { Ok(json!({"users": []})) }, None)
            .await
            .unwrap();

        assert_eq!(value, json!({"users": []}));
        let stored = store.get("lms:users").await.unwrap().unwrap();
        assert_eq!(stored, br#"{"users":[]}"#.to_vec());
    }

    #[tokio::test]
    async fn test_rejects_empty_key_and_zero_ttl() {
        let (_store, cache) = memory_cache();

        let empty_key = cache
            .get_or_fetch("", || async { Ok(json!(1)) }, None)
            .await;
        assert!(matches!(empty_key, Err(Error::InvalidArgument(_))));

        let zero_ttl = cache
            .get_or_fetch("lms:users", || async { Ok(json!(1)) }, Some(Duration::ZERO))
            .await;
        assert!(matches!(zero_ttl, Err(Error::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let (_store, cache) = memory_cache();

        cache
            .get_or_fetch("lms:users", || async { Ok(json!("users")) }, None)
            .await
            .unwrap();
        let courses = cache
            .get_or_fetch("lms:courses", || async { Ok(json!("courses")) }, None)
            .await
            .unwrap();

        assert_eq!(courses, json!("courses"));
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn test_stats_snapshot_defaults() {
        let (_store, cache) = memory_cache();
        let stats = cache.stats();
        assert_eq!(stats.backend, "memory");
        assert_eq!(stats.default_ttl_secs, 3600);
        assert_eq!(stats.hits, 0);
        assert!(stats.hit_rate.abs() < f64::EPSILON);
    }
}
