//! Caching layer for metadata lookups.
//!
//! Stop lists, stop names and similar static identifiers are resolved once
//! per provider instance and then treated as static. Entries never expire
//! on their own; they are written once per key and only dropped by an
//! explicit `invalidate_all`, which providers use after an unrecoverable
//! resolution failure.

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use moka::future::Cache as MokaCache;

use crate::fetch::FetchError;

/// Configuration for a lookup cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached entries.
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 1000,
        }
    }
}

/// Write-once cache keyed by a composite lookup key.
pub struct LookupCache<K, V> {
    entries: MokaCache<K, Arc<V>>,
}

impl<K, V> LookupCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Create a new cache with the given configuration.
    pub fn new(config: &CacheConfig) -> Self {
        let entries = MokaCache::builder()
            .max_capacity(config.max_capacity)
            .build();
        Self { entries }
    }

    /// Get a cached entry.
    pub async fn get(&self, key: &K) -> Option<Arc<V>> {
        self.entries.get(key).await
    }

    /// Return the cached value for `key`, fetching and storing it on a miss.
    ///
    /// Failed fetches are not cached, so the next caller retries.
    pub async fn get_or_fetch<F, Fut>(&self, key: K, fetch: F) -> Result<Arc<V>, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, FetchError>>,
    {
        // Try cache first
        if let Some(cached) = self.entries.get(&key).await {
            return Ok(cached);
        }

        let value = Arc::new(fetch().await?);
        self.entries.insert(key, value.clone()).await;
        Ok(value)
    }

    /// Invalidate all cached entries.
    pub fn invalidate_all(&self) {
        self.entries.invalidate_all();
    }
}

impl<K, V> Default for LookupCache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn fetches_once_per_key() {
        let cache: LookupCache<(String, u8), String> = LookupCache::default();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_fetch(("274".to_string(), 1), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("TAI PO MARKET".to_string())
                })
                .await
                .unwrap();
            assert_eq!(value.as_str(), "TAI PO MARKET");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let cache: LookupCache<String, String> = LookupCache::default();

        let err = cache
            .get_or_fetch("A".to_string(), || async {
                Err(FetchError::Status {
                    status: 500,
                    message: String::new(),
                })
            })
            .await;
        assert!(err.is_err());
        assert!(cache.get(&"A".to_string()).await.is_none());

        let ok = cache
            .get_or_fetch("A".to_string(), || async { Ok("value".to_string()) })
            .await
            .unwrap();
        assert_eq!(ok.as_str(), "value");
    }

    #[tokio::test]
    async fn invalidate_clears_entries() {
        let cache: LookupCache<String, String> = LookupCache::default();
        cache
            .get_or_fetch("A".to_string(), || async { Ok("value".to_string()) })
            .await
            .unwrap();
        assert!(cache.get(&"A".to_string()).await.is_some());

        cache.invalidate_all();
        assert!(cache.get(&"A".to_string()).await.is_none());
    }

    #[test]
    fn default_config() {
        assert_eq!(CacheConfig::default().max_capacity, 1000);
    }
}
