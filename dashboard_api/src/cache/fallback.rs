//! Cache-first fetch that serves stale data when the upstream fails
//!
//! 1. a fresh entry (younger than the freshness window) is returned as is;
//! 2. otherwise the upstream is called, bounded by a timeout;
//! 3. a successful result is stored with the current timestamp and returned;
//! 4. a failed call falls back to the last stored entry whatever its age,
//!    or surfaces [`FallbackError::Unavailable`] if nothing was ever stored.
//!
//! There is no retry and no locking. Two requests missing the same key at
//! once both fetch and both write; the last write wins.

use super::{get_cached, set_with_timestamp, CacheStore};
use crate::upstream::UpstreamError;
use log::{debug, error, info, warn};
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum FallbackError {
    #[error("No data available for {key}: {source}")]
    Unavailable {
        key: String,
        #[source]
        source: UpstreamError,
    },
}

/// Freshness window and upstream deadline for one cache key
#[derive(Debug, Clone, Copy)]
pub struct FetchPolicy {
    pub ttl: Duration,
    pub timeout: Duration,
}

impl FetchPolicy {
    pub fn new(ttl_secs: u64, timeout: Duration) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_secs),
            timeout,
        }
    }
}

/// Where a payload came from
#[derive(Debug, Clone, PartialEq)]
pub enum Cached<T> {
    /// Cache hit inside the freshness window
    Fresh(T),
    /// Fetched from upstream and written back
    Refreshed(T),
    /// Upstream failed, last stored entry served
    Stale(T),
}

impl<T> Cached<T> {
    pub fn into_inner(self) -> T {
        match self {
            Cached::Fresh(data) | Cached::Refreshed(data) | Cached::Stale(data) => data,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Cached::Stale(_))
    }
}

pub async fn cached_fetch<T, F, Fut>(
    store: &dyn CacheStore,
    key: &str,
    policy: FetchPolicy,
    upstream: F,
) -> Result<Cached<T>, FallbackError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, UpstreamError>>,
{
    match get_cached::<T>(store, key, Some(policy.ttl)).await {
        Ok(Some(data)) => {
            debug!("Cache hit for {}", key);
            return Ok(Cached::Fresh(data));
        }
        Ok(None) => {}
        Err(e) => warn!("Cache read failed for {}, refreshing: {}", key, e),
    }

    let result = match tokio::time::timeout(policy.timeout, upstream()).await {
        Ok(result) => result,
        Err(_) => Err(UpstreamError::Timeout(policy.timeout)),
    };

    match result {
        Ok(data) => {
            if let Err(e) = set_with_timestamp(store, key, &data).await {
                warn!("Failed to store {} in cache: {}", key, e);
            }
            Ok(Cached::Refreshed(data))
        }
        Err(source) => {
            error!("Upstream fetch for {} failed: {}", key, source);
            match get_cached::<T>(store, key, None).await {
                Ok(Some(data)) => {
                    info!("Api call failed, returning last cache found for {}", key);
                    Ok(Cached::Stale(data))
                }
                Ok(None) => Err(FallbackError::Unavailable {
                    key: key.to_string(),
                    source,
                }),
                Err(e) => {
                    error!("Last-resort cache read failed for {}: {}", key, e);
                    Err(FallbackError::Unavailable {
                        key: key.to_string(),
                        source,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{now_ms, CacheEntry, MemoryCache};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn policy() -> FetchPolicy {
        FetchPolicy::new(300, Duration::from_secs(5))
    }

    async fn store_entry(store: &MemoryCache, key: &str, timestamp: i64, data: Value) {
        store
            .set(key, json!({"timestamp": timestamp, "data": data}).to_string())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_fresh_hit_skips_upstream() {
        let store = MemoryCache::new();
        store_entry(&store, "k", now_ms(), json!({"v": 1})).await;
        let calls = AtomicUsize::new(0);

        let result = cached_fetch(&store, "k", policy(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, UpstreamError>(json!({"v": 2}))
        })
        .await
        .unwrap();

        assert_eq!(result, Cached::Fresh(json!({"v": 1})));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_refresh_stores_returned_payload() {
        let store = MemoryCache::new();
        store_entry(&store, "k", now_ms() - 600_000, json!({"v": 1})).await;

        let result = cached_fetch(&store, "k", policy(), || async { Ok::<_, UpstreamError>(json!({"v": 2})) })
            .await
            .unwrap();
        assert_eq!(result, Cached::Refreshed(json!({"v": 2})));

        let raw = store.get("k").await.unwrap().unwrap();
        let entry: CacheEntry<Value> = serde_json::from_str(&raw).unwrap();
        assert_eq!(entry.data, json!({"v": 2}));
        assert!(now_ms() - entry.timestamp < 60_000);
    }

    #[tokio::test]
    async fn test_upstream_failure_serves_stale_entry_unmodified() {
        let store = MemoryCache::new();
        let payload = json!({"totalEvents": [{"profit": 1.5}]});
        store_entry(&store, "k", 1, payload.clone()).await;

        let result: Cached<Value> = cached_fetch(&store, "k", policy(), || async {
            Err(UpstreamError::unavailable("indexer", "connection refused"))
        })
        .await
        .unwrap();

        assert!(result.is_stale());
        assert_eq!(result.into_inner(), payload);

        // The stale entry is left untouched
        let raw = store.get("k").await.unwrap().unwrap();
        let entry: CacheEntry<Value> = serde_json::from_str(&raw).unwrap();
        assert_eq!(entry.timestamp, 1);
    }

    #[tokio::test]
    async fn test_upstream_failure_without_cache_is_unavailable() {
        let store = MemoryCache::new();

        let result: Result<Cached<Value>, FallbackError> =
            cached_fetch(&store, "k", policy(), || async {
                Err(UpstreamError::Status {
                    service: "indexer",
                    status: 502,
                })
            })
            .await;

        match result {
            Err(FallbackError::Unavailable { key, source }) => {
                assert_eq!(key, "k");
                assert!(matches!(source, UpstreamError::Status { status: 502, .. }));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_timeout_falls_back_to_stale() {
        let store = MemoryCache::new();
        store_entry(&store, "k", 1, json!("old")).await;
        let policy = FetchPolicy {
            ttl: Duration::from_secs(1),
            timeout: Duration::from_millis(20),
        };

        let result: Cached<Value> = cached_fetch(&store, "k", policy, || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, UpstreamError>(json!("new"))
        })
        .await
        .unwrap();

        assert_eq!(result, Cached::Stale(json!("old")));
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_treated_as_miss() {
        let store = MemoryCache::new();
        store.set("k", "garbage".to_string()).await.unwrap();

        let result = cached_fetch(&store, "k", policy(), || async { Ok::<_, UpstreamError>(json!(7)) })
            .await
            .unwrap();
        assert_eq!(result, Cached::Refreshed(json!(7)));
    }
}
