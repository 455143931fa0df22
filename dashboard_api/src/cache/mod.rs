//! Key/value cache with producer timestamps
//!
//! Entries are stored as JSON text `{"timestamp": <ms>, "data": <payload>}`.
//! The store never expires anything: readers decide whether an entry is
//! fresh enough by comparing its timestamp with their own freshness window.

pub mod fallback;
pub mod memory;
pub mod redis;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

pub use fallback::{cached_fetch, Cached, FallbackError, FetchPolicy};
pub use memory::MemoryCache;
pub use self::redis::RedisCache;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(#[from] ::redis::RedisError),

    #[error("Cache entry {key} is not valid JSON: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Raw get/set access to the external cache store
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: String) -> Result<()>;
}

/// A cached payload plus the time it was produced
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry<T> {
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub data: T,
}

impl<T> CacheEntry<T> {
    pub fn is_fresh(&self, ttl: Duration, now_ms: i64) -> bool {
        now_ms.saturating_sub(self.timestamp) < ttl.as_millis() as i64
    }
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Read a cached payload.
///
/// With `ttl` set, entries older than the window are treated as missing.
/// With `ttl = None` the entry is returned regardless of its age.
pub async fn get_cached<T: DeserializeOwned>(
    store: &dyn CacheStore,
    key: &str,
    ttl: Option<Duration>,
) -> Result<Option<T>> {
    get_cached_at(store, key, ttl, now_ms()).await
}

pub(crate) async fn get_cached_at<T: DeserializeOwned>(
    store: &dyn CacheStore,
    key: &str,
    ttl: Option<Duration>,
    now_ms: i64,
) -> Result<Option<T>> {
    let raw = match store.get(key).await? {
        Some(raw) => raw,
        None => return Ok(None),
    };

    let entry: CacheEntry<T> =
        serde_json::from_str(&raw).map_err(|source| CacheError::Serialization {
            key: key.to_string(),
            source,
        })?;

    match ttl {
        Some(ttl) if !entry.is_fresh(ttl, now_ms) => Ok(None),
        _ => Ok(Some(entry.data)),
    }
}

/// Store a payload stamped with the current time
pub async fn set_with_timestamp<T: Serialize>(
    store: &dyn CacheStore,
    key: &str,
    data: &T,
) -> Result<()> {
    let entry = CacheEntry {
        timestamp: now_ms(),
        data,
    };
    let raw = serde_json::to_string(&entry).map_err(|source| CacheError::Serialization {
        key: key.to_string(),
        source,
    })?;
    store.set(key, raw).await
}
