use super::{CacheStore, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// In-process cache store for tests and single-node deployments
#[derive(Clone, Default)]
pub struct MemoryCache {
    data: Arc<DashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.data.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.data.insert(key.to_string(), value);
        Ok(())
    }
}
