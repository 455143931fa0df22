//! HTTP surface of the dashboard

pub mod errors;
pub mod handlers;
pub mod router;

pub use errors::ApiError;
pub use router::create_router;

use crate::cache::{CacheStore, FetchPolicy};
use crate::config::Config;
use crate::upstream::{BondMarketSource, GovernanceSource, InterestModelSource, PriceFeed, TransferIndexer};
use std::sync::Arc;

/// Shared handles every handler reads from
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub cache: Arc<dyn CacheStore>,
    pub indexer: Arc<dyn TransferIndexer>,
    pub prices: Arc<dyn PriceFeed>,
    pub interest_models: Arc<dyn InterestModelSource>,
    pub bond_markets: Arc<dyn BondMarketSource>,
    pub governance: Arc<dyn GovernanceSource>,
}

impl AppState {
    /// Freshness window for `ttl_secs`, with the configured upstream deadline
    pub fn policy(&self, ttl_secs: u64) -> FetchPolicy {
        FetchPolicy::new(ttl_secs, self.config.upstream_timeout())
    }
}
