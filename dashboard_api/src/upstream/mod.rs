//! Clients for the services the dashboard depends on: RPC nodes, the
//! transfer indexer and the price feed.

pub mod chain;
pub mod indexer;
pub mod prices;

use std::time::Duration;

pub use chain::{
    BondMarketReads, BondMarketSource, DelegateEvent, EthersChainClient, GovernanceSource,
    InterestModelSource, RawBondPosition, RawInterestModel, RawProposal,
};
pub use indexer::{CovalentClient, TokenTransfer, TransferIndexer, TransferTx, TransfersPage};
pub use prices::{CoingeckoClient, PriceFeed};

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("{service} unavailable: {reason}")]
    Unavailable { service: &'static str, reason: String },

    #[error("{service} returned HTTP {status}")]
    Status { service: &'static str, status: u16 },

    #[error("Malformed response from {service}: {reason}")]
    Malformed { service: &'static str, reason: String },

    #[error("Upstream call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Not configured: {0}")]
    NotConfigured(String),
}

impl UpstreamError {
    pub fn unavailable(service: &'static str, reason: impl ToString) -> Self {
        Self::Unavailable {
            service,
            reason: reason.to_string(),
        }
    }

    pub fn malformed(service: &'static str, reason: impl ToString) -> Self {
        Self::Malformed {
            service,
            reason: reason.to_string(),
        }
    }

    /// Classify a reqwest failure
    pub fn from_http(service: &'static str, err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::malformed(service, err)
        } else if let Some(status) = err.status() {
            Self::Status {
                service,
                status: status.as_u16(),
            }
        } else {
            Self::unavailable(service, err)
        }
    }
}

pub type Result<T> = std::result::Result<T, UpstreamError>;

/// Shared HTTP client with the configured request timeout
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| UpstreamError::unavailable("http client", e))
}
