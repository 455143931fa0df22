//! Historical token transfers from the block-explorer indexer

use super::{http_client, Result, UpstreamError};
use crate::config::{IndexerConfig, NetworkId};
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SERVICE: &str = "indexer";

/// One token movement inside a transaction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenTransfer {
    #[serde(default)]
    pub from_address: Option<String>,
    /// Missing for mints and burns
    #[serde(default)]
    pub to_address: Option<String>,
    /// Raw integer amount, in the token's smallest unit
    pub delta: String,
}

/// A transaction touching the queried address
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferTx {
    pub block_signed_at: String,
    pub block_height: u64,
    pub tx_hash: String,
    pub successful: bool,
    #[serde(default)]
    pub transfers: Vec<TokenTransfer>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TransfersPage {
    #[serde(default)]
    pub items: Vec<TransferTx>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    data: Option<TransfersPage>,
    #[serde(default)]
    error: bool,
    #[serde(default)]
    error_message: Option<String>,
}

#[async_trait]
pub trait TransferIndexer: Send + Sync {
    /// Token transfers of `token` in and out of `address`
    async fn transfers(
        &self,
        chain: NetworkId,
        token: &str,
        address: &str,
        page_size: u32,
        page_number: u32,
    ) -> Result<TransfersPage>;
}

/// Covalent-style `transfers_v2` client
pub struct CovalentClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl CovalentClient {
    pub fn new(config: &IndexerConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn transfers_url(&self, chain: NetworkId, address: &str) -> String {
        format!("{}/{}/address/{}/transfers_v2/", self.base_url, chain, address)
    }
}

#[async_trait]
impl TransferIndexer for CovalentClient {
    async fn transfers(
        &self,
        chain: NetworkId,
        token: &str,
        address: &str,
        page_size: u32,
        page_number: u32,
    ) -> Result<TransfersPage> {
        debug!("Fetching transfers of {} for {} on chain {}", token, address, chain);

        let response = self
            .client
            .get(self.transfers_url(chain, address))
            .query(&[
                ("contract-address", token.to_string()),
                ("page-size", page_size.to_string()),
                ("page-number", page_number.to_string()),
                ("key", self.api_key.clone()),
            ])
            .send()
            .await
            .map_err(|e| UpstreamError::from_http(SERVICE, e))?;

        if !response.status().is_success() {
            return Err(UpstreamError::Status {
                service: SERVICE,
                status: response.status().as_u16(),
            });
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| UpstreamError::from_http(SERVICE, e))?;

        if envelope.error {
            return Err(UpstreamError::malformed(
                SERVICE,
                envelope.error_message.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        envelope
            .data
            .ok_or_else(|| UpstreamError::malformed(SERVICE, "missing data field"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_parses_indexer_payload() {
        let raw = r#"{
            "data": {
                "address": "0x5e075e40d01c82b6bf0b0ecdb4eb1d6984357ef7",
                "items": [{
                    "block_signed_at": "2022-03-01T10:00:00Z",
                    "block_height": 14300000,
                    "tx_hash": "0xabc",
                    "successful": true,
                    "transfers": [
                        {"from_address": "0x5e07", "to_address": null, "delta": "100"},
                        {"from_address": "0x5e07", "to_address": "0x926d", "delta": "2500000000000000000"}
                    ]
                }]
            },
            "error": false,
            "error_message": null
        }"#;
        let envelope: Envelope = serde_json::from_str(raw).unwrap();
        let page = envelope.data.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].block_height, 14_300_000);
        assert!(page.items[0].transfers[0].to_address.is_none());
        assert_eq!(page.items[0].transfers[1].delta, "2500000000000000000");
    }

    #[test]
    fn test_transfers_url_uses_chain_id() {
        let client = CovalentClient::new(
            &IndexerConfig {
                base_url: "https://indexer.example/v1/".to_string(),
                api_key: "k".to_string(),
                page_size: 1000,
            },
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            client.transfers_url(NetworkId::Fantom, "0xfed"),
            "https://indexer.example/v1/250/address/0xfed/transfers_v2/"
        );
    }
}
