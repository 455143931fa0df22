//! USD prices from the market price feed

use super::{http_client, Result, UpstreamError};
use crate::config::PriceFeedConfig;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const SERVICE: &str = "price feed";

#[derive(Deserialize, Debug)]
struct UsdPrice {
    usd: Option<f64>,
}

#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// USD price per feed id; ids the feed does not know are left out
    async fn usd_prices(&self, ids: &[String]) -> Result<HashMap<String, f64>>;
}

/// CoinGecko `simple/price` client
pub struct CoingeckoClient {
    client: reqwest::Client,
    base_url: String,
}

impl CoingeckoClient {
    pub fn new(config: &PriceFeedConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PriceFeed for CoingeckoClient {
    async fn usd_prices(&self, ids: &[String]) -> Result<HashMap<String, f64>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let response = self
            .client
            .get(format!("{}/simple/price", self.base_url))
            .query(&[("ids", ids.join(",")), ("vs_currencies", "usd".to_string())])
            .send()
            .await
            .map_err(|e| UpstreamError::from_http(SERVICE, e))?;

        if !response.status().is_success() {
            return Err(UpstreamError::Status {
                service: SERVICE,
                status: response.status().as_u16(),
            });
        }

        let body: HashMap<String, UsdPrice> = response
            .json()
            .await
            .map_err(|e| UpstreamError::from_http(SERVICE, e))?;

        Ok(flatten_prices(body))
    }
}

fn flatten_prices(body: HashMap<String, UsdPrice>) -> HashMap<String, f64> {
    body.into_iter()
        .filter_map(|(id, price)| price.usd.map(|usd| (id, usd)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prices_without_usd_are_dropped() {
        let body: HashMap<String, UsdPrice> = serde_json::from_str(
            r#"{"inverse-finance": {"usd": 42.5}, "weth": {"usd": 1800.0}, "delisted": {}}"#,
        )
        .unwrap();
        let prices = flatten_prices(body);
        assert_eq!(prices.len(), 2);
        assert_eq!(prices["inverse-finance"], 42.5);
        assert!(!prices.contains_key("delisted"));
    }
}
