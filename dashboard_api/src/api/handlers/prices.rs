use crate::api::{ApiError, AppState};
use crate::cache::cached_fetch;
use crate::config::Config;
use crate::upstream::UpstreamError;
use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const PRICES_KEY: &str = "prices-v1.0.0";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct UsdQuote {
    pub usd: f64,
}

/// Feed ids the dashboard quotes: the reward token and every bond input
pub fn tracked_price_ids(config: &Config) -> Vec<String> {
    let mut ids = vec![config.reward_token_cg_id.clone()];
    for id in config.bonds.iter().filter_map(|b| b.underlying_cg_id.as_ref()) {
        if !ids.contains(id) {
            ids.push(id.clone());
        }
    }
    ids
}

pub async fn get_prices(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, UsdQuote>>, ApiError> {
    let policy = state.policy(state.config.ttl.prices);
    let prices = cached_fetch(state.cache.as_ref(), PRICES_KEY, policy, || async {
        let ids = tracked_price_ids(&state.config);
        let prices = state.prices.usd_prices(&ids).await?;
        Ok::<_, UpstreamError>(
            prices
                .into_iter()
                .map(|(id, usd)| (id, UsdQuote { usd }))
                .collect::<BTreeMap<_, _>>(),
        )
    })
    .await?;
    Ok(Json(prices.into_inner()))
}
