//! Treasury transparency endpoints

use crate::api::{ApiError, AppState};
use crate::cache::cached_fetch;
use crate::interest_model::InterestModel;
use crate::revenue::{aggregate_revenues, filter_fed_transfers, revenue_target, FedRevenues};
use crate::upstream::{self, UpstreamError};
use axum::{extract::State, response::Json};
use futures::future::try_join_all;
use log::debug;

pub const REVENUES_KEY: &str = "revenues-v1.0.0";
pub const INTEREST_MODEL_KEY: &str = "interest-model-v1.0.1";

/// Profits every fed sent to the treasury, with running totals
pub async fn fed_revenues(State(state): State<AppState>) -> Result<Json<FedRevenues>, ApiError> {
    let policy = state.policy(state.config.ttl.revenues);
    let revenues = cached_fetch(state.cache.as_ref(), REVENUES_KEY, policy, || {
        fetch_fed_revenues(&state)
    })
    .await?;
    Ok(Json(revenues.into_inner()))
}

async fn fetch_fed_revenues(state: &AppState) -> upstream::Result<FedRevenues> {
    let config = state.config.as_ref();
    let feds = config.feds_for_revenue();

    let fetches = feds.iter().map(|fed| async move {
        let token = config.dola_on(fed.chain_id).ok_or_else(|| {
            UpstreamError::NotConfigured(format!("stablecoin address on chain {}", fed.chain_id))
        })?;
        let page = state
            .indexer
            .transfers(fed.chain_id, token, &fed.address, config.indexer.page_size, 0)
            .await?;
        debug!("{} transactions indexed for fed {}", page.items.len(), fed.name);

        let target = revenue_target(fed, &config.treasury);
        filter_fed_transfers(&target, &page).map_err(|e| UpstreamError::malformed("transfer indexer", e))
    });

    // one failed fed fails the whole aggregation
    let per_fed = try_join_all(fetches).await?;
    Ok(aggregate_revenues(&feds, per_fed))
}

/// Yearly rates of the stablecoin market's interest model
pub async fn interest_model(State(state): State<AppState>) -> Result<Json<InterestModel>, ApiError> {
    let policy = state.policy(state.config.ttl.interest_model);
    let model = cached_fetch(state.cache.as_ref(), INTEREST_MODEL_KEY, policy, || async {
        let address = state
            .config
            .interest_model
            .as_deref()
            .ok_or_else(|| UpstreamError::NotConfigured("interest model address".to_string()))?;
        let raw = state.interest_models.interest_model(address).await?;
        Ok::<_, UpstreamError>(InterestModel::from_raw(&raw))
    })
    .await?;
    Ok(Json(model.into_inner()))
}
