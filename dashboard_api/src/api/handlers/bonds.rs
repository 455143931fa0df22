use super::prices::tracked_price_ids;
use crate::api::{ApiError, AppState};
use crate::bonds::{Bond, BondPayout, BondPositionsPayload, BondsPayload, UserBond};
use crate::cache::cached_fetch;
use crate::upstream::{self, UpstreamError};
use axum::{
    extract::{Query, State},
    response::Json,
};
use ethers::types::{Address, U256};
use ethers::utils::parse_units;
use futures::future::join_all;
use log::warn;
use serde::Deserialize;

pub const BONDS_KEY: &str = "bonds-v1.0.0";
pub const BOND_POSITIONS_KEY: &str = "bond-positions-v1.0.0";

#[derive(Debug, Deserialize)]
pub struct PositionsQuery {
    pub account: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PayoutQuery {
    pub id: Option<String>,
    pub amount: Option<String>,
    pub referrer: Option<String>,
}

/// Open bond markets with live prices and ROI
pub async fn list_bonds(State(state): State<AppState>) -> Result<Json<BondsPayload>, ApiError> {
    let policy = state.policy(state.config.ttl.bonds);
    let bonds = cached_fetch(state.cache.as_ref(), BONDS_KEY, policy, || fetch_bonds(&state)).await?;
    Ok(Json(bonds.into_inner()))
}

async fn fetch_bonds(state: &AppState) -> upstream::Result<BondsPayload> {
    let config = state.config.as_ref();
    let ids = tracked_price_ids(config);

    let (prices, reads) = tokio::join!(
        state.prices.usd_prices(&ids),
        join_all(config.bonds.iter().map(|listing| state.bond_markets.bond_market(listing))),
    );
    let prices = prices?;
    let market_price = prices.get(&config.reward_token_cg_id).copied();

    let bonds = config
        .bonds
        .iter()
        .zip(reads)
        .map(|(listing, read)| {
            let read = read
                .map_err(|e| warn!("Bond {} reads failed, using listing values: {}", listing.id, e))
                .ok();
            let mut bond = Bond::project(listing, read.as_ref(), market_price, config.reward_token_decimals);
            if let Some(price) = listing.underlying_cg_id.as_ref().and_then(|id| prices.get(id)) {
                bond.input_usd_price = *price;
            }
            bond
        })
        .collect();

    Ok(BondsPayload { bonds })
}

/// Bond tokens bought by `account`, cached per account
pub async fn bond_positions(
    State(state): State<AppState>,
    Query(query): Query<PositionsQuery>,
) -> Result<Json<BondPositionsPayload>, ApiError> {
    let account = query
        .account
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ApiError::bad_request("account is required"))?;
    let account: Address = account
        .parse()
        .map_err(|_| ApiError::invalid_parameter("account", "expected a 0x address"))?;

    let key = format!("{}-{:?}", BOND_POSITIONS_KEY, account);
    let policy = state.policy(state.config.ttl.bonds);
    let positions = cached_fetch(state.cache.as_ref(), &key, policy, || fetch_positions(&state, account)).await?;
    Ok(Json(positions.into_inner()))
}

async fn fetch_positions(state: &AppState, account: Address) -> upstream::Result<BondPositionsPayload> {
    let config = state.config.as_ref();
    let Some(listing) = config.bonds.first() else {
        return Ok(BondPositionsPayload::default());
    };

    // every market of the aggregator shares one teller
    let teller = match state.bond_markets.bond_market(listing).await {
        Ok(reads) => format!("{:?}", reads.teller),
        Err(e) => listing.teller.clone().ok_or(e)?,
    };

    let raw = state
        .bond_markets
        .bond_positions(&teller, &format!("{:?}", account))
        .await?;
    let user_bonds = raw
        .iter()
        .map(|position| UserBond::from_raw(position, config.reward_token_decimals))
        .collect();

    Ok(BondPositionsPayload { user_bonds })
}

/// Quote for `amount` input tokens of market `id`; not cached
pub async fn bond_payout(
    State(state): State<AppState>,
    Query(query): Query<PayoutQuery>,
) -> Result<Json<BondPayout>, ApiError> {
    let config = state.config.as_ref();
    let id: u64 = query
        .id
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("id is required"))?
        .trim()
        .parse()
        .map_err(|_| ApiError::invalid_parameter("id", "expected a market id"))?;
    let listing = config
        .bonds
        .iter()
        .find(|listing| listing.id == id)
        .ok_or_else(|| ApiError::not_found("Unknown bond market"))?;

    let amount = query.amount.as_deref().map(str::trim).filter(|a| !a.is_empty()).unwrap_or("0");
    if amount.starts_with('-') {
        return Err(ApiError::invalid_parameter("amount", "must not be negative"));
    }
    let raw_amount: U256 = parse_units(amount, listing.input_decimals)
        .map_err(|e| ApiError::invalid_parameter("amount", &e.to_string()))?
        .into();

    let referrer = match query.referrer.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        Some(referrer) => referrer,
        None => listing.bond_contract.as_str(),
    };
    let referrer: Address = referrer
        .parse()
        .map_err(|_| ApiError::invalid_parameter("referrer", "expected a 0x address"))?;

    let timeout = config.upstream_timeout();
    let payout = tokio::time::timeout(timeout, state.bond_markets.payout_for(listing, raw_amount, referrer))
        .await
        .map_err(|_| UpstreamError::Timeout(timeout))
        .and_then(|quote| quote)
        .map_err(|e| {
            warn!("payoutFor on bond {} failed: {}", id, e);
            ApiError::internal_server_error(&format!("Payout quote unavailable: {}", e))
        })?;

    Ok(Json(BondPayout::new(
        id,
        amount,
        payout,
        config.reward_token_decimals,
        &config.reward_token_symbol,
    )))
}
