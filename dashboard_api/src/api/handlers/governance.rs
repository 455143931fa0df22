//! Proposal and delegate endpoints

use crate::api::{ApiError, AppState};
use crate::cache::cached_fetch;
use crate::governance::{
    active_proposals, filter_delegates, fold_delegates, recent_proposals, search_proposals,
    sort_newest_first, top_delegates as rank_delegates, DelegatesPayload, Proposal, ProposalStatus,
    ProposalsPayload, TopDelegatesPayload, RECENT_PROPOSALS,
};
use crate::upstream::{self, UpstreamError};
use axum::{
    extract::{Query, State},
    response::Json,
};
use log::warn;
use serde::Deserialize;

pub const PROPOSALS_KEY: &str = "proposals-v1.0.0";
pub const DELEGATES_KEY: &str = "delegates-v1.0.0";

#[derive(Debug, Default, Deserialize)]
pub struct ProposalsQuery {
    /// A proposal status, or `recent` for the latest non-active ones
    pub status: Option<String>,
    pub search: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DelegatesQuery {
    pub filter: Option<String>,
}

pub async fn list_proposals(
    State(state): State<AppState>,
    Query(query): Query<ProposalsQuery>,
) -> Result<Json<ProposalsPayload>, ApiError> {
    let limit = match query.limit.as_deref() {
        Some(raw) => Some(
            raw.parse::<usize>()
                .map_err(|_| ApiError::invalid_parameter("limit", "expected a non-negative integer"))?,
        ),
        None => None,
    };

    let policy = state.policy(state.config.ttl.proposals);
    let cached = cached_fetch(state.cache.as_ref(), PROPOSALS_KEY, policy, || fetch_proposals(&state)).await?;
    let all = cached.into_inner().proposals;

    let mut proposals = match query.status.as_deref().map(str::trim) {
        None | Some("") => all,
        Some(s) if s.eq_ignore_ascii_case("recent") => {
            recent_proposals(&all, limit.unwrap_or(RECENT_PROPOSALS))
        }
        Some(s) => {
            let status: ProposalStatus = s
                .parse()
                .map_err(|reason: String| ApiError::invalid_parameter("status", &reason))?;
            if status == ProposalStatus::Active {
                active_proposals(&all)
            } else {
                all.into_iter().filter(|p| p.status == status).collect()
            }
        }
    };

    if let Some(search) = query.search.as_deref() {
        proposals = search_proposals(&proposals, search);
    }
    if let Some(limit) = limit {
        proposals.truncate(limit);
    }

    Ok(Json(ProposalsPayload { proposals }))
}

async fn fetch_proposals(state: &AppState) -> upstream::Result<ProposalsPayload> {
    let governor = state
        .config
        .governance
        .as_deref()
        .ok_or_else(|| UpstreamError::NotConfigured("governor address".to_string()))?;

    let raw = state.governance.proposals(governor).await?;
    let mut proposals: Vec<Proposal> = raw
        .iter()
        .filter_map(|r| {
            let proposal = Proposal::from_raw(r);
            if proposal.is_none() {
                warn!("Skipping proposal {} with unknown state {}", r.id, r.state);
            }
            proposal
        })
        .collect();
    sort_newest_first(&mut proposals);

    Ok(ProposalsPayload { proposals })
}

async fn cached_delegates(state: &AppState) -> Result<DelegatesPayload, ApiError> {
    let policy = state.policy(state.config.ttl.delegates);
    let delegates = cached_fetch(state.cache.as_ref(), DELEGATES_KEY, policy, || async {
        let token = state
            .config
            .inv
            .as_deref()
            .ok_or_else(|| UpstreamError::NotConfigured("governance token address".to_string()))?;
        let events = state
            .governance
            .delegate_events(token, state.config.inv_deploy_block)
            .await?;
        Ok::<_, UpstreamError>(fold_delegates(events))
    })
    .await?;
    Ok(delegates.into_inner())
}

pub async fn list_delegates(
    State(state): State<AppState>,
    Query(query): Query<DelegatesQuery>,
) -> Result<Json<DelegatesPayload>, ApiError> {
    let delegates = cached_delegates(&state).await?;
    Ok(Json(match query.filter.as_deref() {
        Some(filter) => filter_delegates(&delegates, filter),
        None => delegates,
    }))
}

pub async fn top_delegates(State(state): State<AppState>) -> Result<Json<TopDelegatesPayload>, ApiError> {
    let delegates = cached_delegates(&state).await?;
    Ok(Json(TopDelegatesPayload {
        delegates: rank_delegates(&delegates),
    }))
}
