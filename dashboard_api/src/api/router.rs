use super::handlers::{bonds, governance, prices, status, transparency};
use super::{ApiError, AppState};
use axum::{http::Method, routing::get, Router};
use tower_http::cors::{Any, CorsLayer};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(status::health_check))
        // Transparency
        .route("/api/transparency/fed-revenues", get(transparency::fed_revenues))
        .route("/api/transparency/interest-model", get(transparency::interest_model))
        // Bonds and prices
        .route("/api/bonds", get(bonds::list_bonds))
        .route("/api/bonds/positions", get(bonds::bond_positions))
        .route("/api/bonds/payout", get(bonds::bond_payout))
        .route("/api/prices", get(prices::get_prices))
        // Governance
        .route("/api/proposals", get(governance::list_proposals))
        .route("/api/delegates", get(governance::list_delegates))
        .route("/api/delegates/top", get(governance::top_delegates))
        .fallback(|| async { ApiError::not_found("Route not found") })
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET])
                .allow_headers(Any),
        )
        .with_state(state)
}
