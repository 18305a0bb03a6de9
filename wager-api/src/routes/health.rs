//! Health check endpoints

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde::Serialize;
use wager_services::CacheStats;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    prices: CacheStats,
    subscribers: usize,
    store: &'static str,
}

/// Health check handler
///
/// Degraded until the price cache has completed its first real fetch.
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let prices = state.price_cache.stats();

    let (status, code) = if prices.ready {
        ("healthy", StatusCode::OK)
    } else {
        ("degraded", StatusCode::SERVICE_UNAVAILABLE)
    };

    let response = HealthResponse {
        status: status.to_string(),
        prices,
        subscribers: state.broadcaster.subscriber_count(),
        store: state.store_kind,
    };

    (code, Json(response))
}

/// Simple liveness check (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

/// Create health routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness))
}
