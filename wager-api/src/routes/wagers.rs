//! Wager endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use wager_core::{CreateWagerRequest, Multiplier, Wager, WagerError, WagerId};

use super::{error_response, ErrorResponse};
use crate::AppState;

/// Query parameters for wager history
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Maximum number of settled wagers
    pub limit: Option<usize>,
}

/// Query parameters for a payout quote
#[derive(Debug, Deserialize)]
pub struct PayoutQuery {
    pub amount: Decimal,
    pub multiplier: u32,
}

/// Response for wager listings
#[derive(Debug, Serialize)]
pub struct WagersResponse {
    pub wagers: Vec<Wager>,
    pub count: usize,
}

/// Response for a payout quote
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutResponse {
    pub amount: Decimal,
    pub multiplier: u32,
    pub potential_payout: Decimal,
    pub potential_profit: Decimal,
}

/// Create wager routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/wagers", post(create_wager))
        .route("/wagers/active", get(list_active))
        .route("/wagers/history", get(list_history))
        .route("/wagers/stats", get(get_stats))
        .route("/wagers/payout", get(get_payout))
        .route("/wagers/{id}", get(get_wager))
}

/// Place a new wager
async fn create_wager(
    State(state): State<AppState>,
    body: Result<Json<CreateWagerRequest>, JsonRejection>,
) -> impl IntoResponse {
    // Malformed or mistyped bodies are validation failures like any other
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!("Rejected wager body: {}", rejection.body_text());
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: rejection.body_text(),
                }),
            )
                .into_response();
        }
    };

    info!(
        "Creating wager: {} {} x{} on {}",
        request.amount, request.direction, request.multiplier, request.instrument_id
    );

    match state.wager_service.create_wager(&request) {
        Ok(wager) => (StatusCode::CREATED, Json(wager)).into_response(),
        Err(e) => error_response(e),
    }
}

/// List wagers still awaiting settlement
async fn list_active(State(state): State<AppState>) -> impl IntoResponse {
    match state.wager_service.active_wagers() {
        Ok(wagers) => {
            let count = wagers.len();
            (StatusCode::OK, Json(WagersResponse { wagers, count })).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// List settled wagers, most recent first
async fn list_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryQuery>,
) -> impl IntoResponse {
    match state.wager_service.recent_wagers(params.limit) {
        Ok(wagers) => {
            let count = wagers.len();
            (StatusCode::OK, Json(WagersResponse { wagers, count })).into_response()
        }
        Err(e) => error_response(e),
    }
}

/// Aggregate win/loss statistics
async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    match state.wager_service.stats() {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => error_response(e),
    }
}

/// Quote what a winning wager would pay
async fn get_payout(
    State(state): State<AppState>,
    Query(params): Query<PayoutQuery>,
) -> impl IntoResponse {
    let multiplier = match Multiplier::try_from(params.multiplier) {
        Ok(m) => m,
        Err(e) => return error_response(WagerError::from(e)),
    };

    let potential_payout = match state
        .wager_service
        .potential_payout(params.amount, multiplier)
    {
        Ok(payout) => payout,
        Err(e) => return error_response(e),
    };

    (
        StatusCode::OK,
        Json(PayoutResponse {
            amount: params.amount,
            multiplier: multiplier.value(),
            potential_payout,
            potential_profit: potential_payout - params.amount,
        }),
    )
        .into_response()
}

/// Get a single wager by ID
async fn get_wager(State(state): State<AppState>, Path(id): Path<u64>) -> impl IntoResponse {
    match state.wager_service.wager(WagerId(id)) {
        Ok(wager) => (StatusCode::OK, Json(wager)).into_response(),
        Err(e) => error_response(e),
    }
}
