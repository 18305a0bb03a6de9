//! API route definitions

mod health;
mod prices;
mod wagers;
pub mod ws;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use serde::Serialize;
use tracing::error;
use wager_core::WagerError;

use crate::AppState;

/// Create all API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(wagers::routes())
        .merge(prices::routes())
        .merge(health::routes())
}

/// Create WebSocket routes (separate from API)
pub fn ws_routes() -> Router<AppState> {
    ws::routes()
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Map a service error onto its HTTP status
pub fn error_response(err: WagerError) -> Response {
    let status = match &err {
        WagerError::Validation(_) => StatusCode::BAD_REQUEST,
        WagerError::NotFound(_) => StatusCode::NOT_FOUND,
        WagerError::AlreadySettled(_) => StatusCode::CONFLICT,
        WagerError::Storage(_) | WagerError::Config(_) | WagerError::Internal(_) => {
            error!("Request failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::collections::HashMap;
    use std::sync::Arc;
    use wager_core::Instrument;
    use wager_services::{
        MemoryWagerStore, PriceBroadcaster, PriceCache, PriceCacheConfig, PriceSource,
        PriceSourceError, WagerService,
    };

    use crate::AppState;

    /// Upstream that never answers successfully
    pub struct OfflineSource;

    #[async_trait]
    impl PriceSource for OfflineSource {
        async fn fetch_prices(
            &self,
            _instruments: &[Instrument],
        ) -> Result<HashMap<Instrument, Decimal>, PriceSourceError> {
            Err(PriceSourceError::NetworkError("offline".to_string()))
        }

        fn name(&self) -> &str {
            "offline"
        }
    }

    pub fn state() -> AppState {
        AppState {
            wager_service: Arc::new(WagerService::new(Arc::new(MemoryWagerStore::new()))),
            price_cache: Arc::new(PriceCache::new(
                Arc::new(OfflineSource),
                PriceCacheConfig::default(),
            )),
            broadcaster: Arc::new(PriceBroadcaster::new()),
            store_kind: "memory",
        }
    }

    pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
