//! Price and instrument endpoints

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use wager_core::{Instrument, PriceOrigin};

use super::ErrorResponse;
use crate::AppState;

/// Latest published prices
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricesResponse {
    pub prices: BTreeMap<Instrument, Decimal>,
    pub origin: PriceOrigin,
    pub as_of: DateTime<Utc>,
}

/// A supported instrument
#[derive(Debug, Serialize)]
pub struct InstrumentInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub symbol: &'static str,
}

/// Create price routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/prices", get(get_prices))
        .route("/instruments", get(list_instruments))
}

/// Latest snapshot pushed to feed subscribers
async fn get_prices(State(state): State<AppState>) -> impl IntoResponse {
    match state.broadcaster.latest() {
        Some(snapshot) => (
            StatusCode::OK,
            Json(PricesResponse {
                prices: snapshot.prices,
                origin: snapshot.origin,
                as_of: snapshot.as_of,
            }),
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: "Prices not available yet".to_string(),
            }),
        )
            .into_response(),
    }
}

async fn list_instruments() -> Json<Vec<InstrumentInfo>> {
    Json(
        Instrument::ALL
            .iter()
            .map(|i| InstrumentInfo {
                id: i.id(),
                name: i.display_name(),
                symbol: i.symbol(),
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::{body_json, state};
    use axum::{body::Body, http::Request, http::StatusCode};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;
    use tower::ServiceExt;
    use wager_core::{Instrument, PriceOrigin, PriceSnapshot};

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_prices_unavailable_before_first_publish() {
        let response = crate::app(state()).oneshot(get("/api/prices")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_prices_after_publish() {
        let state = state();
        let prices = BTreeMap::from([(Instrument::Bitcoin, dec!(64250.5))]);
        state
            .broadcaster
            .publish(&PriceSnapshot::new(prices, PriceOrigin::Fetched, Utc::now()));

        let response = crate::app(state).oneshot(get("/api/prices")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["prices"]["bitcoin"], "64250.5");
        assert_eq!(body["origin"], "fetched");
    }

    #[tokio::test]
    async fn test_instruments_listed() {
        let response = crate::app(state()).oneshot(get("/api/instruments")).await.unwrap();
        let body = body_json(response).await;
        let ids: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["bitcoin", "ethereum", "binancecoin"]);
        assert_eq!(body[2]["symbol"], "BNB");
    }
}
