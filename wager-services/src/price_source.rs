//! Upstream price quote providers
//!
//! The cache talks to a [`PriceSource`]; [`CoinGeckoClient`] is the production
//! implementation backed by the CoinGecko `simple/price` endpoint.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};
use wager_core::Instrument;

/// Default public CoinGecko API base
pub const COINGECKO_API_BASE: &str = "https://api.coingecko.com/api/v3";

/// Quote currency requested from the upstream source
const VS_CURRENCY: &str = "usd";

/// A remote, rate-limited, fallible price provider
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetch quotes for all `instruments` in a single batched call
    ///
    /// The returned map may be missing instruments; callers decide whether a
    /// partial batch is acceptable.
    async fn fetch_prices(
        &self,
        instruments: &[Instrument],
    ) -> Result<HashMap<Instrument, Decimal>, PriceSourceError>;

    /// Short name for logging
    fn name(&self) -> &str;
}

/// Errors from upstream price fetches
#[derive(Debug, thiserror::Error)]
pub enum PriceSourceError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("HTTP error: status {0}")]
    HttpError(u16),

    #[error("Rate limited by upstream")]
    RateLimited,

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// CoinGecko API client
pub struct CoinGeckoClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl CoinGeckoClient {
    /// Create a new CoinGecko client
    ///
    /// `timeout` bounds each HTTP request; the cache applies its own
    /// deadline on top of it.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, PriceSourceError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("PriceWager/1.0")
            .build()
            .map_err(|e| PriceSourceError::NetworkError(e.to_string()))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        info!("[CoinGecko] Using API base {}", base_url);

        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }
}

#[async_trait]
impl PriceSource for CoinGeckoClient {
    async fn fetch_prices(
        &self,
        instruments: &[Instrument],
    ) -> Result<HashMap<Instrument, Decimal>, PriceSourceError> {
        let ids = instruments
            .iter()
            .map(|i| i.id())
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}/simple/price", self.base_url);
        debug!("[CoinGecko] Fetching prices for {}", ids);

        let mut request = self
            .http
            .get(&url)
            .query(&[("ids", ids.as_str()), ("vs_currencies", VS_CURRENCY)]);
        if let Some(key) = &self.api_key {
            request = request.header("x-cg-demo-api-key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PriceSourceError::NetworkError(e.to_string()))?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => return Err(PriceSourceError::RateLimited),
            status if !status.is_success() => {
                return Err(PriceSourceError::HttpError(status.as_u16()))
            }
            _ => {}
        }

        let body: HashMap<String, HashMap<String, f64>> = response
            .json()
            .await
            .map_err(|e| PriceSourceError::ParseError(e.to_string()))?;

        Ok(parse_quotes(&body, instruments))
    }

    fn name(&self) -> &str {
        "coingecko"
    }
}

/// Extract usable quotes from a `simple/price` body
///
/// Non-finite and non-positive quotes are dropped, which leaves the batch
/// partial.
fn parse_quotes(
    body: &HashMap<String, HashMap<String, f64>>,
    instruments: &[Instrument],
) -> HashMap<Instrument, Decimal> {
    instruments
        .iter()
        .filter_map(|instrument| {
            let raw = *body.get(instrument.id())?.get(VS_CURRENCY)?;
            if !raw.is_finite() || raw <= 0.0 {
                debug!("[CoinGecko] Dropping unusable quote {} for {}", raw, instrument);
                return None;
            }
            Decimal::from_f64(raw).map(|price| (*instrument, price))
        })
        .collect()
}
