//! Price snapshots and the live feed message

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::Instrument;

/// Where the prices in a snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceOrigin {
    /// Fresh batch from the upstream source
    Fetched,
    /// Last real batch, returned unchanged after a failed fetch
    Fallback,
    /// Synthesized around the last real batch between fetches
    Simulated,
}

/// Point-in-time instrument -> price mapping
///
/// An empty snapshot means the feed is not warmed up yet; it must never be
/// read as a zero price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub prices: BTreeMap<Instrument, Decimal>,
    pub origin: PriceOrigin,
    pub as_of: DateTime<Utc>,
}

impl PriceSnapshot {
    pub fn new(prices: BTreeMap<Instrument, Decimal>, origin: PriceOrigin, as_of: DateTime<Utc>) -> Self {
        Self {
            prices,
            origin,
            as_of,
        }
    }

    /// Snapshot with no prices (cold start)
    pub fn empty(as_of: DateTime<Utc>) -> Self {
        Self::new(BTreeMap::new(), PriceOrigin::Simulated, as_of)
    }

    pub fn price(&self, instrument: Instrument) -> Option<Decimal> {
        self.prices.get(&instrument).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    /// Whether any price differs from `other` (exact comparison)
    pub fn differs_from(&self, other: &BTreeMap<Instrument, Decimal>) -> bool {
        &self.prices != other
    }

    /// Build the flat wire message for this snapshot
    pub fn to_update(&self) -> PriceUpdate {
        PriceUpdate(
            self.prices
                .iter()
                .filter_map(|(instrument, price)| price.to_f64().map(|p| (*instrument, p)))
                .collect(),
        )
    }
}

/// Live feed message: a flat object keyed by instrument id
///
/// ```json
/// {"bitcoin": 50000.12, "ethereum": 3012.5, "binancecoin": 312.4}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceUpdate(pub BTreeMap<Instrument, f64>);
