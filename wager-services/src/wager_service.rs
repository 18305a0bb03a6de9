//! Wager Service
//!
//! Application-facing operations over the wager store.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};
use wager_core::{
    potential_payout, CreateWagerRequest, Multiplier, Wager, WagerError, WagerId, WagerResult,
    WagerStats,
};

use crate::store::WagerStore;

/// Default number of settled wagers returned by history queries
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Service for creating and querying wagers
pub struct WagerService {
    store: Arc<dyn WagerStore>,
}

impl WagerService {
    pub fn new(store: Arc<dyn WagerStore>) -> Self {
        Self { store }
    }

    /// Validate and persist a new wager, starting now unless the request says otherwise
    pub fn create_wager(&self, request: &CreateWagerRequest) -> WagerResult<Wager> {
        self.create_wager_at(request, Utc::now())
    }

    pub fn create_wager_at(
        &self,
        request: &CreateWagerRequest,
        now: DateTime<Utc>,
    ) -> WagerResult<Wager> {
        let new_wager = request.validate(now)?;
        let wager = self.store.create(new_wager)?;

        info!(
            "Created {}: {} {} {} on {} from {} (target {})",
            wager.id,
            wager.amount,
            wager.direction,
            wager.multiplier,
            wager.instrument_id,
            wager.start_price,
            wager.target_price
        );

        Ok(wager)
    }

    pub fn active_wagers(&self) -> WagerResult<Vec<Wager>> {
        Ok(self.store.list_active()?)
    }

    /// Settled wagers, most recent first
    pub fn recent_wagers(&self, limit: Option<usize>) -> WagerResult<Vec<Wager>> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        debug!("Fetching {} most recent settled wagers", limit);
        Ok(self.store.list_settled(Some(limit))?)
    }

    pub fn wager(&self, id: WagerId) -> WagerResult<Wager> {
        self.store.get(id)?.ok_or(WagerError::NotFound(id))
    }

    /// Aggregate outcome statistics over all settled wagers
    pub fn stats(&self) -> WagerResult<WagerStats> {
        let settled = self.store.list_settled(None)?;
        Ok(WagerStats::from_wagers(&settled))
    }

    /// Gross payout a winning wager returns
    pub fn potential_payout(&self, amount: Decimal, multiplier: Multiplier) -> WagerResult<Decimal> {
        Ok(potential_payout(amount, multiplier)?)
    }
}
