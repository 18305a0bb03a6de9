//! Settlement Engine
//!
//! Resolves expired wagers against the current tick's price snapshot.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use wager_core::{PriceSnapshot, Wager};

use crate::store::{StoreError, WagerStore};

/// Outcome of one evaluation pass
#[derive(Debug, Clone, Default)]
pub struct SettlementReport {
    /// Wagers settled during this pass, as persisted
    pub settled: Vec<Wager>,
    /// Active wagers whose window has not closed yet
    pub not_expired: usize,
    /// Expired wagers with no price in the snapshot; retried next tick
    pub skipped_missing_price: usize,
    /// Expired wagers found settled on re-read
    pub already_settled: usize,
    /// Store writes that failed; the wager stays active
    pub failed: usize,
}

impl SettlementReport {
    pub fn is_idle(&self) -> bool {
        self.settled.is_empty()
            && self.skipped_missing_price == 0
            && self.already_settled == 0
            && self.failed == 0
    }
}

/// Applies the win rule to expired wagers and persists the result
pub struct SettlementEngine {
    store: Arc<dyn WagerStore>,
}

impl SettlementEngine {
    pub fn new(store: Arc<dyn WagerStore>) -> Self {
        Self { store }
    }

    /// Settle every active wager whose window closed at or before `now`
    ///
    /// Only failing to list active wagers is returned as an error. Per-wager
    /// problems are counted in the report and retried on the next pass.
    pub fn evaluate(
        &self,
        snapshot: &PriceSnapshot,
        now: DateTime<Utc>,
    ) -> Result<SettlementReport, StoreError> {
        let mut report = SettlementReport::default();

        for wager in self.store.list_active()? {
            if !wager.is_expired(now) {
                report.not_expired += 1;
                continue;
            }

            let Some(current) = snapshot.price(wager.instrument_id) else {
                debug!(
                    "No {} price for expired {}, retrying next tick",
                    wager.instrument_id, wager.id
                );
                report.skipped_missing_price += 1;
                continue;
            };

            match self.settle_wager(&wager, current, now) {
                Ok(Some(settled)) => report.settled.push(settled),
                Ok(None) | Err(StoreError::AlreadySettled(_)) => report.already_settled += 1,
                Err(e) => {
                    error!("Failed to settle {}: {}", wager.id, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Settle one wager at `current`
    ///
    /// Returns `Ok(None)` when the stored record is no longer active.
    fn settle_wager(
        &self,
        wager: &Wager,
        current: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Option<Wager>, StoreError> {
        match self.store.get(wager.id)? {
            Some(stored) if stored.is_active() => {}
            Some(_) => return Ok(None),
            None => {
                warn!("{} vanished before settlement", wager.id);
                return Err(StoreError::NotFound(wager.id));
            }
        }

        let settlement = wager
            .settlement_at(current, now)
            .map_err(|e| StoreError::Corrupt(format!("{}: {}", wager.id, e)))?;
        let settled = self.store.settle(wager.id, &settlement)?;

        info!(
            "Settled {} {} {} {}: final {} vs target {} -> {} ({})",
            settled.id,
            settled.instrument_id,
            settled.direction,
            settled.multiplier,
            settlement.final_price,
            settled.target_price,
            if settlement.won { "won" } else { "lost" },
            settlement.profit
        );

        Ok(Some(settled))
    }
}
