//! Tick driver
//!
//! Runs `refresh -> publish -> evaluate` as one sequential unit on a fixed
//! interval. A slow tick delays the next one instead of overlapping it.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};
use wager_core::{PriceOrigin, PriceSnapshot};

use crate::broadcaster::{PriceBroadcaster, PublishReport};
use crate::config::DriverConfig;
use crate::price_cache::PriceCache;
use crate::settlement::{SettlementEngine, SettlementReport};

/// What a single tick did
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub snapshot: PriceSnapshot,
    /// `None` when the snapshot was empty
    pub publish: Option<PublishReport>,
    /// `None` when the snapshot was empty or listing active wagers failed
    pub settlement: Option<SettlementReport>,
}

/// Owns the periodic price/settlement loop
pub struct TickDriver {
    cache: Arc<PriceCache>,
    broadcaster: Arc<PriceBroadcaster>,
    engine: SettlementEngine,
    config: DriverConfig,
}

impl TickDriver {
    pub fn new(
        cache: Arc<PriceCache>,
        broadcaster: Arc<PriceBroadcaster>,
        engine: SettlementEngine,
        config: DriverConfig,
    ) -> Self {
        Self {
            cache,
            broadcaster,
            engine,
            config,
        }
    }

    /// Run one tick against the wall clock
    pub async fn tick_once(&self) -> TickOutcome {
        self.tick_at(Utc::now()).await
    }

    /// Run one tick, settling against `now`
    pub async fn tick_at(&self, now: DateTime<Utc>) -> TickOutcome {
        let snapshot = self.cache.refresh().await;

        if snapshot.is_empty() {
            debug!("No prices yet, skipping publish and settlement");
            return TickOutcome {
                snapshot,
                publish: None,
                settlement: None,
            };
        }

        let publish = self.broadcaster.publish(&snapshot);
        if publish.delivered > 0 || publish.lagging > 0 || publish.dropped > 0 {
            debug!(
                "Published {:?} prices: {} delivered, {} unchanged, {} lagging, {} dropped",
                snapshot.origin,
                publish.delivered,
                publish.unchanged,
                publish.lagging,
                publish.dropped
            );
        }

        let settlement = match self.engine.evaluate(&snapshot, now) {
            Ok(report) => {
                log_settlement(&report, snapshot.origin);
                Some(report)
            }
            Err(e) => {
                error!("Failed to list active wagers: {}", e);
                None
            }
        };

        TickOutcome {
            snapshot,
            publish: Some(publish),
            settlement,
        }
    }

    /// Drive ticks until `shutdown` flips to `true` or its sender is dropped
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting tick driver with {:?} interval",
            self.config.tick_interval
        );

        let mut ticker = interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Tick driver stopped");
    }
}

fn log_settlement(report: &SettlementReport, origin: PriceOrigin) {
    if report.is_idle() {
        return;
    }

    info!(
        "Settlement pass on {:?} prices: {} settled, {} missing price, {} already settled, {} failed, {} pending",
        origin,
        report.settled.len(),
        report.skipped_missing_price,
        report.already_settled,
        report.failed,
        report.not_expired
    );
}
