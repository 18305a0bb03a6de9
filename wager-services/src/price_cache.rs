//! Price Cache Service
//!
//! Holds the last real price batch from the upstream source and produces a
//! snapshot for every supported instrument on every poll. Real fetches are
//! spaced by a minimum interval (and a failure backoff); between them the
//! cache synthesizes small perturbations around the last real batch so
//! consumers always observe a value and observe motion.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use wager_core::{Instrument, PriceOrigin, PriceSnapshot};

use crate::backoff::RetryBackoff;
use crate::config::PriceCacheConfig;
use crate::price_source::{PriceSource, PriceSourceError};

/// State owned exclusively by the refresh step
#[derive(Debug)]
struct CacheState {
    /// Last complete real batch; the anchor every simulated price derives from
    last_real: BTreeMap<Instrument, Decimal>,
    /// When `last_real` was fetched
    last_fetch_at: Option<Instant>,
    last_fetch_wall: Option<DateTime<Utc>>,
    backoff: RetryBackoff,
}

/// Why a real fetch was not adopted
#[derive(Debug, thiserror::Error)]
enum FetchFailure {
    #[error("{0}")]
    Source(#[from] PriceSourceError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("partial batch, missing {0:?}")]
    Partial(Vec<Instrument>),
}

/// Price cache with degraded-mode simulation
pub struct PriceCache {
    source: Arc<dyn PriceSource>,
    config: PriceCacheConfig,
    state: RwLock<CacheState>,
    /// Serializes refresh calls so the anchor has a single writer
    refresh_gate: tokio::sync::Mutex<()>,
    fetched: AtomicU64,
    failed: AtomicU64,
    rejected_partial: AtomicU64,
    simulated: AtomicU64,
}

impl PriceCache {
    /// Create a cold cache; the first `refresh()` attempts a real fetch
    pub fn new(source: Arc<dyn PriceSource>, config: PriceCacheConfig) -> Self {
        let backoff = RetryBackoff::new(config.backoff_base, config.backoff_max);
        Self {
            source,
            config,
            state: RwLock::new(CacheState {
                last_real: BTreeMap::new(),
                last_fetch_at: None,
                last_fetch_wall: None,
                backoff,
            }),
            refresh_gate: tokio::sync::Mutex::new(()),
            fetched: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            rejected_partial: AtomicU64::new(0),
            simulated: AtomicU64::new(0),
        }
    }

    /// Produce the snapshot for this poll
    ///
    /// Never fails: upstream problems degrade to the last real batch or a
    /// simulated one. Returns an empty snapshot until the first real fetch
    /// succeeds.
    pub async fn refresh(&self) -> PriceSnapshot {
        let _gate = self.refresh_gate.lock().await;
        let now = Instant::now();

        if !self.fetch_due(now) {
            return self.simulate();
        }

        match self.fetch_complete_batch().await {
            Ok(prices) => self.adopt(prices, now),
            Err(failure) => {
                if matches!(failure, FetchFailure::Partial(_)) {
                    self.rejected_partial.fetch_add(1, Ordering::Relaxed);
                }
                self.failed.fetch_add(1, Ordering::Relaxed);

                let delay = self.state.write().backoff.record_failure(now);
                warn!(
                    "[PriceCache] Fetch from {} rejected: {} (retry in {:?})",
                    self.source.name(),
                    failure,
                    delay
                );

                self.fallback()
            }
        }
    }

    fn fetch_due(&self, now: Instant) -> bool {
        let state = self.state.read();
        let interval_elapsed = state
            .last_fetch_at
            .is_none_or(|at| now.duration_since(at) >= self.config.min_refresh_interval);
        interval_elapsed && state.backoff.ready(now)
    }

    async fn fetch_complete_batch(&self) -> Result<BTreeMap<Instrument, Decimal>, FetchFailure> {
        let quotes: HashMap<Instrument, Decimal> = tokio::time::timeout(
            self.config.fetch_timeout,
            self.source.fetch_prices(&Instrument::ALL),
        )
        .await
        .map_err(|_| FetchFailure::Timeout(self.config.fetch_timeout))??;

        let missing: Vec<Instrument> = Instrument::ALL
            .into_iter()
            .filter(|i| !quotes.contains_key(i))
            .collect();
        if !missing.is_empty() {
            return Err(FetchFailure::Partial(missing));
        }

        Ok(quotes.into_iter().collect())
    }

    fn adopt(&self, prices: BTreeMap<Instrument, Decimal>, now: Instant) -> PriceSnapshot {
        let as_of = Utc::now();
        {
            let mut state = self.state.write();
            if state.backoff.consecutive_failures() > 0 {
                info!(
                    "[PriceCache] Upstream recovered after {} failed fetches",
                    state.backoff.consecutive_failures()
                );
            }
            state.last_real = prices.clone();
            state.last_fetch_at = Some(now);
            state.last_fetch_wall = Some(as_of);
            state.backoff.record_success();
        }
        self.fetched.fetch_add(1, Ordering::Relaxed);
        debug!("[PriceCache] Adopted real batch of {} prices", prices.len());

        PriceSnapshot::new(prices, PriceOrigin::Fetched, as_of)
    }

    /// Last real batch unchanged, or empty if there is none
    fn fallback(&self) -> PriceSnapshot {
        let state = self.state.read();
        if state.last_real.is_empty() {
            return PriceSnapshot::empty(Utc::now());
        }
        PriceSnapshot::new(state.last_real.clone(), PriceOrigin::Fallback, Utc::now())
    }

    /// Perturb every anchor price; the anchor itself is never touched
    fn simulate(&self) -> PriceSnapshot {
        let state = self.state.read();
        if state.last_real.is_empty() {
            return PriceSnapshot::empty(Utc::now());
        }

        let mut rng = rand::rng();
        let prices = state
            .last_real
            .iter()
            .map(|(instrument, anchor)| {
                let unit: f64 = rng.random_range(-1.0..=1.0);
                (*instrument, perturb(*anchor, unit, self.config.jitter))
            })
            .collect();
        self.simulated.fetch_add(1, Ordering::Relaxed);

        PriceSnapshot::new(prices, PriceOrigin::Simulated, Utc::now())
    }

    /// The last real batch, if any fetch has succeeded
    pub fn last_known(&self) -> Option<PriceSnapshot> {
        let state = self.state.read();
        if state.last_real.is_empty() {
            return None;
        }
        Some(PriceSnapshot::new(
            state.last_real.clone(),
            PriceOrigin::Fetched,
            state.last_fetch_wall.unwrap_or_else(Utc::now),
        ))
    }

    /// Whether at least one real fetch has succeeded
    pub fn is_ready(&self) -> bool {
        !self.state.read().last_real.is_empty()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let state = self.state.read();
        CacheStats {
            ready: !state.last_real.is_empty(),
            fetched: self.fetched.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rejected_partial: self.rejected_partial.load(Ordering::Relaxed),
            simulated: self.simulated.load(Ordering::Relaxed),
            consecutive_failures: state.backoff.consecutive_failures(),
            last_fetch_at: state.last_fetch_wall,
            last_fetch_age_secs: state.last_fetch_at.map(|at| at.elapsed().as_secs()),
        }
    }
}

/// Move `anchor` by `unit * jitter` of itself, `unit` in [-1, 1]
///
/// The sign of `jitter` is ignored; a non-finite jitter or an overflowing
/// move leaves the anchor unchanged.
fn perturb(anchor: Decimal, unit: f64, jitter: f64) -> Decimal {
    let jitter = jitter.abs();
    let Some(bound) = Decimal::from_f64(jitter).and_then(|j| anchor.checked_mul(j)) else {
        return anchor;
    };
    let bound = bound.abs();
    let delta = Decimal::from_f64(unit.clamp(-1.0, 1.0) * jitter)
        .and_then(|factor| anchor.checked_mul(factor))
        .map(|d| d.round_dp(8))
        .unwrap_or_default();
    anchor.checked_add(delta.clamp(-bound, bound)).unwrap_or(anchor)
}

/// Cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub ready: bool,
    pub fetched: u64,
    pub failed: u64,
    pub rejected_partial: u64,
    pub simulated: u64,
    pub consecutive_failures: u32,
    pub last_fetch_at: Option<DateTime<Utc>>,
    pub last_fetch_age_secs: Option<u64>,
}
