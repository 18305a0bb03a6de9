//! Retry backoff for upstream price fetches
//!
//! Tracks consecutive failures and the earliest instant the next real fetch
//! may be attempted. The delay doubles per failure and is capped.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Ceiling for both the base and the capped delay
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Exponential backoff gate keyed on consecutive failures
#[derive(Debug, Clone)]
pub struct RetryBackoff {
    /// Delay after the first failure
    base: Duration,
    /// Upper bound for any single delay
    max: Duration,
    /// Failures since the last success
    consecutive_failures: u32,
    /// No attempt may start before this instant
    retry_at: Option<Instant>,
}

impl RetryBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let base = base.min(MAX_BACKOFF);
        Self {
            base,
            max: max.clamp(base, MAX_BACKOFF),
            consecutive_failures: 0,
            retry_at: None,
        }
    }

    /// Whether an attempt may start at `now`
    pub fn ready(&self, now: Instant) -> bool {
        self.retry_at.is_none_or(|at| now >= at)
    }

    /// Record a failed attempt at `now`, returning the delay before the next one
    pub fn record_failure(&mut self, now: Instant) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let delay = self.current_delay();
        self.retry_at = Some(now.checked_add(delay).unwrap_or(now));

        debug!(
            "[Backoff] failure #{} - next attempt allowed in {:?}",
            self.consecutive_failures, delay
        );

        delay
    }

    /// Reset after a successful attempt
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.retry_at = None;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    fn current_delay(&self) -> Duration {
        if self.consecutive_failures == 0 {
            return Duration::ZERO;
        }
        let exponent = (self.consecutive_failures - 1).min(16);
        self.base
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |d| d.min(self.max))
    }
}
