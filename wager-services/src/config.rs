//! Service configuration
//!
//! Values are read from environment variables, falling back to defaults.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::price_source::COINGECKO_API_BASE;

/// Tuning for the price cache
#[derive(Debug, Clone)]
pub struct PriceCacheConfig {
    /// Minimum spacing between successful real fetches
    pub min_refresh_interval: Duration,
    /// Deadline for a single upstream fetch
    pub fetch_timeout: Duration,
    /// Max relative perturbation of simulated prices (0.0001 = 0.01%)
    pub jitter: f64,
    /// Delay after the first failed fetch
    pub backoff_base: Duration,
    /// Cap on the failure backoff
    pub backoff_max: Duration,
}

impl Default for PriceCacheConfig {
    fn default() -> Self {
        Self {
            min_refresh_interval: Duration::from_secs(10),
            fetch_timeout: Duration::from_secs(5),
            jitter: 0.0001,
            backoff_base: Duration::from_secs(2),
            backoff_max: Duration::from_secs(60),
        }
    }
}

/// Tuning for the tick driver
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub tick_interval: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
        }
    }
}

/// Top-level configuration for the wagering service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub server_port: u16,
    pub price_cache: PriceCacheConfig,
    pub driver: DriverConfig,
    pub coingecko_api_base: String,
    pub coingecko_api_key: Option<String>,
    /// SQLite database for wagers; in-memory store when unset
    pub wager_db_path: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server_port: 3001,
            price_cache: PriceCacheConfig::default(),
            driver: DriverConfig::default(),
            coingecko_api_base: COINGECKO_API_BASE.to_string(),
            coingecko_api_key: None,
            wager_db_path: None,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables
    ///
    /// Recognized:
    /// - SERVER_PORT
    /// - TICK_INTERVAL_MS
    /// - PRICE_MIN_REFRESH_SECS, PRICE_FETCH_TIMEOUT_SECS, PRICE_JITTER
    /// - PRICE_BACKOFF_BASE_SECS, PRICE_BACKOFF_MAX_SECS
    /// - COINGECKO_API_BASE, COINGECKO_API_KEY
    /// - WAGER_DB_PATH
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let cache_defaults = &defaults.price_cache;

        let jitter = parse_or(&lookup, "PRICE_JITTER", cache_defaults.jitter)?;
        if !(0.0..1.0).contains(&jitter) {
            return Err(ConfigError::OutOfRange {
                field: "PRICE_JITTER".to_string(),
                reason: "must be in [0, 1)".to_string(),
            });
        }

        let tick_interval_ms = parse_or(
            &lookup,
            "TICK_INTERVAL_MS",
            defaults.driver.tick_interval.as_millis() as u64,
        )?;
        if tick_interval_ms == 0 {
            return Err(ConfigError::OutOfRange {
                field: "TICK_INTERVAL_MS".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        let price_cache = PriceCacheConfig {
            min_refresh_interval: secs_or(&lookup, "PRICE_MIN_REFRESH_SECS", cache_defaults.min_refresh_interval)?,
            fetch_timeout: secs_or(&lookup, "PRICE_FETCH_TIMEOUT_SECS", cache_defaults.fetch_timeout)?,
            jitter,
            backoff_base: secs_or(&lookup, "PRICE_BACKOFF_BASE_SECS", cache_defaults.backoff_base)?,
            backoff_max: secs_or(&lookup, "PRICE_BACKOFF_MAX_SECS", cache_defaults.backoff_max)?,
        };

        Ok(Self {
            server_port: parse_or(&lookup, "SERVER_PORT", defaults.server_port)?,
            price_cache,
            driver: DriverConfig {
                tick_interval: Duration::from_millis(tick_interval_ms),
            },
            coingecko_api_base: lookup("COINGECKO_API_BASE").unwrap_or(defaults.coingecko_api_base),
            coingecko_api_key: lookup("COINGECKO_API_KEY").filter(|k| !k.is_empty()),
            wager_db_path: lookup("WAGER_DB_PATH")
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            field: key.to_string(),
            error: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn secs_or<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, key, default.as_secs()).map(Duration::from_secs)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {error}")]
    InvalidValue { field: String, error: String },

    #[error("{field} out of range: {reason}")]
    OutOfRange { field: String, reason: String },
}
