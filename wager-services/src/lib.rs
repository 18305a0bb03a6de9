//! Business logic services for the price-move wagering service
//!
//! This crate provides the price cache, the live price broadcaster, the
//! settlement engine and the wager store, plus the tick driver that ties
//! them together.

pub mod backoff;
pub mod broadcaster;
pub mod config;
pub mod driver;
pub mod price_cache;
pub mod price_source;
pub mod settlement;
pub mod store;
pub mod wager_service;

pub use backoff::RetryBackoff;
pub use broadcaster::{PriceBroadcaster, PublishReport, SubscriberId};
pub use config::{ConfigError, DriverConfig, PriceCacheConfig, ServiceConfig};
pub use driver::{TickDriver, TickOutcome};
pub use price_cache::{CacheStats, PriceCache};
pub use price_source::{CoinGeckoClient, PriceSource, PriceSourceError, COINGECKO_API_BASE};
pub use settlement::{SettlementEngine, SettlementReport};
pub use store::{MemoryWagerStore, SqliteWagerStore, StoreError, WagerStore};
pub use wager_service::{WagerService, DEFAULT_HISTORY_LIMIT};
