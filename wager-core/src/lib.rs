//! Core types for the price-move wagering service
//!
//! This crate defines the shared data structures used across the service,
//! including instruments, wagers and their settlement math, and price snapshots.

pub mod error;
pub mod instrument;
pub mod price;
pub mod stats;
pub mod wager;

pub use error::{ValidationError, WagerError, WagerResult};
pub use instrument::Instrument;
pub use price::{PriceOrigin, PriceSnapshot, PriceUpdate};
pub use stats::WagerStats;
pub use wager::{
    potential_payout, target_price, CreateWagerRequest, Direction, Multiplier, NewWager,
    Settlement, Wager, WagerId, WagerStatus, WAGER_WINDOW_SECS,
};
