//! Error types for the wagering service

use rust_decimal::Decimal;
use thiserror::Error;

use crate::WagerId;

/// Rejection reasons for wager input
///
/// Each variant names the constraint that failed so callers can surface it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Unsupported instrument: {0}")]
    UnsupportedInstrument(String),

    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    #[error("Unsupported multiplier: {0} (allowed: 1, 2, 3, 5)")]
    UnsupportedMultiplier(u32),

    #[error("Unsupported direction: {0} (allowed: up, down)")]
    UnsupportedDirection(String),

    #[error("Start price must be positive, got {0}")]
    NonPositiveStartPrice(Decimal),

    #[error("Amount too large: {0}")]
    AmountTooLarge(Decimal),

    #[error("Start price too large: {0}")]
    StartPriceTooLarge(Decimal),

    #[error("End time must be exactly {expected_secs}s after start time")]
    InvalidWindow { expected_secs: i64 },
}

/// Service-wide error type
#[derive(Error, Debug)]
pub enum WagerError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Wager not found: {0}")]
    NotFound(WagerId),

    #[error("Wager already settled: {0}")]
    AlreadySettled(WagerId),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WagerError {
    pub fn storage(msg: impl Into<String>) -> Self {
        WagerError::Storage(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        WagerError::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        WagerError::Internal(msg.into())
    }
}

/// Result type alias for wager operations
pub type WagerResult<T> = Result<T, WagerError>;
