//! Supported instruments

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ValidationError;

/// Assets eligible for wagering
///
/// Adding a variant requires extending [`Instrument::ALL`] as well; the
/// multiplier table is shared by every instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Instrument {
    Bitcoin,
    Ethereum,
    BinanceCoin,
}

impl Instrument {
    /// Every supported instrument, in feed order
    pub const ALL: [Instrument; 3] = [
        Instrument::Bitcoin,
        Instrument::Ethereum,
        Instrument::BinanceCoin,
    ];

    /// Identifier used on the wire and by the upstream price source
    pub fn id(&self) -> &'static str {
        match self {
            Instrument::Bitcoin => "bitcoin",
            Instrument::Ethereum => "ethereum",
            Instrument::BinanceCoin => "binancecoin",
        }
    }

    /// Get the full display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Instrument::Bitcoin => "Bitcoin",
            Instrument::Ethereum => "Ethereum",
            Instrument::BinanceCoin => "BNB",
        }
    }

    /// Ticker symbol
    pub fn symbol(&self) -> &'static str {
        match self {
            Instrument::Bitcoin => "BTC",
            Instrument::Ethereum => "ETH",
            Instrument::BinanceCoin => "BNB",
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl std::str::FromStr for Instrument {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Instrument::ALL
            .into_iter()
            .find(|instrument| instrument.id() == s)
            .ok_or_else(|| ValidationError::UnsupportedInstrument(s.to_string()))
    }
}
