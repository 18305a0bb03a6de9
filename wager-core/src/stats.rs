//! Aggregate statistics over settled wagers

use rust_decimal::Decimal;
use serde::Serialize;

use crate::Wager;

/// Win/loss summary for a set of wagers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WagerStats {
    pub total_wagers: usize,
    pub winning_wagers: usize,
    pub losing_wagers: usize,
    pub total_profit: Decimal,
    /// Percentage of settled wagers that won (0-100)
    pub win_rate: Decimal,
}

impl WagerStats {
    /// Summarize the settled wagers in `wagers`; active ones are ignored
    pub fn from_wagers<'a>(wagers: impl IntoIterator<Item = &'a Wager>) -> Self {
        let mut stats = wagers
            .into_iter()
            .filter_map(|w| w.settlement.as_ref())
            .fold(WagerStats::default(), |mut acc, settlement| {
                acc.total_wagers += 1;
                if settlement.won {
                    acc.winning_wagers += 1;
                } else {
                    acc.losing_wagers += 1;
                }
                acc.total_profit = acc.total_profit.saturating_add(settlement.profit);
                acc
            });

        if stats.total_wagers > 0 {
            stats.win_rate = Decimal::from(stats.winning_wagers as u64) * Decimal::ONE_HUNDRED
                / Decimal::from(stats.total_wagers as u64);
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Direction, Instrument, Multiplier, NewWager, WagerId, WAGER_WINDOW_SECS};
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn settled(id: u64, multiplier: Multiplier, final_price: Decimal) -> Wager {
        let start = Utc::now();
        let mut wager = NewWager::new(
            Instrument::Ethereum,
            dec!(10),
            multiplier,
            Direction::Up,
            dec!(3000),
            start,
            start + Duration::seconds(WAGER_WINDOW_SECS),
        )
        .unwrap()
        .into_wager(WagerId(id));
        let settlement = wager.settlement_at(final_price, wager.end_time).unwrap();
        wager.apply_settlement(settlement).unwrap();
        wager
    }

    #[test]
    fn test_empty() {
        let stats = WagerStats::from_wagers(&[]);
        assert_eq!(stats, WagerStats::default());
    }

    #[test]
    fn test_mixed_outcomes() {
        let wagers = vec![
            settled(1, Multiplier::X3, dec!(4000)),
            settled(2, Multiplier::X2, dec!(2900)),
            settled(3, Multiplier::X1, dec!(2000)),
            settled(4, Multiplier::X5, dec!(3090)),
        ];

        let stats = WagerStats::from_wagers(&wagers);
        assert_eq!(stats.total_wagers, 4);
        assert_eq!(stats.winning_wagers, 2);
        assert_eq!(stats.losing_wagers, 2);
        // +20 (3x) -10 -10 +40 (5x)
        assert_eq!(stats.total_profit, dec!(40));
        assert_eq!(stats.win_rate, dec!(50));
    }
}
