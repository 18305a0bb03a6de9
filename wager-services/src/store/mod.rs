//! Wager persistence
//!
//! The settlement engine and the wager service only see the [`WagerStore`]
//! contract. Calls are blocking.

mod memory;
mod sqlite;

pub use memory::MemoryWagerStore;
pub use sqlite::SqliteWagerStore;

use wager_core::{NewWager, Settlement, Wager, WagerError, WagerId};

/// Durable CRUD for wager records
pub trait WagerStore: Send + Sync {
    /// Persist a validated wager, assigning its id
    fn create(&self, wager: NewWager) -> Result<Wager, StoreError>;

    fn get(&self, id: WagerId) -> Result<Option<Wager>, StoreError>;

    /// All wagers with `status = active`
    fn list_active(&self) -> Result<Vec<Wager>, StoreError>;

    /// Settled wagers, most recently completed first, capped at `limit`
    fn list_settled(&self, limit: Option<usize>) -> Result<Vec<Wager>, StoreError>;

    /// Write the settlement fields and flip the status in one step
    ///
    /// Only applies to an active wager; fails with
    /// [`StoreError::AlreadySettled`] otherwise and leaves the record untouched.
    fn settle(&self, id: WagerId, settlement: &Settlement) -> Result<Wager, StoreError>;
}

/// Errors from wager storage
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Wager not found: {0}")]
    NotFound(WagerId),

    #[error("Wager already settled: {0}")]
    AlreadySettled(WagerId),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<StoreError> for WagerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => WagerError::NotFound(id),
            StoreError::AlreadySettled(id) => WagerError::AlreadySettled(id),
            other => WagerError::storage(other.to_string()),
        }
    }
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every store implementation must share

    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;
    use wager_core::{Direction, Instrument, Multiplier, WagerStatus, WAGER_WINDOW_SECS};

    pub fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
    }

    pub fn new_wager(instrument: Instrument) -> NewWager {
        NewWager::new(
            instrument,
            dec!(100),
            Multiplier::X2,
            Direction::Up,
            dec!(50000),
            start(),
            start() + Duration::seconds(WAGER_WINDOW_SECS),
        )
        .unwrap()
    }

    fn settlement(minutes_after_end: i64) -> Settlement {
        Settlement {
            final_price: dec!(51000),
            won: true,
            profit: dec!(100),
            completed_at: start() + Duration::hours(1) + Duration::minutes(minutes_after_end),
        }
    }

    pub fn create_assigns_unique_ids(store: &dyn WagerStore) {
        let a = store.create(new_wager(Instrument::Bitcoin)).unwrap();
        let b = store.create(new_wager(Instrument::Ethereum)).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.status, WagerStatus::Active);
        assert!(a.settlement.is_none());
        assert_eq!(a.target_price, dec!(51000));
        assert_eq!(store.get(a.id).unwrap(), Some(a));
    }

    pub fn get_missing_is_none(store: &dyn WagerStore) {
        assert!(store.get(WagerId(424242)).unwrap().is_none());
    }

    pub fn settle_moves_wager_out_of_active(store: &dyn WagerStore) {
        let a = store.create(new_wager(Instrument::Bitcoin)).unwrap();
        let b = store.create(new_wager(Instrument::Ethereum)).unwrap();

        let settled = store.settle(a.id, &settlement(0)).unwrap();
        assert_eq!(settled.status, WagerStatus::Settled);
        assert_eq!(settled.settlement, Some(settlement(0)));

        let active: Vec<WagerId> = store.list_active().unwrap().iter().map(|w| w.id).collect();
        assert_eq!(active, vec![b.id]);
    }

    pub fn settle_twice_is_rejected(store: &dyn WagerStore) {
        let a = store.create(new_wager(Instrument::Bitcoin)).unwrap();
        store.settle(a.id, &settlement(0)).unwrap();

        let mut other = settlement(5);
        other.won = false;
        other.profit = dec!(-100);
        assert!(matches!(
            store.settle(a.id, &other),
            Err(StoreError::AlreadySettled(id)) if id == a.id
        ));

        let stored = store.get(a.id).unwrap().unwrap();
        assert_eq!(stored.settlement, Some(settlement(0)));
    }

    pub fn settle_missing_is_not_found(store: &dyn WagerStore) {
        assert!(matches!(
            store.settle(WagerId(999), &settlement(0)),
            Err(StoreError::NotFound(WagerId(999)))
        ));
    }

    pub fn settled_listing_is_recent_first(store: &dyn WagerStore) {
        let ids: Vec<WagerId> = (0..4)
            .map(|_| store.create(new_wager(Instrument::BinanceCoin)).unwrap().id)
            .collect();

        store.settle(ids[0], &settlement(3)).unwrap();
        store.settle(ids[1], &settlement(1)).unwrap();
        store.settle(ids[2], &settlement(7)).unwrap();

        let all: Vec<WagerId> = store.list_settled(None).unwrap().iter().map(|w| w.id).collect();
        assert_eq!(all, vec![ids[2], ids[0], ids[1]]);

        let capped: Vec<WagerId> = store.list_settled(Some(2)).unwrap().iter().map(|w| w.id).collect();
        assert_eq!(capped, vec![ids[2], ids[0]]);
    }
}
