//! SQLite-backed wager store
//!
//! Decimals are stored as TEXT to keep them exact; timestamps as
//! microseconds since the Unix epoch.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use tracing::info;
use wager_core::{
    Direction, Instrument, Multiplier, NewWager, Settlement, Wager, WagerId, WagerStatus,
};

use super::{StoreError, WagerStore};

const SELECT_COLUMNS: &str = r#"
    SELECT id, instrument, amount, multiplier, direction, start_price, target_price,
           start_time, end_time, status, final_price, won, profit, completed_at
    FROM wagers
"#;

/// Wager storage service using SQLite
pub struct SqliteWagerStore {
    conn: Mutex<Connection>,
}

impl SqliteWagerStore {
    /// Open (or create) the database at `db_path`
    ///
    /// Creates the parent directory and tables if they don't exist.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Io(format!("Failed to create database directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path.as_ref())?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;

        info!("Opened wager database at {}", db_path.as_ref().display());
        Ok(store)
    }

    /// Create an in-memory store (useful for testing)
    pub fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS wagers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                instrument TEXT NOT NULL,
                amount TEXT NOT NULL,
                multiplier INTEGER NOT NULL,
                direction TEXT NOT NULL,
                start_price TEXT NOT NULL,
                target_price TEXT NOT NULL,
                start_time INTEGER NOT NULL,
                end_time INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                final_price TEXT,
                won INTEGER,
                profit TEXT,
                completed_at INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_wagers_status_end
            ON wagers(status, end_time);

            CREATE INDEX IF NOT EXISTS idx_wagers_completed
            ON wagers(status, completed_at);
            "#,
        )?;

        Ok(())
    }

    fn query(&self, sql: &str, limit: Option<i64>) -> Result<Vec<Wager>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;

        let rows = match limit {
            Some(l) => stmt.query_map(params![l], RawWager::from_row)?,
            None => stmt.query_map([], RawWager::from_row)?,
        };

        let wagers = rows
            .map(|row| row.map_err(StoreError::from).and_then(RawWager::into_wager))
            .collect::<Result<Vec<_>, _>>();
        wagers
    }
}

impl WagerStore for SqliteWagerStore {
    fn create(&self, wager: NewWager) -> Result<Wager, StoreError> {
        let id = {
            let conn = self.conn.lock();
            conn.execute(
                r#"
                INSERT INTO wagers (instrument, amount, multiplier, direction, start_price,
                                    target_price, start_time, end_time, status)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'active')
                "#,
                params![
                    wager.instrument().id(),
                    wager.amount().to_string(),
                    wager.multiplier().value(),
                    wager.direction().as_str(),
                    wager.start_price().to_string(),
                    wager.target_price().to_string(),
                    wager.start_time().timestamp_micros(),
                    wager.end_time().timestamp_micros(),
                ],
            )?;
            WagerId(conn.last_insert_rowid() as u64)
        };

        self.get(id)?.ok_or(StoreError::NotFound(id))
    }

    fn get(&self, id: WagerId) -> Result<Option<Wager>, StoreError> {
        let raw = {
            let conn = self.conn.lock();
            conn.query_row(
                &format!("{} WHERE id = ?1", SELECT_COLUMNS),
                params![id.0 as i64],
                RawWager::from_row,
            )
            .optional()?
        };

        raw.map(RawWager::into_wager).transpose()
    }

    fn list_active(&self) -> Result<Vec<Wager>, StoreError> {
        self.query(
            &format!("{} WHERE status = 'active' ORDER BY end_time ASC, id ASC", SELECT_COLUMNS),
            None,
        )
    }

    fn list_settled(&self, limit: Option<usize>) -> Result<Vec<Wager>, StoreError> {
        // SQLite treats a negative LIMIT as "no limit"
        let limit = limit.map_or(-1, |l| l as i64);
        self.query(
            &format!(
                "{} WHERE status = 'settled' ORDER BY completed_at DESC, id DESC LIMIT ?1",
                SELECT_COLUMNS
            ),
            Some(limit),
        )
    }

    fn settle(&self, id: WagerId, settlement: &Settlement) -> Result<Wager, StoreError> {
        let changed = {
            let conn = self.conn.lock();
            conn.execute(
                r#"
                UPDATE wagers
                SET status = 'settled', final_price = ?2, won = ?3, profit = ?4, completed_at = ?5
                WHERE id = ?1 AND status = 'active'
                "#,
                params![
                    id.0 as i64,
                    settlement.final_price.to_string(),
                    settlement.won,
                    settlement.profit.to_string(),
                    settlement.completed_at.timestamp_micros(),
                ],
            )?
        };

        match (changed, self.get(id)?) {
            (0, None) => Err(StoreError::NotFound(id)),
            (0, Some(_)) => Err(StoreError::AlreadySettled(id)),
            (_, Some(wager)) => Ok(wager),
            (_, None) => Err(StoreError::NotFound(id)),
        }
    }
}

/// Column values as stored, before domain validation
struct RawWager {
    id: i64,
    instrument: String,
    amount: String,
    multiplier: u32,
    direction: String,
    start_price: String,
    target_price: String,
    start_time: i64,
    end_time: i64,
    status: String,
    final_price: Option<String>,
    won: Option<bool>,
    profit: Option<String>,
    completed_at: Option<i64>,
}

impl RawWager {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            instrument: row.get(1)?,
            amount: row.get(2)?,
            multiplier: row.get(3)?,
            direction: row.get(4)?,
            start_price: row.get(5)?,
            target_price: row.get(6)?,
            start_time: row.get(7)?,
            end_time: row.get(8)?,
            status: row.get(9)?,
            final_price: row.get(10)?,
            won: row.get(11)?,
            profit: row.get(12)?,
            completed_at: row.get(13)?,
        })
    }

    fn into_wager(self) -> Result<Wager, StoreError> {
        let id = WagerId(self.id as u64);
        let corrupt = |what: &str| StoreError::Corrupt(format!("{}: bad {}", id, what));

        let instrument: Instrument = self.instrument.parse().map_err(|_| corrupt("instrument"))?;
        let multiplier = Multiplier::try_from(self.multiplier).map_err(|_| corrupt("multiplier"))?;
        let direction: Direction = self.direction.parse().map_err(|_| corrupt("direction"))?;

        let status = match self.status.as_str() {
            "active" => WagerStatus::Active,
            "settled" => WagerStatus::Settled,
            _ => return Err(corrupt("status")),
        };

        let settlement = match (status, self.final_price, self.won, self.profit, self.completed_at) {
            (WagerStatus::Active, ..) => None,
            (WagerStatus::Settled, Some(final_price), Some(won), Some(profit), Some(completed_at)) => {
                Some(Settlement {
                    final_price: decimal(&final_price).ok_or_else(|| corrupt("final_price"))?,
                    won,
                    profit: decimal(&profit).ok_or_else(|| corrupt("profit"))?,
                    completed_at: timestamp(completed_at).ok_or_else(|| corrupt("completed_at"))?,
                })
            }
            (WagerStatus::Settled, ..) => return Err(corrupt("settlement fields")),
        };

        Ok(Wager {
            id,
            instrument_id: instrument,
            amount: decimal(&self.amount).ok_or_else(|| corrupt("amount"))?,
            multiplier,
            direction,
            start_price: decimal(&self.start_price).ok_or_else(|| corrupt("start_price"))?,
            target_price: decimal(&self.target_price).ok_or_else(|| corrupt("target_price"))?,
            start_time: timestamp(self.start_time).ok_or_else(|| corrupt("start_time"))?,
            end_time: timestamp(self.end_time).ok_or_else(|| corrupt("end_time"))?,
            status,
            settlement,
        })
    }
}

fn decimal(raw: &str) -> Option<Decimal> {
    Decimal::from_str(raw).ok()
}

fn timestamp(micros: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
}
