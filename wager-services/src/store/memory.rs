//! In-memory wager store

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use wager_core::{NewWager, Settlement, Wager, WagerError, WagerId};

use super::{StoreError, WagerStore};

/// Process-local store, lost on restart
#[derive(Debug)]
pub struct MemoryWagerStore {
    wagers: RwLock<BTreeMap<WagerId, Wager>>,
    next_id: AtomicU64,
}

impl MemoryWagerStore {
    pub fn new() -> Self {
        Self {
            wagers: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for MemoryWagerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WagerStore for MemoryWagerStore {
    fn create(&self, wager: NewWager) -> Result<Wager, StoreError> {
        let id = WagerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let wager = wager.into_wager(id);
        self.wagers.write().insert(id, wager.clone());
        Ok(wager)
    }

    fn get(&self, id: WagerId) -> Result<Option<Wager>, StoreError> {
        Ok(self.wagers.read().get(&id).cloned())
    }

    fn list_active(&self) -> Result<Vec<Wager>, StoreError> {
        Ok(self
            .wagers
            .read()
            .values()
            .filter(|w| w.is_active())
            .cloned()
            .collect())
    }

    fn list_settled(&self, limit: Option<usize>) -> Result<Vec<Wager>, StoreError> {
        let mut settled: Vec<Wager> = self
            .wagers
            .read()
            .values()
            .filter(|w| w.is_settled())
            .cloned()
            .collect();

        settled.sort_by(|a, b| {
            let a_at = a.settlement.as_ref().map(|s| s.completed_at);
            let b_at = b.settlement.as_ref().map(|s| s.completed_at);
            b_at.cmp(&a_at).then_with(|| b.id.cmp(&a.id))
        });

        if let Some(l) = limit {
            settled.truncate(l);
        }

        Ok(settled)
    }

    fn settle(&self, id: WagerId, settlement: &Settlement) -> Result<Wager, StoreError> {
        let mut wagers = self.wagers.write();
        let wager = wagers.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        wager
            .apply_settlement(settlement.clone())
            .map_err(|e| match e {
                WagerError::AlreadySettled(id) => StoreError::AlreadySettled(id),
                other => StoreError::Corrupt(other.to_string()),
            })?;

        Ok(wager.clone())
    }
}
