use crate::domain::ids::{ChargeId, OrganizationId, PaymentId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Identity of a lockable row.
///
/// The variant order is the global lock order: a transaction locks its
/// payment before an external id, and external ids before charges.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RowKey {
    Payment(PaymentId),
    ExternalId(OrganizationId, String),
    Charge(ChargeId),
}

const PRUNE_THRESHOLD: usize = 1024;

/// Process-wide table of exclusive row locks.
///
/// Each row maps to a `tokio::sync::Mutex<()>`; holding its owned guard is
/// holding the row. Slots nobody holds or waits on are pruned once the
/// table grows past a threshold.
#[derive(Default)]
pub struct RowLocks {
    rows: Mutex<HashMap<RowKey, Arc<AsyncMutex<()>>>>,
}

impl RowLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &RowKey) -> Arc<AsyncMutex<()>> {
        let mut rows = self.rows.lock();
        if rows.len() >= PRUNE_THRESHOLD {
            rows.retain(|_, slot| Arc::strong_count(slot) > 1);
        }
        rows.entry(key.clone()).or_default().clone()
    }

    async fn acquire(&self, key: &RowKey) -> OwnedMutexGuard<()> {
        self.slot(key).lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.rows.lock().len()
    }
}

/// The locks held by one transaction. Dropping it releases all of them.
pub struct LockSet {
    locks: Arc<RowLocks>,
    held: HashMap<RowKey, OwnedMutexGuard<()>>,
}

impl LockSet {
    pub fn new(locks: Arc<RowLocks>) -> Self {
        Self {
            locks,
            held: HashMap::new(),
        }
    }

    /// Waits for an exclusive hold on `key`. Re-locking a held row is a no-op.
    pub async fn lock(&mut self, key: RowKey) {
        if self.held.contains_key(&key) {
            return;
        }
        let guard = self.locks.acquire(&key).await;
        self.held.insert(key, guard);
    }

    /// Locks every key in ascending [`RowKey`] order.
    pub async fn lock_all(&mut self, keys: impl IntoIterator<Item = RowKey>) {
        let mut keys: Vec<RowKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();
        for key in keys {
            self.lock(key).await;
        }
    }

    pub fn holds(&self, key: &RowKey) -> bool {
        self.held.contains_key(key)
    }

    pub fn release_all(&mut self) {
        self.held.clear();
    }
}
