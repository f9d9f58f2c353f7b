use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One mutex per account. Structural mutations of an account run one at a
/// time; different accounts never contend.
#[derive(Debug, Default)]
pub struct AccountLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, owner_id: &str) -> AccountGuard<'_> {
        let mutex = self
            .locks
            .entry(owner_id.to_string())
            .or_default()
            .value()
            .clone();
        AccountGuard {
            guard: Some(mutex.lock_owned().await),
            locks: self,
            owner_id: owner_id.to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }
}

/// Held account lock. Dropping it releases the mutex and forgets the entry
/// when nobody else holds or waits on it.
pub struct AccountGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    locks: &'a AccountLocks,
    owner_id: String,
}

impl Drop for AccountGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map's own reference is left once every holder is gone
        self.locks
            .locks
            .remove_if(&self.owner_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
