use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::store::StoreError;

/// Exclusion key for a unit of work. Variant order is the acquisition order:
/// every shipment key is taken before any rider key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    Shipment(Uuid),
    Rider(Uuid),
}

impl std::fmt::Display for LockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockKey::Shipment(id) => write!(f, "shipment:{id}"),
            LockKey::Rider(id) => write!(f, "rider:{id}"),
        }
    }
}

pub(crate) struct LockManager {
    slots: DashMap<LockKey, Arc<Mutex<()>>>,
    timeout: Duration,
}

impl LockManager {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self {
            slots: DashMap::new(),
            timeout,
        }
    }

    pub(crate) async fn acquire(&self, key: LockKey) -> Result<OwnedMutexGuard<()>, StoreError> {
        // clone the slot out so no shard guard is held across the await
        let slot = self.slots.entry(key).or_default().clone();

        tokio::time::timeout(self.timeout, slot.lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout {
                key: key.to_string(),
            })
    }

    /// Drops the slot once nobody holds or waits on it.
    pub(crate) fn release(&self, key: &LockKey) {
        self.slots
            .remove_if(key, |_, slot| Arc::strong_count(slot) == 1);
    }

    #[cfg(test)]
    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }
}
