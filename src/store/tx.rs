use chrono::Utc;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;
use uuid::Uuid;

use crate::models::assignment::Assignment;
use crate::models::shipment::{Shipment, ShipmentStatus};
use crate::store::locks::LockKey;
use crate::store::tables::Write;
use crate::store::{Store, StoreError};

/// An exclusive, all-or-nothing unit of work over a set of shipment and rider
/// keys. Writes are staged until `commit`; dropping without committing
/// discards them. Row reads by id see the unit's own staged writes, index
/// lookups (`active_assignment_for_*`) see committed state only.
pub struct UnitOfWork<'a> {
    store: &'a Store,
    held: Vec<(LockKey, OwnedMutexGuard<()>)>,
    writes: Vec<Write>,
    committed: bool,
}

impl<'a> UnitOfWork<'a> {
    pub(crate) async fn begin(store: &'a Store, keys: &[LockKey]) -> Result<Self, StoreError> {
        store.ensure_open()?;

        let mut ordered = keys.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut uow = Self {
            store,
            held: Vec::with_capacity(ordered.len()),
            writes: Vec::new(),
            committed: false,
        };
        for key in ordered {
            uow.acquire(key).await?;
        }

        Ok(uow)
    }

    async fn acquire(&mut self, key: LockKey) -> Result<(), StoreError> {
        let guard = self.store.locks.acquire(key).await?;
        self.held.push((key, guard));
        Ok(())
    }

    /// Extends the lock set with a rider key discovered mid-transaction.
    /// Keys must still arrive in canonical order.
    pub async fn lock_rider(&mut self, rider_id: Uuid) -> Result<(), StoreError> {
        let key = LockKey::Rider(rider_id);
        if self.holds(key) {
            return Ok(());
        }
        if self.held.iter().any(|(held, _)| *held > key) {
            return Err(StoreError::LockOrder {
                key: key.to_string(),
            });
        }
        self.acquire(key).await
    }

    pub fn holds(&self, key: LockKey) -> bool {
        self.held.iter().any(|(held, _)| *held == key)
    }

    pub fn shipment(&self, id: Uuid) -> Option<Shipment> {
        let staged = self.writes.iter().rev().find_map(|write| match write {
            Write::Shipment(shipment) if shipment.id == id => Some(shipment.clone()),
            _ => None,
        });
        staged.or_else(|| self.store.read_tables().shipments.get(&id).cloned())
    }

    pub fn assignment(&self, id: Uuid) -> Option<Assignment> {
        let staged = self.writes.iter().rev().find_map(|write| match write {
            Write::Assignment(assignment) if assignment.id == id => Some(assignment.clone()),
            _ => None,
        });
        staged.or_else(|| self.store.read_tables().assignments.get(&id).cloned())
    }

    pub fn active_assignment_for_shipment(&self, shipment_id: Uuid) -> Option<Assignment> {
        self.store
            .read_tables()
            .active_for_shipment(shipment_id)
            .cloned()
    }

    pub fn active_assignment_for_rider(&self, rider_id: Uuid) -> Option<Assignment> {
        self.store.read_tables().active_for_owner(rider_id).cloned()
    }

    pub fn put_shipment(&mut self, shipment: Shipment) {
        self.writes.push(Write::Shipment(shipment));
    }

    pub fn put_assignment(&mut self, assignment: Assignment) {
        self.writes.push(Write::Assignment(assignment));
    }

    pub fn append_history(
        &mut self,
        shipment_id: Uuid,
        status: ShipmentStatus,
        actor_user_id: Uuid,
        note: Option<String>,
    ) {
        self.writes.push(Write::History {
            shipment_id,
            status,
            actor_user_id,
            note,
        });
    }

    pub fn commit(mut self) -> Result<(), StoreError> {
        self.store.ensure_open()?;

        let writes = std::mem::take(&mut self.writes);
        self.store.write_tables().apply_all(writes, Utc::now())?;
        self.committed = true;

        Ok(())
    }
}

impl Drop for UnitOfWork<'_> {
    fn drop(&mut self) {
        if !self.committed && !self.writes.is_empty() {
            debug!(discarded = self.writes.len(), "unit of work rolled back");
        }

        for (key, guard) in self.held.drain(..) {
            drop(guard);
            self.store.locks.release(&key);
        }
    }
}
