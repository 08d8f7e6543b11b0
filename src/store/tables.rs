use std::collections::HashMap;
use std::hash::Hash;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::assignment::Assignment;
use crate::models::history::StatusHistoryEntry;
use crate::models::shipment::{Shipment, ShipmentStatus};
use crate::store::StoreError;

pub(crate) const ACTIVE_SHIPMENT_INDEX: &str = "assignments_active_shipment";
pub(crate) const ACTIVE_OWNER_INDEX: &str = "assignments_active_owner";

/// A row change staged by a unit of work.
#[derive(Debug, Clone)]
pub(crate) enum Write {
    Shipment(Shipment),
    Assignment(Assignment),
    History {
        shipment_id: Uuid,
        status: ShipmentStatus,
        actor_user_id: Uuid,
        note: Option<String>,
    },
}

enum Undo {
    Shipment(Uuid, Option<Shipment>),
    Assignment(Uuid, Option<Assignment>),
    ActiveShipment(Uuid, Option<Uuid>),
    ActiveOwner(Uuid, Option<Uuid>),
    History,
}

#[derive(Default)]
pub(crate) struct Tables {
    pub(crate) shipments: HashMap<Uuid, Shipment>,
    pub(crate) assignments: HashMap<Uuid, Assignment>,
    /// shipment_id -> assignment_id, only while `delivered_at` is null
    pub(crate) active_by_shipment: HashMap<Uuid, Uuid>,
    /// active_owner -> assignment_id
    pub(crate) active_by_owner: HashMap<Uuid, Uuid>,
    pub(crate) history: Vec<StatusHistoryEntry>,
}

impl Tables {
    /// Applies the whole write set or none of it.
    pub(crate) fn apply_all(
        &mut self,
        writes: Vec<Write>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut undo = Vec::with_capacity(writes.len() * 3);

        for write in writes {
            if let Err(err) = self.apply(write, now, &mut undo) {
                self.rollback(undo);
                return Err(err);
            }
        }

        Ok(())
    }

    fn apply(
        &mut self,
        write: Write,
        now: DateTime<Utc>,
        undo: &mut Vec<Undo>,
    ) -> Result<(), StoreError> {
        match write {
            Write::Shipment(shipment) => {
                let previous = self.shipments.insert(shipment.id, shipment.clone());
                undo.push(Undo::Shipment(shipment.id, previous));
            }
            Write::Assignment(assignment) => self.put_assignment(assignment, undo)?,
            Write::History {
                shipment_id,
                status,
                actor_user_id,
                note,
            } => {
                self.history.push(StatusHistoryEntry {
                    seq: self.history.len() as u64 + 1,
                    shipment_id,
                    status,
                    actor_user_id,
                    note,
                    recorded_at: now,
                });
                undo.push(Undo::History);
            }
        }

        Ok(())
    }

    fn put_assignment(
        &mut self,
        assignment: Assignment,
        undo: &mut Vec<Undo>,
    ) -> Result<(), StoreError> {
        let previous = self.assignments.get(&assignment.id).cloned();

        if let Some(prev) = &previous {
            if prev.is_active()
                && self.active_by_shipment.get(&prev.shipment_id) == Some(&prev.id)
            {
                let old = self.active_by_shipment.remove(&prev.shipment_id);
                undo.push(Undo::ActiveShipment(prev.shipment_id, old));
            }
            if let Some(owner) = prev.active_owner {
                if self.active_by_owner.get(&owner) == Some(&prev.id) {
                    let old = self.active_by_owner.remove(&owner);
                    undo.push(Undo::ActiveOwner(owner, old));
                }
            }
        }

        if assignment.is_active() {
            claim_unique(
                &mut self.active_by_shipment,
                assignment.shipment_id,
                assignment.id,
                ACTIVE_SHIPMENT_INDEX,
            )?;
            undo.push(Undo::ActiveShipment(assignment.shipment_id, None));
        }

        if let Some(owner) = assignment.active_owner {
            claim_unique(&mut self.active_by_owner, owner, assignment.id, ACTIVE_OWNER_INDEX)?;
            undo.push(Undo::ActiveOwner(owner, None));
        }

        let id = assignment.id;
        self.assignments.insert(id, assignment);
        undo.push(Undo::Assignment(id, previous));

        Ok(())
    }

    fn rollback(&mut self, undo: Vec<Undo>) {
        for step in undo.into_iter().rev() {
            match step {
                Undo::Shipment(id, previous) => restore(&mut self.shipments, id, previous),
                Undo::Assignment(id, previous) => restore(&mut self.assignments, id, previous),
                Undo::ActiveShipment(key, previous) => {
                    restore(&mut self.active_by_shipment, key, previous)
                }
                Undo::ActiveOwner(key, previous) => {
                    restore(&mut self.active_by_owner, key, previous)
                }
                Undo::History => {
                    self.history.pop();
                }
            }
        }
    }

    pub(crate) fn active_for_shipment(&self, shipment_id: Uuid) -> Option<&Assignment> {
        self.active_by_shipment
            .get(&shipment_id)
            .and_then(|id| self.assignments.get(id))
    }

    pub(crate) fn active_for_owner(&self, rider_id: Uuid) -> Option<&Assignment> {
        self.active_by_owner
            .get(&rider_id)
            .and_then(|id| self.assignments.get(id))
    }
}

/// Inserts into a unique index. Re-asserting the same row is not a violation.
fn claim_unique(
    index: &mut HashMap<Uuid, Uuid>,
    key: Uuid,
    row: Uuid,
    name: &'static str,
) -> Result<(), StoreError> {
    match index.get(&key) {
        Some(existing) if *existing != row => Err(StoreError::UniqueViolation { index: name }),
        _ => {
            index.insert(key, row);
            Ok(())
        }
    }
}

fn restore<K: Eq + Hash, V>(map: &mut HashMap<K, V>, key: K, previous: Option<V>) {
    match previous {
        Some(value) => {
            map.insert(key, value);
        }
        None => {
            map.remove(&key);
        }
    }
}
