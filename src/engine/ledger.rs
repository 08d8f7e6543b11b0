//! Rider custody of shipments.
//!
//! Two invariants live here: a shipment has at most one active assignment and
//! a rider is the active owner of at most one. Callers must hold the shipment
//! key (and, for claims and delivery, the rider key) in the unit of work; the
//! store's unique indexes back both checks up at commit.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::assignment::Assignment;
use crate::store::{LockKey, StoreError, UnitOfWork};

pub fn try_claim(
    uow: &mut UnitOfWork<'_>,
    shipment_id: Uuid,
    rider_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Assignment, AppError> {
    require_lock(uow, LockKey::Shipment(shipment_id))?;
    require_lock(uow, LockKey::Rider(rider_id))?;

    if uow.active_assignment_for_shipment(shipment_id).is_some() {
        return Err(AppError::Conflict(format!(
            "shipment {shipment_id} has already been accepted by a rider"
        )));
    }

    if let Some(current) = uow.active_assignment_for_rider(rider_id) {
        return Err(AppError::Conflict(format!(
            "rider {rider_id} still holds unfinished shipment {}",
            current.shipment_id
        )));
    }

    let assignment = Assignment::open(shipment_id, rider_id, now);
    uow.put_assignment(assignment.clone());
    Ok(assignment)
}

pub fn mark_picked_up(
    uow: &mut UnitOfWork<'_>,
    assignment_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Assignment, AppError> {
    let mut assignment = load_active(uow, assignment_id)?;
    assignment.picked_up_at = Some(now);
    uow.put_assignment(assignment.clone());
    Ok(assignment)
}

/// Closes the assignment and clears the rider's busy marker.
pub fn mark_delivered(
    uow: &mut UnitOfWork<'_>,
    assignment_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Assignment, AppError> {
    let mut assignment = load_active(uow, assignment_id)?;
    require_lock(uow, LockKey::Rider(assignment.rider_id))?;

    assignment.delivered_at = Some(now);
    assignment.active_owner = None;
    uow.put_assignment(assignment.clone());
    Ok(assignment)
}

fn load_active(uow: &UnitOfWork<'_>, assignment_id: Uuid) -> Result<Assignment, AppError> {
    let assignment = uow.assignment(assignment_id).ok_or(StoreError::MissingRow {
        table: "assignments",
        id: assignment_id,
    })?;
    require_lock(uow, LockKey::Shipment(assignment.shipment_id))?;

    if !assignment.is_active() {
        return Err(AppError::Conflict(format!(
            "assignment {assignment_id} is already closed"
        )));
    }
    Ok(assignment)
}

fn require_lock(uow: &UnitOfWork<'_>, key: LockKey) -> Result<(), AppError> {
    if uow.holds(key) {
        Ok(())
    } else {
        Err(AppError::Internal(format!("ledger access without holding {key}")))
    }
}
