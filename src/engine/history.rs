//! Append-only audit trail of lifecycle transitions. Entries are written inside
//! the transition's unit of work and are never updated or deleted.

use uuid::Uuid;

use crate::models::shipment::ShipmentStatus;
use crate::store::UnitOfWork;

pub fn record(
    uow: &mut UnitOfWork<'_>,
    shipment_id: Uuid,
    status: ShipmentStatus,
    actor_user_id: Uuid,
    note: Option<&str>,
) {
    uow.append_history(shipment_id, status, actor_user_id, note.map(str::to_string));
}
