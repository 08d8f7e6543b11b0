use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::shipment::ShipmentStatus;

/// Published after every committed lifecycle transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentEvent {
    pub shipment_id: Uuid,
    pub status: ShipmentStatus,
    pub rider_id: Option<Uuid>,
    pub at: DateTime<Utc>,
}
