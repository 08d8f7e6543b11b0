use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::shipment::ShipmentStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub seq: u64,
    pub shipment_id: Uuid,
    pub status: ShipmentStatus,
    pub actor_user_id: Uuid,
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}
