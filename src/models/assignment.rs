use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A rider's custody of a shipment. Closed, never deleted, by setting
/// `delivered_at`; `active_owner` mirrors `rider_id` until then.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub shipment_id: Uuid,
    pub rider_id: Uuid,
    pub accepted_at: DateTime<Utc>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub active_owner: Option<Uuid>,
}

impl Assignment {
    pub fn open(shipment_id: Uuid, rider_id: Uuid, accepted_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            shipment_id,
            rider_id,
            accepted_at,
            picked_up_at: None,
            delivered_at: None,
            active_owner: Some(rider_id),
        }
    }

    pub fn is_active(&self) -> bool {
        self.delivered_at.is_none()
    }
}
