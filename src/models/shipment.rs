use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    WaitingForRider,
    RiderAccepted,
    PickedUpEnRoute,
    Delivered,
}

impl ShipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::WaitingForRider => "WAITING_FOR_RIDER",
            ShipmentStatus::RiderAccepted => "RIDER_ACCEPTED",
            ShipmentStatus::PickedUpEnRoute => "PICKED_UP_EN_ROUTE",
            ShipmentStatus::Delivered => "DELIVERED",
        }
    }

    /// The single legal successor; lifecycle is strictly forward.
    pub fn next(&self) -> Option<ShipmentStatus> {
        match self {
            ShipmentStatus::WaitingForRider => Some(ShipmentStatus::RiderAccepted),
            ShipmentStatus::RiderAccepted => Some(ShipmentStatus::PickedUpEnRoute),
            ShipmentStatus::PickedUpEnRoute => Some(ShipmentStatus::Delivered),
            ShipmentStatus::Delivered => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.next().is_none()
    }
}

impl std::fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ShipmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WAITING_FOR_RIDER" => Ok(ShipmentStatus::WaitingForRider),
            "RIDER_ACCEPTED" => Ok(ShipmentStatus::RiderAccepted),
            "PICKED_UP_EN_ROUTE" => Ok(ShipmentStatus::PickedUpEnRoute),
            "DELIVERED" => Ok(ShipmentStatus::Delivered),
            other => Err(format!("unknown shipment status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShipmentItem {
    pub name: String,
    pub qty: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipment {
    pub id: Uuid,
    pub title: String,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub pickup_address_id: Uuid,
    pub dropoff_address_id: Uuid,
    pub items: Vec<ShipmentItem>,
    pub note: Option<String>,
    pub status: ShipmentStatus,
    pub created_at: DateTime<Utc>,
    pub status_updated_at: DateTime<Utc>,
}
