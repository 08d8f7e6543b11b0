use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::GeoPoint;

/// Latest known position of a rider. One row per rider, no history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiderLocation {
    pub rider_id: Uuid,
    pub lat: f64,
    pub lng: f64,
    pub heading_deg: Option<f64>,
    pub speed_mps: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl RiderLocation {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

/// A position as reported by a rider device, before validation.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PositionReport {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub heading_deg: Option<f64>,
    #[serde(default)]
    pub speed_mps: Option<f64>,
}

impl PositionReport {
    pub fn validate(&self) -> Result<GeoPoint, AppError> {
        let point = GeoPoint::validated(self.lat, self.lng)?;

        if let Some(heading) = self.heading_deg {
            if !heading.is_finite() || !(0.0..360.0).contains(&heading) {
                return Err(AppError::Validation(
                    "heading_deg must be in [0, 360)".to_string(),
                ));
            }
        }

        if let Some(speed) = self.speed_mps {
            if !speed.is_finite() || speed < 0.0 {
                return Err(AppError::Validation(
                    "speed_mps must be a non-negative number".to_string(),
                ));
            }
        }

        Ok(point)
    }
}
