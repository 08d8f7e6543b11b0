use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

/// Which address a geofence gate was measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateTarget {
    Pickup,
    Dropoff,
}

impl std::fmt::Display for GateTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateTarget::Pickup => f.write_str("pickup"),
            GateTarget::Dropoff => f.write_str("dropoff"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rider must be within {gate_m} m of the {target} point (currently ~{distance_m:.1} m)")]
    GeofenceViolation {
        target: GateTarget,
        distance_m: f64,
        gate_m: f64,
    },

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Conflict(_) => "CONFLICT",
            AppError::GeofenceViolation { .. } => "GEOFENCE_VIOLATION",
            AppError::PreconditionFailed(_) => "PRECONDITION_FAILED",
            AppError::Transient(_) => "TRANSIENT",
            AppError::Internal(_) => "INTERNAL",
        }
    }

    /// Only infrastructure faults are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Transient(_))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::GeofenceViolation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            AppError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LockTimeout { .. } => AppError::Transient(err.to_string()),
            StoreError::UniqueViolation { .. } => AppError::Conflict(
                "shipment already claimed or rider already holds an active job".to_string(),
            ),
            StoreError::Closed | StoreError::LockOrder { .. } | StoreError::MissingRow { .. } => {
                AppError::Internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            AppError::GeofenceViolation { distance_m, .. } => json!({
                "error": self.to_string(),
                "kind": self.kind(),
                "distance_m": round_2dp(*distance_m),
            }),
            // transient details stay in the logs
            AppError::Transient(_) => json!({
                "error": "service temporarily unavailable, try again",
                "kind": self.kind(),
            }),
            _ => json!({
                "error": self.to_string(),
                "kind": self.kind(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

pub fn round_2dp(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
