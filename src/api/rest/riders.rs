use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::assignment::Assignment;
use crate::models::location::{PositionReport, RiderLocation};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/riders/:id/location",
            get(get_rider_location).post(report_rider_location),
        )
        .route("/riders/:id/active-assignment", get(active_assignment))
}

#[derive(Deserialize)]
pub struct ReportLocationRequest {
    pub lat: f64,
    pub lng: f64,
    pub heading_deg: Option<f64>,
    pub speed_mps: Option<f64>,
    pub shipment_id: Option<Uuid>,
}

#[derive(Serialize)]
pub struct ActiveAssignmentResponse {
    pub shipment_id: Option<Uuid>,
    pub assignment: Option<Assignment>,
}

async fn report_rider_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReportLocationRequest>,
) -> Result<Json<RiderLocation>, AppError> {
    let report = PositionReport {
        lat: payload.lat,
        lng: payload.lng,
        heading_deg: payload.heading_deg,
        speed_mps: payload.speed_mps,
    };

    Ok(Json(state.engine.report_location(id, report, payload.shipment_id)?))
}

async fn get_rider_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RiderLocation>, AppError> {
    Ok(Json(state.engine.latest_location(id)?))
}

async fn active_assignment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Json<ActiveAssignmentResponse> {
    let assignment = state.engine.active_assignment_for(id);

    Json(ActiveAssignmentResponse {
        shipment_id: assignment.as_ref().map(|a| a.shipment_id),
        assignment,
    })
}
