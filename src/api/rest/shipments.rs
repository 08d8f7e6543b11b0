use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::lifecycle::{AcceptOutcome, GateOutcome, NewShipment, ShipmentDetail};
use crate::error::AppError;
use crate::models::history::StatusHistoryEntry;
use crate::models::location::RiderLocation;
use crate::models::shipment::{Shipment, ShipmentItem, ShipmentStatus};
use crate::state::AppState;
use crate::store::ShipmentFilter;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/shipments", post(create_shipment).get(list_shipments))
        .route("/shipments/:id", get(get_shipment))
        .route("/shipments/:id/history", get(shipment_history))
        .route("/shipments/:id/accept", post(accept_shipment))
        .route("/shipments/:id/pickup", post(pickup_shipment))
        .route("/shipments/:id/deliver", post(deliver_shipment))
        .route("/shipments/:id/rider-location", get(shipment_rider_location))
}

#[derive(Deserialize)]
pub struct CreateItemRequest {
    pub name: String,
    pub qty: Option<u32>,
    pub note: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateShipmentRequest {
    pub title: String,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub pickup_address_id: Uuid,
    pub dropoff_address_id: Uuid,
    #[serde(default)]
    pub items: Vec<CreateItemRequest>,
    pub note: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct ListShipmentsQuery {
    pub sender_id: Option<Uuid>,
    pub receiver_id: Option<Uuid>,
    pub status: Option<String>,
    pub available: Option<bool>,
    pub page: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Serialize)]
pub struct ShipmentListResponse {
    pub data: Vec<Shipment>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
}

#[derive(Deserialize)]
pub struct AcceptRequest {
    pub rider_id: Uuid,
}

async fn create_shipment(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateShipmentRequest>,
) -> Result<(StatusCode, Json<Shipment>), AppError> {
    let items = payload
        .items
        .into_iter()
        .map(|item| ShipmentItem {
            name: item.name,
            qty: item.qty.unwrap_or(1),
            note: item.note,
        })
        .collect();

    let shipment = state
        .engine
        .create(NewShipment {
            title: payload.title,
            sender_id: payload.sender_id,
            receiver_id: payload.receiver_id,
            pickup_address_id: payload.pickup_address_id,
            dropoff_address_id: payload.dropoff_address_id,
            items,
            note: payload.note,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(shipment)))
}

async fn list_shipments(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListShipmentsQuery>,
) -> Result<Json<ShipmentListResponse>, AppError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<ShipmentStatus>)
        .transpose()
        .map_err(AppError::Validation)?;

    let page = state.engine.list(ShipmentFilter {
        sender_id: query.sender_id,
        receiver_id: query.receiver_id,
        status,
        available: query.available.unwrap_or(false),
        page: query.page.unwrap_or(1),
        page_size: query.page_size.unwrap_or(0),
    });

    Ok(Json(ShipmentListResponse {
        data: page.shipments,
        page: page.page,
        page_size: page.page_size,
        total: page.total,
    }))
}

async fn get_shipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ShipmentDetail>, AppError> {
    Ok(Json(state.engine.get(id)?))
}

async fn shipment_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<StatusHistoryEntry>>, AppError> {
    Ok(Json(state.engine.history(id)?))
}

async fn accept_shipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AcceptRequest>,
) -> Result<(StatusCode, Json<AcceptOutcome>), AppError> {
    let outcome = state.engine.accept(id, payload.rider_id).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

async fn pickup_shipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<GateOutcome>, AppError> {
    Ok(Json(state.engine.pickup(id).await?))
}

async fn deliver_shipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<GateOutcome>, AppError> {
    Ok(Json(state.engine.deliver(id).await?))
}

async fn shipment_rider_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RiderLocation>, AppError> {
    Ok(Json(state.engine.rider_location_for_shipment(id)?))
}
