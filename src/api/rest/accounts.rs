//! Seed endpoints for the account and address directories. Registration and
//! address-book management live elsewhere; these exist so the engine can be
//! driven end to end.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::directory::AccountDirectory;
use crate::error::AppError;
use crate::geo::GeoPoint;
use crate::models::account::{Account, Address, Role};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/accounts", post(create_account))
        .route("/addresses", post(create_address))
}

#[derive(Deserialize)]
pub struct CreateAccountRequest {
    pub name: String,
    pub role: Role,
}

#[derive(Deserialize)]
pub struct CreateAddressRequest {
    pub owner_id: Uuid,
    pub label: String,
    pub lat: f64,
    pub lng: f64,
}

async fn create_account(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<Account>), AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("name cannot be empty".to_string()));
    }

    let account = Account {
        id: Uuid::new_v4(),
        name: payload.name.trim().to_string(),
        role: payload.role,
        created_at: Utc::now(),
    };

    state.directory.insert_account(account.clone());
    Ok((StatusCode::CREATED, Json(account)))
}

async fn create_address(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateAddressRequest>,
) -> Result<(StatusCode, Json<Address>), AppError> {
    let location = GeoPoint::validated(payload.lat, payload.lng)?;
    state
        .directory
        .account(payload.owner_id)
        .ok_or_else(|| AppError::NotFound(format!("account {} not found", payload.owner_id)))?;

    let address = Address {
        id: Uuid::new_v4(),
        owner_id: payload.owner_id,
        label: payload.label.trim().to_string(),
        location,
    };

    state.directory.insert_address(address.clone());
    Ok((StatusCode::CREATED, Json(address)))
}
