pub mod accounts;
pub mod riders;
pub mod shipments;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(accounts::router())
        .merge(shipments::router())
        .merge(riders::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::shipment_feed))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    store_open: bool,
    accounts: usize,
    riders: usize,
    shipments: usize,
    assignments: usize,
    active_assignments: usize,
    tracked_riders: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let counts = state.store.counts();
    let store_open = state.store.is_open();
    let status = if store_open {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if store_open { "ok" } else { "closed" },
            store_open,
            accounts: state.directory.account_count(),
            riders: state.directory.riders(),
            shipments: counts.shipments,
            assignments: counts.assignments,
            active_assignments: counts.active_assignments,
            tracked_riders: state.tracker.len(),
        }),
    )
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
