//! Live shipment feed. Clients may narrow it with `?shipment_id=` or
//! `?rider_id=`; with neither they see every committed transition.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::event::ShipmentEvent;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct FeedFilter {
    pub shipment_id: Option<Uuid>,
    pub rider_id: Option<Uuid>,
}

impl FeedFilter {
    pub fn wants(&self, event: &ShipmentEvent) -> bool {
        self.shipment_id.is_none_or(|id| event.shipment_id == id)
            && self.rider_id.is_none_or(|id| event.rider_id == Some(id))
    }
}

pub async fn shipment_feed(
    ws: WebSocketUpgrade,
    Query(filter): Query<FeedFilter>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_shipment_events(socket, state, filter))
}

async fn stream_shipment_events(socket: WebSocket, state: Arc<AppState>, filter: FeedFilter) {
    let (mut outbound, mut inbound) = socket.split();
    let mut transitions = BroadcastStream::new(state.engine.subscribe());

    info!(
        shipment_id = ?filter.shipment_id,
        rider_id = ?filter.rider_id,
        "shipment feed opened"
    );

    let forward = tokio::spawn(async move {
        let mut delivered = 0u64;
        while let Some(received) = transitions.next().await {
            let event = match received {
                Ok(event) if filter.wants(&event) => event,
                Ok(_) => continue,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "shipment feed lagging; transitions dropped");
                    continue;
                }
            };

            let payload = match serde_json::to_string(&event) {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(
                        shipment_id = %event.shipment_id,
                        error = %err,
                        "unencodable shipment event"
                    );
                    continue;
                }
            };

            if outbound.send(Message::Text(payload)).await.is_err() {
                break;
            }
            delivered += 1;
        }
        delivered
    });

    // the feed is one-way; inbound frames only tell us the client is alive
    let drain = tokio::spawn(async move { while let Some(Ok(_)) = inbound.next().await {} });

    tokio::select! {
        sent = forward => debug!(sent = sent.unwrap_or_default(), "shipment feed writer finished"),
        _ = drain => {},
    }

    info!("shipment feed closed");
}
