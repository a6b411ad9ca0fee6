use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use chrono::Utc;
use futures::{sink::SinkExt, stream::StreamExt};
use log::{error, warn};
use serde_json::{json, Value};

use super::AppState;
use crate::types::{ack_for, SampleUpdate};

pub const UPDATE_EVENT: &str = "imu_update";
pub const ACK_EVENT: &str = "imu_ack";

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

pub fn update_frame(update: &SampleUpdate) -> Value {
    json!({ "event": UPDATE_EVENT, "data": update })
}

/// Pushes every accepted sample to the client. Text frames coming back are
/// treated as readings and answered with an ack frame.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let mut subscription = state.broadcaster.subscribe();
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            update = subscription.recv() => {
                let Some(update) = update else { break };
                let frame = update_frame(&update).to_string();
                if sender.send(Message::Text(frame)).await.is_err() {
                    // Client disconnected
                    break;
                }
            }
            incoming = receiver.next() => {
                let payload = match incoming {
                    Some(Ok(Message::Text(text))) => text.into_bytes(),
                    Some(Ok(Message::Binary(bytes))) => bytes,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("Websocket receive error: {}", e);
                        break;
                    }
                };

                let frame = ingest_frame(&state, payload).await.to_string();
                if sender.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
        }
    }

    state.broadcaster.unsubscribe(subscription.id());
}

async fn ingest_frame(state: &AppState, payload: Vec<u8>) -> Value {
    let arrival = Utc::now();
    let pipeline = Arc::clone(&state.pipeline);

    let ack = match tokio::task::spawn_blocking(move || pipeline.accept_bytes(&payload, arrival)).await {
        Ok(result) => ack_for(&result),
        Err(e) => {
            error!("Websocket ingest task failed: {}", e);
            json!({ "status": "error", "message": "internal error" })
        }
    };

    json!({ "event": ACK_EVENT, "data": ack })
}
