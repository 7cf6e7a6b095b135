//! The collaborator-facing HTTP/WS surface: a liveness probe, a raw
//! snapshot pull endpoint, and the downstream subscriber WebSocket.
//!
//! Per the design notes, the core itself guarantees only that `snapshot()`
//! is self-consistent and JSON-serializable — this module is the minimal
//! concrete surface needed to observe that end-to-end, not a shaped API.

use crate::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use tracing::debug;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/snapshot", get(snapshot))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    "ok"
}

async fn snapshot(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.snapshot().await)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_subscriber(socket, state))
}

async fn handle_subscriber(mut socket: WebSocket, state: AppState) {
    let (subscriber_id, mut rx) = state.subscribers.register().await;

    let full_state = state.store.snapshot().await;
    let Ok(initial) = serde_json::to_string(&full_state) else {
        state.subscribers.unregister(subscriber_id).await;
        return;
    };
    if socket.send(Message::Text(initial.into())).await.is_err() {
        state.subscribers.unregister(subscriber_id).await;
        return;
    }

    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            envelope = rx.recv() => {
                match envelope {
                    Some(envelope) => {
                        let Ok(json) = serde_json::to_string(envelope.as_ref()) else { continue };
                        if sink.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // Subscriber-to-server traffic is liveness-only; discarded.
                    }
                    Some(Err(e)) => {
                        debug!(error = %e, "subscriber socket error");
                        break;
                    }
                }
            }
        }
    }

    state.subscribers.unregister(subscriber_id).await;
}
