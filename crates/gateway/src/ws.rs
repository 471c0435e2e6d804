//! WebSocket observer bridge.
//!
//! GET /ws upgrades the connection, subscribes one observer channel on
//! the broadcaster and forwards every serialized observer message as a
//! text frame. Inbound frames are ignored except for close; the
//! subscription is dropped as soon as the socket goes away, however it
//! goes away.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use paraprobe_common::now_millis;

use crate::state::AppState;

/// GET /ws - upgrade and bridge one observer
pub async fn observer_socket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| bridge_observer(socket, state))
}

async fn bridge_observer(socket: WebSocket, state: Arc<AppState>) {
    let (id, mut frames) = state.broadcaster.subscribe();
    let (mut sink, mut stream) = socket.split();

    // greeting frame so a client can tell the bridge is live before any
    // test produces traffic
    let greeting = json!({
        "type": "connected",
        "observer_id": id,
        "timestamp_ms": now_millis(),
    })
    .to_string();
    if sink.send(Message::Text(greeting)).await.is_err() {
        state.broadcaster.unsubscribe(id);
        return;
    }

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(frame) => {
                    if sink.send(Message::Text(frame)).await.is_err() {
                        debug!("observer {} send failed", id);
                        break;
                    }
                }
                // broadcaster dropped the sending side
                None => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => {
                    debug!("observer {} disconnected", id);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("observer {} socket error: {}", id, e);
                    break;
                }
            },
        }
    }

    state.broadcaster.unsubscribe(id);
}
