use axum::{
    extract::{State, WebSocketUpgrade},
    response::Response,
};

use crate::AppState;
use crate::relay::handle_relay_socket;

/// Relay WebSocket. Identity arrives later in the `setup` event.
pub async fn relay_websocket_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    let hub = state.relay.clone();
    let metrics = state.metrics.clone();
    ws.on_upgrade(move |socket| handle_relay_socket(socket, hub, metrics))
}
