//! WebSocket connection handler

use axum::extract::ws::{Message, WebSocket};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use sync_protocol::ClientEvent;
use tracing::{debug, error, info, warn};

use crate::metrics::ServerMetrics;

use super::RelayHub;

/// Drive one relay connection until either side closes it.
pub async fn handle_relay_socket(
    socket: WebSocket,
    hub: Arc<RelayHub>,
    server_metrics: Arc<ServerMetrics>,
) {
    server_metrics.connection_opened();

    let (connection_id, mut rx) = hub.connect().await;
    info!(conn_id = %connection_id, "Relay connection opened");

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Outbound queue -> socket
    let sender_conn_id = connection_id.clone();
    let sender_task = async move {
        while let Some(event) = rx.recv().await {
            let json = match event.encode() {
                Ok(j) => j,
                Err(e) => {
                    error!(conn_id = %sender_conn_id, "Failed to encode event: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    };

    // Socket -> hub
    let input_hub = hub.clone();
    let input_metrics = server_metrics.clone();
    let input_conn_id = connection_id.clone();
    let input_task = async move {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    let event = match ClientEvent::decode(text.as_str()) {
                        Ok(event) => event,
                        Err(e) => {
                            input_metrics.malformed_frame();
                            warn!(conn_id = %input_conn_id, "Ignoring malformed frame: {}", e);
                            continue;
                        }
                    };
                    input_metrics.event_received();
                    debug!(conn_id = %input_conn_id, event = event.name(), "Client event");

                    if let Err(e) = input_hub.dispatch(&input_conn_id, event).await {
                        warn!(conn_id = %input_conn_id, "Rejected client event: {}", e);
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!(conn_id = %input_conn_id, "Client sent close frame");
                    break;
                }
                Err(e) => {
                    input_metrics.websocket_error();
                    error!(conn_id = %input_conn_id, "WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    };

    tokio::select! {
        _ = sender_task => debug!(conn_id = %connection_id, "Sender task ended"),
        _ = input_task => debug!(conn_id = %connection_id, "Input task ended"),
    }

    hub.disconnect(&connection_id).await;
    server_metrics.connection_closed();
    info!(conn_id = %connection_id, "Relay connection closed");
}
