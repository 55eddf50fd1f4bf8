//! Relay Hub
//!
//! Owns presence, room membership and the outbound queue of every live
//! connection, and applies the fan-out rule for each client event.

use std::collections::HashMap;
use std::sync::Arc;

use sync_protocol::{ClientEvent, ServerEvent};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info};

use crate::config::RelayConfig;
use crate::metrics::ServerMetrics;

use super::ConnectionId;
use super::presence::PresenceRegistry;
use super::rooms::{RoomKey, RoomMultiplexer};

/// Rejected client events. Scoped to the emitting connection.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("setup requires a participant identity")]
    MissingIdentity,

    #[error("event requires a conversation id")]
    MissingConversation,

    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),
}

pub struct RelayHub {
    presence: RwLock<PresenceRegistry>,
    rooms: RwLock<RoomMultiplexer>,
    /// connection_id -> outbound queue
    connections: RwLock<HashMap<ConnectionId, mpsc::Sender<ServerEvent>>>,
    send_channel_capacity: usize,
    metrics: Arc<ServerMetrics>,
}

impl RelayHub {
    pub fn new(config: &RelayConfig, metrics: Arc<ServerMetrics>) -> Self {
        Self {
            presence: RwLock::new(PresenceRegistry::new()),
            rooms: RwLock::new(RoomMultiplexer::new()),
            connections: RwLock::new(HashMap::new()),
            send_channel_capacity: config.send_channel_capacity.max(1),
            metrics,
        }
    }

    /// Allocate a connection id and its outbound queue.
    pub async fn connect(&self) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let connection_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(self.send_channel_capacity);
        self.connections
            .write()
            .await
            .insert(connection_id.clone(), tx);
        (connection_id, rx)
    }

    /// Apply one client event from `connection_id`.
    pub async fn dispatch(&self, connection_id: &str, event: ClientEvent) -> Result<(), RelayError> {
        match event {
            ClientEvent::Setup(identity) => {
                self.register(connection_id, &identity).await?;
                self.deliver(connection_id, ServerEvent::Connected).await;
            }
            ClientEvent::JoinConversation(conversation_id) => {
                self.join(connection_id, &conversation_id).await?;
            }
            ClientEvent::LeaveConversation(conversation_id) => {
                self.leave(connection_id, &conversation_id).await?;
            }
            ClientEvent::NewMessage(message) => {
                let room = conversation_room(&message.conversation_id)?;
                self.relay(connection_id, &room, ServerEvent::MessageReceived(message))
                    .await;
            }
            ClientEvent::Typing(payload) => {
                let room = conversation_room(&payload.conversation_id)?;
                self.relay(connection_id, &room, ServerEvent::Typing(payload))
                    .await;
            }
            ClientEvent::StopTyping(payload) => {
                let room = conversation_room(&payload.conversation_id)?;
                self.relay(connection_id, &room, ServerEvent::StopTyping(payload))
                    .await;
            }
        }
        Ok(())
    }

    /// Record `connection_id` as the live connection for `identity` and join
    /// it to the identity's private room. A connection that re-announces a
    /// different identity gives up its previous one.
    pub async fn register(&self, connection_id: &str, identity: &str) -> Result<(), RelayError> {
        let identity = identity.trim();
        if identity.is_empty() {
            return Err(RelayError::MissingIdentity);
        }
        if !self.connections.read().await.contains_key(connection_id) {
            return Err(RelayError::UnknownConnection(connection_id.to_string()));
        }

        let mut presence = self.presence.write().await;
        let mut rooms = self.rooms.write().await;

        for previous in presence.unregister(connection_id) {
            if previous != identity {
                rooms.leave(connection_id, &RoomKey::participant(previous));
            }
        }
        if let Some(replaced) = presence.register(identity, connection_id) {
            debug!(conn_id = %connection_id, replaced = %replaced, "Presence overwritten by newer connection");
        }
        rooms.join(connection_id, RoomKey::participant(identity));

        info!(conn_id = %connection_id, participant = %identity, "Participant online");
        Ok(())
    }

    /// Remove presence entries that still point at `connection_id`.
    pub async fn unregister(&self, connection_id: &str) -> Vec<String> {
        self.presence.write().await.unregister(connection_id)
    }

    pub async fn join(&self, connection_id: &str, conversation_id: &str) -> Result<(), RelayError> {
        let room = conversation_room(conversation_id)?;
        if self.rooms.write().await.join(connection_id, room) {
            debug!(conn_id = %connection_id, conversation = %conversation_id, "Joined room");
        }
        Ok(())
    }

    pub async fn leave(&self, connection_id: &str, conversation_id: &str) -> Result<(), RelayError> {
        let room = conversation_room(conversation_id)?;
        if self.rooms.write().await.leave(connection_id, &room) {
            debug!(conn_id = %connection_id, conversation = %conversation_id, "Left room");
        }
        Ok(())
    }

    /// Deliver `event` to every member of `room` except `from`. Returns the
    /// number of connections that accepted it.
    pub async fn relay(&self, from: &str, room: &RoomKey, event: ServerEvent) -> usize {
        let members = self.rooms.read().await.members(room);
        let recipients: Vec<_> = members.iter().filter(|c| c.as_str() != from).collect();
        if recipients.is_empty() {
            debug!(room = %room, "No other room members; nothing relayed");
            return 0;
        }

        let connections = self.connections.read().await;
        let mut delivered = 0;
        for connection_id in recipients {
            if self.try_deliver(&connections, connection_id, event.clone()) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Deliver `event` to the private room of `identity`.
    pub async fn emit_to_participant(&self, identity: &str, event: ServerEvent) -> usize {
        let members = self
            .rooms
            .read()
            .await
            .members(&RoomKey::participant(identity));
        let connections = self.connections.read().await;
        members
            .iter()
            .filter(|connection_id| self.try_deliver(&connections, connection_id, event.clone()))
            .count()
    }

    /// Tear down everything owned by a closed connection.
    pub async fn disconnect(&self, connection_id: &str) {
        let offline = self.unregister(connection_id).await;
        let left = self.rooms.write().await.leave_all(connection_id);
        self.connections.write().await.remove(connection_id);

        for identity in &offline {
            info!(conn_id = %connection_id, participant = %identity, "Participant offline");
        }
        debug!(conn_id = %connection_id, rooms = left.len(), "Connection removed from rooms");
    }

    pub async fn is_online(&self, identity: &str) -> bool {
        self.presence.read().await.is_online(identity)
    }

    pub async fn online_count(&self) -> usize {
        self.presence.read().await.len()
    }

    /// Connections currently joined to a conversation's room.
    pub async fn room_size(&self, conversation_id: &str) -> usize {
        self.rooms
            .read()
            .await
            .members(&RoomKey::conversation(conversation_id))
            .len()
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    async fn deliver(&self, connection_id: &str, event: ServerEvent) -> bool {
        let connections = self.connections.read().await;
        self.try_deliver(&connections, connection_id, event)
    }

    fn try_deliver(
        &self,
        connections: &HashMap<ConnectionId, mpsc::Sender<ServerEvent>>,
        connection_id: &str,
        event: ServerEvent,
    ) -> bool {
        let Some(tx) = connections.get(connection_id) else {
            self.metrics.delivery_dropped();
            debug!(conn_id = %connection_id, "Recipient already gone");
            return false;
        };
        match tx.try_send(event) {
            Ok(()) => {
                self.metrics.event_relayed();
                true
            }
            Err(e) => {
                self.metrics.delivery_dropped();
                debug!(conn_id = %connection_id, "Delivery missed: {}", e);
                false
            }
        }
    }
}

fn conversation_room(conversation_id: &str) -> Result<RoomKey, RelayError> {
    if conversation_id.trim().is_empty() {
        return Err(RelayError::MissingConversation);
    }
    Ok(RoomKey::conversation(conversation_id))
}
