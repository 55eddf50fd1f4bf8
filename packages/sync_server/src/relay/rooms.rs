//! Room Multiplexer
//!
//! Broadcast groups keyed by room. Conversation rooms carry relay traffic;
//! participant rooms are the private rooms used for direct addressing.

use std::collections::{HashMap, HashSet};

use super::ConnectionId;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoomKey {
    Conversation(String),
    Participant(String),
}

impl RoomKey {
    pub fn conversation(id: impl Into<String>) -> Self {
        RoomKey::Conversation(id.into())
    }

    pub fn participant(id: impl Into<String>) -> Self {
        RoomKey::Participant(id.into())
    }
}

impl std::fmt::Display for RoomKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomKey::Conversation(id) => write!(f, "conversation:{id}"),
            RoomKey::Participant(id) => write!(f, "participant:{id}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct RoomMultiplexer {
    rooms: HashMap<RoomKey, HashSet<ConnectionId>>,
}

impl RoomMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room. Returns false if it was already a member.
    pub fn join(&mut self, connection: &str, room: RoomKey) -> bool {
        self.rooms
            .entry(room)
            .or_default()
            .insert(connection.to_string())
    }

    /// Remove a connection from a room. Returns false if it was not a member.
    pub fn leave(&mut self, connection: &str, room: &RoomKey) -> bool {
        let Some(members) = self.rooms.get_mut(room) else {
            return false;
        };
        let removed = members.remove(connection);
        if members.is_empty() {
            self.rooms.remove(room);
        }
        removed
    }

    /// Remove a connection from every room. Returns the rooms it left.
    pub fn leave_all(&mut self, connection: &str) -> Vec<RoomKey> {
        let mut left = Vec::new();
        self.rooms.retain(|room, members| {
            if members.remove(connection) {
                left.push(room.clone());
            }
            !members.is_empty()
        });
        left
    }

    pub fn members(&self, room: &RoomKey) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_member(&self, connection: &str, room: &RoomKey) -> bool {
        self.rooms
            .get(room)
            .is_some_and(|m| m.contains(connection))
    }

    pub fn rooms_of(&self, connection: &str) -> Vec<RoomKey> {
        self.rooms
            .iter()
            .filter(|(_, members)| members.contains(connection))
            .map(|(room, _)| room.clone())
            .collect()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
