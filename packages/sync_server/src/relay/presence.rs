//! Presence Registry
//!
//! Live mapping from participant identity to the connection that most
//! recently announced it.

use std::collections::HashMap;

use super::ConnectionId;

#[derive(Debug, Default)]
pub struct PresenceRegistry {
    /// identity -> connection
    entries: HashMap<String, ConnectionId>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `connection` as the live connection for `identity`, overwriting
    /// any earlier one. Returns the replaced connection, if any.
    pub fn register(&mut self, identity: &str, connection: &str) -> Option<ConnectionId> {
        self.entries
            .insert(identity.to_string(), connection.to_string())
            .filter(|previous| previous != connection)
    }

    /// Remove every entry whose recorded connection is exactly `connection`.
    /// Entries already overwritten by a newer connection are left alone.
    /// Returns the identities that went offline.
    pub fn unregister(&mut self, connection: &str) -> Vec<String> {
        let gone: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, conn)| conn.as_str() == connection)
            .map(|(identity, _)| identity.clone())
            .collect();
        for identity in &gone {
            self.entries.remove(identity);
        }
        gone
    }

    pub fn connection_of(&self, identity: &str) -> Option<&ConnectionId> {
        self.entries.get(identity)
    }

    pub fn is_online(&self, identity: &str) -> bool {
        self.entries.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
