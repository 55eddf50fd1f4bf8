//! Persisted records as they travel over REST and the relay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display profile of a participant, populated by the persistence layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// The `sender` field of a message.
///
/// History fetches return a populated profile, while some emitters send the
/// bare identity. Both are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sender {
    Id(String),
    Profile(Participant),
}

impl Sender {
    pub fn id(&self) -> &str {
        match self {
            Sender::Id(id) => id,
            Sender::Profile(p) => &p.id,
        }
    }

    /// Display name, when the sender was populated with a non-empty one.
    pub fn display_name(&self) -> Option<&str> {
        match self {
            Sender::Profile(p) if !p.name.is_empty() => Some(&p.name),
            _ => None,
        }
    }
}

/// A chat message. Immutable once the server has assigned its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: String,
    pub conversation_id: String,
    pub sender: Sender,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn sender_id(&self) -> &str {
        self.sender.id()
    }

    /// Sidebar preview: the first `max_chars` characters, with an ellipsis
    /// when the content was cut.
    pub fn preview(&self, max_chars: usize) -> String {
        let mut chars = self.content.chars();
        let head: String = chars.by_ref().take(max_chars).collect();
        if chars.next().is_some() {
            format!("{head}…")
        } else {
            head
        }
    }
}

/// A one-to-one conversation between exactly two participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(rename = "_id")]
    pub id: String,
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub last_message: Option<Message>,
    pub updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// The participant that is not `me`.
    pub fn other_participant(&self, me: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id != me)
    }

    pub fn involves(&self, participant_id: &str) -> bool {
        self.participants.iter().any(|p| p.id == participant_id)
    }

    /// True when this conversation pairs `a` and `b`, in either order.
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        a != b && self.participants.len() == 2 && self.involves(a) && self.involves(b)
    }

    /// Point the conversation at its newest message.
    pub fn record_activity(&mut self, message: &Message) {
        self.last_message = Some(message.clone());
        self.updated_at = message.created_at;
    }
}

/// Trim message content, returning `None` when nothing is left to send.
pub fn normalize_content(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn alice() -> Participant {
        Participant {
            id: "u-alice".into(),
            name: "Alice".into(),
            email: Some("alice@example.com".into()),
        }
    }

    fn bob() -> Participant {
        Participant {
            id: "u-bob".into(),
            name: "Bob".into(),
            email: None,
        }
    }

    fn message(content: &str) -> Message {
        Message {
            id: "m-1".into(),
            conversation_id: "c-1".into(),
            sender: Sender::Id("u-alice".into()),
            content: content.into(),
            created_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn message_uses_wire_field_names() {
        let json = serde_json::to_value(message("hi")).unwrap();
        assert_eq!(json["_id"], "m-1");
        assert_eq!(json["conversationId"], "c-1");
        assert_eq!(json["sender"], "u-alice");
        assert_eq!(json["content"], "hi");
        assert_eq!(json["createdAt"], "2025-03-01T12:00:00Z");
    }

    #[test]
    fn sender_accepts_populated_profile() {
        let json = r#"{
            "_id": "m-9",
            "conversationId": "c-1",
            "sender": {"_id": "u-bob", "name": "Bob", "email": "bob@example.com"},
            "content": "yo",
            "createdAt": "2025-03-01T12:00:00.000Z"
        }"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.sender_id(), "u-bob");
        assert_eq!(msg.sender.display_name(), Some("Bob"));
    }

    #[test]
    fn bare_sender_has_no_display_name() {
        assert_eq!(message("x").sender.display_name(), None);
    }

    #[test]
    fn conversation_without_last_message_parses() {
        let json = r#"{
            "_id": "c-1",
            "participants": [{"_id": "u-alice", "name": "Alice"}, {"_id": "u-bob", "name": "Bob"}],
            "lastMessage": null,
            "updatedAt": "2025-03-01T12:00:00Z",
            "createdAt": "2025-03-01T11:00:00Z"
        }"#;
        let conv: Conversation = serde_json::from_str(json).unwrap();
        assert!(conv.last_message.is_none());
        assert_eq!(conv.other_participant("u-alice").unwrap().name, "Bob");
    }

    #[test]
    fn is_between_ignores_argument_order() {
        let now = Utc::now();
        let conv = Conversation {
            id: "c-1".into(),
            participants: vec![alice(), bob()],
            last_message: None,
            updated_at: now,
            created_at: now,
        };
        assert!(conv.is_between("u-alice", "u-bob"));
        assert!(conv.is_between("u-bob", "u-alice"));
        assert!(!conv.is_between("u-alice", "u-alice"));
        assert!(!conv.is_between("u-alice", "u-carol"));
    }

    #[test]
    fn record_activity_moves_timestamp_to_message() {
        let earlier = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut conv = Conversation {
            id: "c-1".into(),
            participants: vec![alice(), bob()],
            last_message: None,
            updated_at: earlier,
            created_at: earlier,
        };
        let msg = message("latest");
        conv.record_activity(&msg);
        assert_eq!(conv.updated_at, msg.created_at);
        assert_eq!(conv.last_message.unwrap().content, "latest");
    }

    #[test]
    fn preview_truncates_long_content() {
        let long = "a".repeat(40);
        assert_eq!(message(&long).preview(32), format!("{}…", "a".repeat(32)));
        assert_eq!(message("short").preview(32), "short");
    }

    #[test]
    fn normalize_content_rejects_whitespace() {
        assert_eq!(normalize_content("  hi \n"), Some("hi"));
        assert_eq!(normalize_content(" \t\n"), None);
        assert_eq!(normalize_content(""), None);
    }
}
