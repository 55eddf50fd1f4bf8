//! Relay event vocabulary.
//!
//! Frames are adjacently tagged: `{"event": "<name>", "data": <payload>}`.
//! Names are the space-separated spellings used by existing clients; the
//! hyphenated spellings are accepted on input.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::records::Message;

/// Payload of a `typing` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub conversation_id: String,
    pub sender_name: String,
}

/// Payload of a `stop typing` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTypingPayload {
    pub conversation_id: String,
}

/// Events emitted by a client connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Establish the participant identity of this connection
    #[serde(rename = "setup")]
    Setup(String),
    /// Start receiving a conversation's room traffic
    #[serde(rename = "join conversation")]
    JoinConversation(String),
    /// Stop receiving a conversation's room traffic
    #[serde(rename = "leave conversation")]
    LeaveConversation(String),
    /// A message was persisted; notify the other room members
    #[serde(rename = "new message")]
    NewMessage(Message),
    #[serde(rename = "typing")]
    Typing(TypingPayload),
    #[serde(rename = "stop typing")]
    StopTyping(StopTypingPayload),
}

/// Events delivered to a client connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Acknowledges `setup`
    #[serde(rename = "connected")]
    Connected,
    #[serde(rename = "message received")]
    MessageReceived(Message),
    #[serde(rename = "typing")]
    Typing(TypingPayload),
    #[serde(rename = "stop typing")]
    StopTyping(StopTypingPayload),
}

const CLIENT_EVENTS: &[&str] = &[
    "setup",
    "join conversation",
    "leave conversation",
    "new message",
    "typing",
    "stop typing",
];

const SERVER_EVENTS: &[&str] = &["connected", "message received", "typing", "stop typing"];

#[derive(Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Parse a frame, canonicalizing hyphenated event names.
fn decode_frame<T>(text: &str, known: &[&str]) -> Result<T, ProtocolError>
where
    T: for<'de> Deserialize<'de>,
{
    let raw: RawFrame = serde_json::from_str(text)?;
    let event = raw.event.replace('-', " ");
    if !known.contains(&event.as_str()) {
        return Err(ProtocolError::UnknownEvent(raw.event));
    }
    let canonical = if raw.data.is_null() {
        serde_json::json!({ "event": event })
    } else {
        serde_json::json!({ "event": event, "data": raw.data })
    };
    Ok(serde_json::from_value(canonical)?)
}

impl ClientEvent {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        decode_frame(text, CLIENT_EVENTS)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Wire name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Setup(_) => "setup",
            ClientEvent::JoinConversation(_) => "join conversation",
            ClientEvent::LeaveConversation(_) => "leave conversation",
            ClientEvent::NewMessage(_) => "new message",
            ClientEvent::Typing(_) => "typing",
            ClientEvent::StopTyping(_) => "stop typing",
        }
    }

    /// Conversation room this event is scoped to, if any.
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            ClientEvent::Setup(_) => None,
            ClientEvent::JoinConversation(id) | ClientEvent::LeaveConversation(id) => Some(id),
            ClientEvent::NewMessage(msg) => Some(&msg.conversation_id),
            ClientEvent::Typing(p) => Some(&p.conversation_id),
            ClientEvent::StopTyping(p) => Some(&p.conversation_id),
        }
    }
}

impl ServerEvent {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        decode_frame(text, SERVER_EVENTS)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}
