//! SyncSphere wire contract
//!
//! Records and relay events exchanged between the relay server and chat
//! clients. Field and event names are fixed by existing counterparts:
//! - REST records use `_id`, `conversationId`, `sender`, `content`, `createdAt`
//! - Relay frames are `{"event": <name>, "data": <payload>}` JSON text frames
//!
//! # Example
//!
//! ```
//! use sync_protocol::{ClientEvent, StopTypingPayload};
//!
//! let frame = ClientEvent::StopTyping(StopTypingPayload {
//!     conversation_id: "c-1".into(),
//! })
//! .encode()
//! .unwrap();
//! assert_eq!(frame, r#"{"event":"stop typing","data":{"conversationId":"c-1"}}"#);
//!
//! let decoded = ClientEvent::decode(r#"{"event":"join-conversation","data":"c-1"}"#).unwrap();
//! assert_eq!(decoded, ClientEvent::JoinConversation("c-1".into()));
//! ```

mod error;
mod event;
mod records;

pub use error::ProtocolError;
pub use event::{ClientEvent, ServerEvent, StopTypingPayload, TypingPayload};
pub use records::{Conversation, Message, Participant, Sender, normalize_content};
