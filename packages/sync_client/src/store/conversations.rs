//! Conversation Store
//!
//! The conversation list (most recently active first) plus two maps keyed by
//! conversation id that outlive list refreshes: unread counters and typing
//! signals.

use std::collections::HashMap;

use sync_protocol::{Conversation, Message};
use tokio::time::Instant;

/// Sidebar preview length, in characters.
pub const PREVIEW_CHARS: usize = 32;

/// What `apply_incoming` did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incoming {
    /// Belongs to the open conversation; goes to the timeline
    Active,
    /// Counted as unread; carries the new count
    Unread(u32),
}

#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: Vec<Conversation>,
    active: Option<String>,
    unread: HashMap<String, u32>,
    typing: HashMap<String, TypingSignal>,
}

/// Who is typing, until when. A signal nobody refreshes or stops lapses on
/// its own so a lost `stop typing` cannot pin the indicator.
#[derive(Debug, Clone)]
struct TypingSignal {
    sender_name: String,
    expires_at: Instant,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn get(&self, conversation_id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == conversation_id)
    }

    /// Existing conversation between `me` and `recipient_id`, if loaded.
    pub fn find_pair(&self, me: &str, recipient_id: &str) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|c| c.is_between(me, recipient_id))
    }

    /// Replace the list with a fresh server copy. Unread and typing maps are
    /// left as they are.
    pub fn upsert_from_server(&mut self, mut list: Vec<Conversation>) {
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        self.conversations = list;
    }

    /// Prepend a conversation the server handed back unless one with the same
    /// id is already listed.
    pub fn insert_if_absent(&mut self, conversation: Conversation) -> bool {
        if self.get(&conversation.id).is_some() {
            return false;
        }
        self.conversations.insert(0, conversation);
        true
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn is_active(&self, conversation_id: &str) -> bool {
        self.active.as_deref() == Some(conversation_id)
    }

    /// Make `conversation_id` the open conversation and zero its counter.
    /// Other counters are untouched. Returns the previously active id.
    pub fn set_active(&mut self, conversation_id: &str) -> Option<String> {
        self.unread.remove(conversation_id);
        self.active.replace(conversation_id.to_string())
    }

    pub fn clear_active(&mut self) -> Option<String> {
        self.active.take()
    }

    /// Account for a relayed message. Counts it as unread unless its
    /// conversation is open, then bumps the conversation to the top.
    pub fn apply_incoming(&mut self, message: &Message) -> Incoming {
        let outcome = if self.is_active(&message.conversation_id) {
            Incoming::Active
        } else {
            let count = self
                .unread
                .entry(message.conversation_id.clone())
                .or_insert(0);
            *count += 1;
            Incoming::Unread(*count)
        };
        self.touch(message);
        outcome
    }

    /// Account for a message this client sent itself.
    pub fn record_sent(&mut self, message: &Message) {
        self.touch(message);
    }

    /// Point the conversation at `message` and move it to the front.
    fn touch(&mut self, message: &Message) {
        let Some(pos) = self
            .conversations
            .iter()
            .position(|c| c.id == message.conversation_id)
        else {
            return;
        };
        let mut conversation = self.conversations.remove(pos);
        conversation.record_activity(message);
        self.conversations.insert(0, conversation);
    }

    pub fn unread(&self, conversation_id: &str) -> u32 {
        self.unread.get(conversation_id).copied().unwrap_or(0)
    }

    pub fn total_unread(&self) -> u32 {
        self.unread.values().sum()
    }

    pub fn unread_badge(&self, conversation_id: &str) -> Option<String> {
        unread_badge(self.unread(conversation_id))
    }

    /// Last writer wins. Lapsed signals for other conversations are dropped.
    pub fn set_typing(&mut self, conversation_id: &str, sender_name: &str, expires_at: Instant) {
        let now = Instant::now();
        self.typing.retain(|_, signal| signal.expires_at > now);
        self.typing.insert(
            conversation_id.to_string(),
            TypingSignal {
                sender_name: sender_name.to_string(),
                expires_at,
            },
        );
    }

    /// Clears whoever was typing.
    pub fn clear_typing(&mut self, conversation_id: &str) {
        self.typing.remove(conversation_id);
    }

    /// Name typing in `conversation_id` as of `now`.
    pub fn typing(&self, conversation_id: &str, now: Instant) -> Option<&str> {
        self.typing
            .get(conversation_id)
            .filter(|signal| signal.expires_at > now)
            .map(|signal| signal.sender_name.as_str())
    }
}

/// Badge text for an unread count: nothing at zero, `9+` past nine.
pub fn unread_badge(count: u32) -> Option<String> {
    match count {
        0 => None,
        1..=9 => Some(count.to_string()),
        _ => Some("9+".to_string()),
    }
}

/// Sidebar line for a conversation's latest message.
pub fn preview(conversation: &Conversation) -> Option<String> {
    conversation
        .last_message
        .as_ref()
        .map(|m| m.preview(PREVIEW_CHARS))
}
