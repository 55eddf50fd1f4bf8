//! Message timeline for the open conversation.
//!
//! `Idle -> Loading -> Ready`, or `Failed` when the history fetch errors.
//! Every load gets a generation number; a resolution carrying an older
//! generation is dropped so a slow fetch can't overwrite a newer switch.

use std::collections::HashSet;

use sync_protocol::Message;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineState {
    Idle,
    Loading,
    Ready,
    /// Empty timeline plus the error to show; reopening the conversation retries
    Failed(String),
}

#[derive(Debug)]
pub struct MessageTimeline {
    state: TimelineState,
    generation: u64,
    conversation_id: Option<String>,
    messages: Vec<Message>,
    seen: HashSet<String>,
    /// Live messages that arrived while history was loading
    pending: Vec<Message>,
}

impl Default for MessageTimeline {
    fn default() -> Self {
        Self {
            state: TimelineState::Idle,
            generation: 0,
            conversation_id: None,
            messages: Vec::new(),
            seen: HashSet::new(),
            pending: Vec::new(),
        }
    }
}

impl MessageTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &TimelineState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == TimelineState::Ready
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Discard whatever was shown and start loading `conversation_id`.
    /// Returns the generation the caller must hand back to `finish_load`.
    pub fn begin_load(&mut self, conversation_id: &str) -> u64 {
        self.clear_entries();
        self.generation += 1;
        self.conversation_id = Some(conversation_id.to_string());
        self.state = TimelineState::Loading;
        self.generation
    }

    /// Apply a history fetch. Returns `false` when the fetch is stale.
    ///
    /// Live messages buffered during the load are appended after the history,
    /// skipping any the history already contains.
    pub fn finish_load(
        &mut self,
        generation: u64,
        result: std::result::Result<Vec<Message>, String>,
    ) -> bool {
        if generation != self.generation || self.state != TimelineState::Loading {
            debug!(
                generation,
                current = self.generation,
                "Discarding stale history load"
            );
            return false;
        }

        let pending = std::mem::take(&mut self.pending);
        match result {
            Ok(history) => {
                self.state = TimelineState::Ready;
                for message in history.into_iter().chain(pending) {
                    self.push(message);
                }
            }
            Err(error) => {
                self.clear_entries();
                self.state = TimelineState::Failed(error);
            }
        }
        true
    }

    /// Append a server-confirmed message for the current conversation.
    ///
    /// Messages for another conversation and ids already shown are ignored.
    /// While loading, the message is held until the history lands.
    pub fn append(&mut self, message: Message) -> bool {
        if self.conversation_id.as_deref() != Some(message.conversation_id.as_str()) {
            return false;
        }
        match self.state {
            TimelineState::Ready => self.push(message),
            TimelineState::Loading => {
                if self.pending.iter().any(|m| m.id == message.id) {
                    return false;
                }
                self.pending.push(message);
                true
            }
            TimelineState::Idle | TimelineState::Failed(_) => false,
        }
    }

    /// Back to `Idle` with nothing shown. Any in-flight load becomes stale.
    pub fn reset(&mut self) {
        self.clear_entries();
        self.generation += 1;
        self.conversation_id = None;
        self.state = TimelineState::Idle;
    }

    fn push(&mut self, message: Message) -> bool {
        if !self.seen.insert(message.id.clone()) {
            return false;
        }
        self.messages.push(message);
        true
    }

    fn clear_entries(&mut self) {
        self.messages.clear();
        self.seen.clear();
        self.pending.clear();
    }
}
