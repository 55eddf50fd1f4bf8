use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sync_protocol::{ClientEvent, Conversation, Message, Participant, Sender};
use tokio::sync::Notify;

use crate::backend::ChatBackend;
use crate::error::{ClientError, Result};
use crate::transport::RelaySink;

pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_740_000_000 + secs, 0).unwrap()
}

fn participant(id: &str) -> Participant {
    Participant {
        id: id.to_string(),
        name: id.trim_start_matches("u-").to_string(),
        email: None,
    }
}

pub fn conversation(id: &str, a: &str, b: &str, updated: i64) -> Conversation {
    Conversation {
        id: id.to_string(),
        participants: vec![participant(a), participant(b)],
        last_message: None,
        updated_at: at(updated),
        created_at: at(0),
    }
}

pub fn message(conversation_id: &str, sender: &str, content: &str, created: i64) -> Message {
    Message {
        id: format!("m-{conversation_id}-{created}"),
        conversation_id: conversation_id.to_string(),
        sender: Sender::Id(sender.to_string()),
        content: content.to_string(),
        created_at: at(created),
    }
}

pub fn message_with_id(id: &str, conversation_id: &str, content: &str, created: i64) -> Message {
    Message {
        id: id.to_string(),
        ..message(conversation_id, "u-peer", content, created)
    }
}

/// Records every emitted event. `set_failing` makes emits fail.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ClientEvent>>,
    failing: AtomicBool,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ClientEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl RelaySink for RecordingSink {
    async fn emit(&self, event: ClientEvent) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ClientError::RelayClosed);
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

#[derive(Default)]
struct FakeData {
    conversations: Vec<Conversation>,
    messages: HashMap<String, Vec<Message>>,
    next_id: u64,
    created: u32,
}

/// In-memory `ChatBackend` acting for one participant.
pub struct FakeBackend {
    me: String,
    data: Mutex<FakeData>,
    failing: AtomicBool,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    waiting: Mutex<HashSet<String>>,
}

impl FakeBackend {
    pub fn new(me: &str) -> Self {
        Self {
            me: me.to_string(),
            data: Mutex::new(FakeData::default()),
            failing: AtomicBool::new(false),
            gates: Mutex::new(HashMap::new()),
            waiting: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_conversation(self, conversation: Conversation) -> Self {
        self.data.lock().unwrap().conversations.push(conversation);
        self
    }

    pub fn with_messages(self, conversation_id: &str, messages: Vec<Message>) -> Self {
        self.data
            .lock()
            .unwrap()
            .messages
            .insert(conversation_id.to_string(), messages);
        self
    }

    /// Number of conversations actually created.
    pub fn created(&self) -> u32 {
        self.data.lock().unwrap().created
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Block history fetches for `conversation_id` until the returned handle
    /// is notified.
    pub fn hold_fetch(&self, conversation_id: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap()
            .insert(conversation_id.to_string(), Arc::clone(&gate));
        gate
    }

    pub fn is_waiting(&self, conversation_id: &str) -> bool {
        self.waiting.lock().unwrap().contains(conversation_id)
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(ClientError::Unavailable)
        } else {
            Ok(())
        }
    }
}

impl ChatBackend for FakeBackend {
    async fn fetch_conversations(&self) -> Result<Vec<Conversation>> {
        self.check()?;
        let mut list = self.data.lock().unwrap().conversations.clone();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(list)
    }

    async fn create_or_get_conversation(&self, recipient_id: &str) -> Result<Conversation> {
        self.check()?;
        let mut data = self.data.lock().unwrap();
        if let Some(existing) = data
            .conversations
            .iter()
            .find(|c| c.is_between(&self.me, recipient_id))
        {
            return Ok(existing.clone());
        }
        data.created += 1;
        let conversation = conversation(
            &format!("c-new-{}", data.created),
            &self.me,
            recipient_id,
            1_000,
        );
        data.conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn fetch_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let gate = self.gates.lock().unwrap().remove(conversation_id);
        if let Some(gate) = gate {
            self.waiting
                .lock()
                .unwrap()
                .insert(conversation_id.to_string());
            gate.notified().await;
        }
        self.check()?;
        Ok(self
            .data
            .lock()
            .unwrap()
            .messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_message(&self, conversation_id: &str, content: &str) -> Result<Message> {
        self.check()?;
        let mut data = self.data.lock().unwrap();
        data.next_id += 1;
        let message = Message {
            id: format!("m-sent-{}", data.next_id),
            conversation_id: conversation_id.to_string(),
            sender: Sender::Id(self.me.clone()),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        data.messages
            .entry(conversation_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(message)
    }
}
