//! Chat session: the application context a UI drives.
//!
//! Owns the persistence backend, the relay sink and the client state. Every
//! state change is applied as one transition under the state lock, and only
//! after the authoritative result came back from the backend.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use sync_protocol::{ClientEvent, Conversation, Message, ServerEvent, normalize_content};
use tokio::sync::{RwLock, RwLockReadGuard, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backend::ChatBackend;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::store::{ConversationStore, Incoming, MessageTimeline};
use crate::transport::RelaySink;
use crate::typing::TypingNotifier;

/// Conversation list and timeline, locked together so an incoming message
/// and a conversation switch never interleave.
#[derive(Debug, Default)]
pub struct ChatState {
    pub conversations: ConversationStore,
    pub timeline: MessageTimeline,
    /// Rooms kept joined whether or not their conversation is open
    pub watched: HashSet<String>,
}

pub struct ChatSession<B: ChatBackend, S: RelaySink> {
    me: String,
    backend: Arc<B>,
    sink: Arc<S>,
    state: RwLock<ChatState>,
    typing: TypingNotifier<S>,
    /// How long a peer's `typing` shows without a refresh or `stop typing`
    typing_ttl: Duration,
}

impl<B: ChatBackend, S: RelaySink> ChatSession<B, S> {
    pub fn new(
        config: &ClientConfig,
        me: impl Into<String>,
        display_name: impl Into<String>,
        backend: Arc<B>,
        sink: Arc<S>,
    ) -> Self {
        let typing = TypingNotifier::new(Arc::clone(&sink), display_name, config.typing_timeout());
        Self {
            me: me.into(),
            backend,
            sink,
            state: RwLock::new(ChatState::default()),
            typing,
            typing_ttl: config.typing_timeout(),
        }
    }

    pub fn participant_id(&self) -> &str {
        &self.me
    }

    /// Read access for rendering.
    pub async fn state(&self) -> RwLockReadGuard<'_, ChatState> {
        self.state.read().await
    }

    pub async fn active_conversation_id(&self) -> Option<String> {
        self.state
            .read()
            .await
            .conversations
            .active_id()
            .map(String::from)
    }

    pub async fn conversations(&self) -> Vec<Conversation> {
        self.state.read().await.conversations.conversations().to_vec()
    }

    pub async fn timeline_messages(&self) -> Vec<Message> {
        self.state.read().await.timeline.messages().to_vec()
    }

    pub async fn unread(&self, conversation_id: &str) -> u32 {
        self.state.read().await.conversations.unread(conversation_id)
    }

    /// Name of whoever is typing in `conversation_id`. Lapses once the
    /// typing timeout passes without a fresh `typing` from the peer.
    pub async fn typing_indicator(&self, conversation_id: &str) -> Option<String> {
        self.state
            .read()
            .await
            .conversations
            .typing(conversation_id, Instant::now())
            .map(String::from)
    }

    /// Reload the conversation list. On failure the current list stays.
    pub async fn refresh_conversations(&self) -> Result<()> {
        let list = self.backend.fetch_conversations().await?;
        debug!(count = list.len(), "Loaded conversations");
        self.state.write().await.conversations.upsert_from_server(list);
        Ok(())
    }

    /// Join the room of every listed conversation so relayed messages for
    /// conversations that are not open still reach the unread counters.
    /// Watched rooms stay joined across conversation switches.
    pub async fn watch_conversations(&self) {
        let joins: Vec<String> = {
            let mut state = self.state.write().await;
            let ids: Vec<String> = state
                .conversations
                .conversations()
                .iter()
                .map(|c| c.id.clone())
                .collect();
            ids.into_iter()
                .filter(|id| state.watched.insert(id.clone()))
                .collect()
        };
        for conversation_id in joins {
            self.emit_best_effort(ClientEvent::JoinConversation(conversation_id))
                .await;
        }
    }

    /// Open the conversation with `recipient_id`, creating it if the pair has
    /// none yet. The backend's record is used as returned.
    pub async fn start_or_open(&self, recipient_id: &str) -> Result<Conversation> {
        let recipient_id = recipient_id.trim();
        if recipient_id.is_empty() {
            return Err(ClientError::Validation("recipient id is required".into()));
        }
        if recipient_id == self.me {
            return Err(ClientError::Validation(
                "cannot start a conversation with yourself".into(),
            ));
        }

        let existing = self
            .state
            .read()
            .await
            .conversations
            .find_pair(&self.me, recipient_id)
            .cloned();
        let conversation = match existing {
            Some(conversation) => conversation,
            None => {
                let conversation = self.backend.create_or_get_conversation(recipient_id).await?;
                self.state
                    .write()
                    .await
                    .conversations
                    .insert_if_absent(conversation.clone());
                conversation
            }
        };

        self.open_conversation(&conversation.id).await?;
        Ok(conversation)
    }

    /// Make `conversation_id` active, move relay membership over to it and
    /// load its history.
    ///
    /// A fetch failure leaves the timeline empty in the `Failed` state and is
    /// returned; opening the conversation again retries. A load overtaken by a
    /// newer open is discarded and reports `Ok`, whatever its fetch returned.
    pub async fn open_conversation(&self, conversation_id: &str) -> Result<()> {
        if conversation_id.is_empty() {
            return Err(ClientError::Validation("conversation id is required".into()));
        }

        let (previous, generation, keep_previous) = {
            let mut state = self.state.write().await;
            let previous = state.conversations.set_active(conversation_id);
            let generation = state.timeline.begin_load(conversation_id);
            let keep_previous = previous
                .as_ref()
                .is_some_and(|p| state.watched.contains(p));
            (previous, generation, keep_previous)
        };

        if let Some(previous) = previous.filter(|p| p != conversation_id) {
            if let Err(e) = self.typing.stop().await {
                warn!("Failed to stop typing: {}", e);
            }
            if !keep_previous {
                self.emit_best_effort(ClientEvent::LeaveConversation(previous))
                    .await;
            }
        }
        self.emit_best_effort(ClientEvent::JoinConversation(conversation_id.to_string()))
            .await;

        let fetched = self.backend.fetch_messages(conversation_id).await;
        let mut state = self.state.write().await;
        match fetched {
            Ok(history) => {
                if state.timeline.finish_load(generation, Ok(history)) {
                    info!(conversation = %conversation_id, "Conversation opened");
                }
                Ok(())
            }
            Err(e) => {
                if state.timeline.finish_load(generation, Err(e.to_string())) {
                    Err(e)
                } else {
                    debug!(
                        conversation = %conversation_id,
                        "Discarded stale history failure: {}", e
                    );
                    Ok(())
                }
            }
        }
    }

    /// Leave the open conversation, if any.
    pub async fn close_conversation(&self) {
        let previous = {
            let mut state = self.state.write().await;
            state.timeline.reset();
            state
                .conversations
                .clear_active()
                .filter(|p| !state.watched.contains(p))
        };
        if let Err(e) = self.typing.stop().await {
            warn!("Failed to stop typing: {}", e);
        }
        if let Some(previous) = previous {
            self.emit_best_effort(ClientEvent::LeaveConversation(previous))
                .await;
        }
    }

    /// Persist `content` in the open conversation and notify the room.
    ///
    /// Nothing changes locally until the backend has confirmed the message.
    pub async fn send_message(&self, content: &str) -> Result<Message> {
        let content = normalize_content(content)
            .ok_or_else(|| ClientError::Validation("message content must not be empty".into()))?;
        let conversation_id = self
            .active_conversation_id()
            .await
            .ok_or(ClientError::NoActiveConversation)?;

        if let Err(e) = self.typing.stop().await {
            warn!("Failed to stop typing: {}", e);
        }

        let message = self
            .backend
            .create_message(&conversation_id, content)
            .await?;

        {
            let mut state = self.state.write().await;
            state.timeline.append(message.clone());
            state.conversations.record_sent(&message);
        }

        self.emit_best_effort(ClientEvent::NewMessage(message.clone()))
            .await;
        Ok(message)
    }

    /// Composer input changed in the open conversation.
    pub async fn on_input(&self, text: &str) -> Result<()> {
        let conversation_id = self
            .active_conversation_id()
            .await
            .ok_or(ClientError::NoActiveConversation)?;
        self.typing.keystroke(&conversation_id, text).await
    }

    pub async fn handle_server_event(&self, event: ServerEvent) {
        match event {
            ServerEvent::Connected => debug!("Relay acknowledged setup"),
            ServerEvent::MessageReceived(message) => {
                let mut state = self.state.write().await;
                if message.sender_id() == self.me {
                    // Sent from another of our own connections
                    state.conversations.record_sent(&message);
                    state.timeline.append(message);
                    return;
                }
                match state.conversations.apply_incoming(&message) {
                    Incoming::Active => {
                        state.timeline.append(message);
                    }
                    Incoming::Unread(count) => {
                        debug!(conversation = %message.conversation_id, unread = count, "Unread message");
                    }
                }
            }
            ServerEvent::Typing(payload) => {
                self.state
                    .write()
                    .await
                    .conversations
                    .set_typing(
                        &payload.conversation_id,
                        &payload.sender_name,
                        Instant::now() + self.typing_ttl,
                    );
            }
            ServerEvent::StopTyping(payload) => {
                self.state
                    .write()
                    .await
                    .conversations
                    .clear_typing(&payload.conversation_id);
            }
        }
    }

    /// Apply relay events until the transport closes.
    pub async fn pump_events(&self, mut events: mpsc::Receiver<ServerEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_server_event(event).await;
        }
        debug!("Relay event stream ended");
    }

    async fn emit_best_effort(&self, event: ClientEvent) {
        let name = event.name();
        if let Err(e) = self.sink.emit(event).await {
            warn!(event = name, "Relay emit failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FakeBackend, RecordingSink, conversation, message};
    use sync_protocol::{StopTypingPayload, TypingPayload};

    type Session = ChatSession<FakeBackend, RecordingSink>;

    fn session_with(backend: FakeBackend) -> (Arc<Session>, Arc<FakeBackend>, Arc<RecordingSink>) {
        let backend = Arc::new(backend);
        let sink = Arc::new(RecordingSink::default());
        let session = Session::new(
            &ClientConfig::default(),
            "u-me",
            "Me",
            Arc::clone(&backend),
            Arc::clone(&sink),
        );
        (Arc::new(session), backend, sink)
    }

    fn seeded() -> FakeBackend {
        FakeBackend::new("u-me")
            .with_conversation(conversation("c-bob", "u-me", "u-bob", 20))
            .with_conversation(conversation("c-carol", "u-me", "u-carol", 10))
            .with_messages(
                "c-bob",
                vec![
                    message("c-bob", "u-bob", "hello", 1),
                    message("c-bob", "u-me", "hey", 2),
                ],
            )
    }

    #[tokio::test]
    async fn open_joins_room_and_loads_history() {
        let (session, _, sink) = session_with(seeded());
        session.refresh_conversations().await.unwrap();
        session.open_conversation("c-bob").await.unwrap();

        let contents: Vec<String> = session
            .timeline_messages()
            .await
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, ["hello", "hey"]);
        assert_eq!(
            sink.events(),
            [ClientEvent::JoinConversation("c-bob".into())]
        );
        assert!(session.state().await.timeline.is_ready());
    }

    #[tokio::test]
    async fn switching_leaves_previous_room() {
        let (session, _, sink) = session_with(seeded());
        session.open_conversation("c-bob").await.unwrap();
        session.open_conversation("c-carol").await.unwrap();

        assert_eq!(
            sink.events(),
            [
                ClientEvent::JoinConversation("c-bob".into()),
                ClientEvent::LeaveConversation("c-bob".into()),
                ClientEvent::JoinConversation("c-carol".into()),
            ]
        );
        assert!(session.timeline_messages().await.is_empty());
    }

    #[tokio::test]
    async fn start_or_open_reuses_existing_pair() {
        let (session, backend, _) = session_with(seeded());
        session.refresh_conversations().await.unwrap();

        let conv = session.start_or_open("u-bob").await.unwrap();
        assert_eq!(conv.id, "c-bob");
        assert_eq!(backend.created(), 0);
        assert_eq!(session.active_conversation_id().await.as_deref(), Some("c-bob"));
    }

    #[tokio::test]
    async fn start_or_open_creates_and_prepends() {
        let (session, backend, _) = session_with(seeded());
        session.refresh_conversations().await.unwrap();

        let conv = session.start_or_open("u-dan").await.unwrap();
        assert_eq!(backend.created(), 1);
        let listed = session.conversations().await;
        assert_eq!(listed.len(), 3);
        assert_eq!(listed[0].id, conv.id);

        // Second time goes through the local list
        let again = session.start_or_open("u-dan").await.unwrap();
        assert_eq!(again.id, conv.id);
        assert_eq!(backend.created(), 1);
        assert_eq!(session.conversations().await.len(), 3);
    }

    #[tokio::test]
    async fn start_or_open_trusts_backend_record_when_list_is_stale() {
        // The pair exists on the server but the list was never loaded
        let (session, backend, _) = session_with(seeded());
        let conv = session.start_or_open("u-carol").await.unwrap();
        assert_eq!(conv.id, "c-carol");
        assert_eq!(backend.created(), 0);
        assert_eq!(session.conversations().await.len(), 1);
    }

    #[tokio::test]
    async fn start_or_open_validates_recipient() {
        let (session, _, sink) = session_with(seeded());
        assert!(matches!(
            session.start_or_open("  ").await,
            Err(ClientError::Validation(_))
        ));
        assert!(matches!(
            session.start_or_open("u-me").await,
            Err(ClientError::Validation(_))
        ));
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn send_appends_confirmed_record_and_relays_it() {
        let (session, _, sink) = session_with(seeded());
        session.refresh_conversations().await.unwrap();
        session.open_conversation("c-carol").await.unwrap();

        let sent = session.send_message("  hi carol  ").await.unwrap();
        assert_eq!(sent.content, "hi carol");

        let timeline = session.timeline_messages().await;
        assert_eq!(timeline, [sent.clone()]);
        let listed = session.conversations().await;
        assert_eq!(listed[0].id, "c-carol");
        assert_eq!(listed[0].last_message.as_ref(), Some(&sent));
        assert_eq!(session.unread("c-carol").await, 0);
        assert_eq!(sink.events().last(), Some(&ClientEvent::NewMessage(sent)));
    }

    #[tokio::test]
    async fn rejected_send_changes_nothing() {
        let (session, backend, sink) = session_with(seeded());
        assert!(matches!(
            session.send_message("hi").await,
            Err(ClientError::NoActiveConversation)
        ));

        session.open_conversation("c-bob").await.unwrap();
        let before = sink.events().len();
        assert!(matches!(
            session.send_message(" \n ").await,
            Err(ClientError::Validation(_))
        ));

        backend.set_failing(true);
        assert!(matches!(
            session.send_message("hi").await,
            Err(ClientError::Unavailable)
        ));
        assert_eq!(session.timeline_messages().await.len(), 2);
        assert_eq!(sink.events().len(), before);
    }

    #[tokio::test]
    async fn relay_failure_after_persist_still_returns_message() {
        let (session, _, sink) = session_with(seeded());
        session.open_conversation("c-bob").await.unwrap();
        sink.set_failing(true);

        let sent = session.send_message("still saved").await.unwrap();
        assert_eq!(session.timeline_messages().await.last(), Some(&sent));
    }

    #[tokio::test]
    async fn incoming_for_inactive_conversation_counts_unread() {
        let (session, _, _) = session_with(seeded());
        session.refresh_conversations().await.unwrap();
        session.open_conversation("c-bob").await.unwrap();

        for n in 0..3 {
            session
                .handle_server_event(ServerEvent::MessageReceived(message(
                    "c-carol", "u-carol", "ping", 100 + n,
                )))
                .await;
        }
        assert_eq!(session.unread("c-carol").await, 3);
        assert_eq!(session.conversations().await[0].id, "c-carol");
        assert_eq!(session.timeline_messages().await.len(), 2);

        session.open_conversation("c-carol").await.unwrap();
        assert_eq!(session.unread("c-carol").await, 0);

        let fourth = message("c-carol", "u-carol", "fourth", 200);
        session
            .handle_server_event(ServerEvent::MessageReceived(fourth.clone()))
            .await;
        assert_eq!(session.unread("c-carol").await, 0);
        assert_eq!(session.timeline_messages().await, [fourth]);
    }

    #[tokio::test]
    async fn own_messages_from_elsewhere_are_not_unread() {
        let (session, _, _) = session_with(seeded());
        session.refresh_conversations().await.unwrap();
        session
            .handle_server_event(ServerEvent::MessageReceived(message(
                "c-carol", "u-me", "from my phone", 50,
            )))
            .await;
        assert_eq!(session.unread("c-carol").await, 0);
        assert_eq!(session.conversations().await[0].id, "c-carol");
    }

    #[tokio::test]
    async fn typing_events_drive_indicator() {
        let (session, _, _) = session_with(seeded());
        session
            .handle_server_event(ServerEvent::Typing(TypingPayload {
                conversation_id: "c-bob".into(),
                sender_name: "Bob".into(),
            }))
            .await;
        assert_eq!(session.typing_indicator("c-bob").await.as_deref(), Some("Bob"));

        session
            .handle_server_event(ServerEvent::StopTyping(StopTypingPayload {
                conversation_id: "c-bob".into(),
            }))
            .await;
        assert_eq!(session.typing_indicator("c-bob").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn peer_typing_lapses_without_stop() {
        let (session, _, _) = session_with(seeded());
        let ttl = ClientConfig::default().typing_timeout();
        let typing = || {
            ServerEvent::Typing(TypingPayload {
                conversation_id: "c-bob".into(),
                sender_name: "Bob".into(),
            })
        };

        session.handle_server_event(typing()).await;
        tokio::time::advance(ttl - Duration::from_millis(1)).await;
        assert_eq!(session.typing_indicator("c-bob").await.as_deref(), Some("Bob"));

        // A refresh pushes the deadline out again
        session.handle_server_event(typing()).await;
        tokio::time::advance(Duration::from_millis(10)).await;
        assert_eq!(session.typing_indicator("c-bob").await.as_deref(), Some("Bob"));

        // The `stop typing` never arrives
        tokio::time::advance(ttl).await;
        assert_eq!(session.typing_indicator("c-bob").await, None);
    }

    #[tokio::test]
    async fn send_stops_local_typing_first() {
        let (session, _, sink) = session_with(seeded());
        session.open_conversation("c-bob").await.unwrap();
        session.on_input("hel").await.unwrap();
        let sent = session.send_message("hello").await.unwrap();

        let events = sink.events();
        let tail = &events[events.len() - 3..];
        assert!(matches!(tail[0], ClientEvent::Typing(_)));
        assert_eq!(
            tail[1],
            ClientEvent::StopTyping(StopTypingPayload {
                conversation_id: "c-bob".into()
            })
        );
        assert_eq!(tail[2], ClientEvent::NewMessage(sent));
    }

    #[tokio::test]
    async fn failed_history_load_is_recoverable() {
        let (session, backend, _) = session_with(seeded());
        backend.set_failing(true);
        assert!(session.open_conversation("c-bob").await.is_err());
        assert!(matches!(
            session.state().await.timeline.state(),
            crate::store::TimelineState::Failed(_)
        ));
        assert_eq!(session.active_conversation_id().await.as_deref(), Some("c-bob"));

        backend.set_failing(false);
        session.open_conversation("c-bob").await.unwrap();
        assert_eq!(session.timeline_messages().await.len(), 2);
    }

    #[tokio::test]
    async fn slow_history_for_previous_conversation_is_discarded() {
        let (session, backend, _) = session_with(seeded());
        let gate = backend.hold_fetch("c-bob");

        let slow = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.open_conversation("c-bob").await })
        };
        // Let the first open reach the gated fetch
        while !backend.is_waiting("c-bob") {
            tokio::task::yield_now().await;
        }

        session.open_conversation("c-carol").await.unwrap();
        gate.notify_one();
        slow.await.unwrap().unwrap();

        let state = session.state().await;
        assert_eq!(state.timeline.conversation_id(), Some("c-carol"));
        assert!(state.timeline.messages().is_empty());
        assert_eq!(state.conversations.active_id(), Some("c-carol"));
    }

    #[tokio::test]
    async fn failed_history_for_previous_conversation_is_not_reported() {
        let (session, backend, _) = session_with(seeded());
        let gate = backend.hold_fetch("c-bob");

        let slow = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.open_conversation("c-bob").await })
        };
        while !backend.is_waiting("c-bob") {
            tokio::task::yield_now().await;
        }

        session.open_conversation("c-carol").await.unwrap();
        backend.set_failing(true);
        gate.notify_one();
        slow.await.unwrap().unwrap();

        let state = session.state().await;
        assert_eq!(state.timeline.conversation_id(), Some("c-carol"));
        assert!(state.timeline.is_ready());
        assert_eq!(state.conversations.active_id(), Some("c-carol"));
    }

    #[tokio::test]
    async fn watched_rooms_survive_switches() {
        let (session, _, sink) = session_with(seeded());
        session.refresh_conversations().await.unwrap();
        session.watch_conversations().await;
        // Already watched; nothing new to join
        session.watch_conversations().await;
        assert_eq!(
            sink.events(),
            [
                ClientEvent::JoinConversation("c-bob".into()),
                ClientEvent::JoinConversation("c-carol".into()),
            ]
        );

        session.open_conversation("c-bob").await.unwrap();
        session.open_conversation("c-carol").await.unwrap();
        session.close_conversation().await;
        assert!(
            !sink
                .events()
                .iter()
                .any(|e| matches!(e, ClientEvent::LeaveConversation(_)))
        );
    }

    #[tokio::test]
    async fn close_leaves_room_and_resets_timeline() {
        let (session, _, sink) = session_with(seeded());
        session.open_conversation("c-bob").await.unwrap();
        session.close_conversation().await;

        assert_eq!(
            sink.events().last(),
            Some(&ClientEvent::LeaveConversation("c-bob".into()))
        );
        assert_eq!(session.active_conversation_id().await, None);
        assert!(session.timeline_messages().await.is_empty());

        // Relayed messages now count as unread
        session
            .handle_server_event(ServerEvent::MessageReceived(message(
                "c-bob", "u-bob", "later", 99,
            )))
            .await;
        assert_eq!(session.unread("c-bob").await, 1);
    }

    #[tokio::test]
    async fn pump_applies_events_until_closed() {
        let (session, _, _) = session_with(seeded());
        let (tx, rx) = mpsc::channel(8);
        let pump = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.pump_events(rx).await })
        };

        tx.send(ServerEvent::Connected).await.unwrap();
        tx.send(ServerEvent::MessageReceived(message("c-bob", "u-bob", "x", 5)))
            .await
            .unwrap();
        drop(tx);
        pump.await.unwrap();

        assert_eq!(session.unread("c-bob").await, 1);
    }
}
