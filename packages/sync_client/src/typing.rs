//! Local composer typing signal.
//!
//! Each keystroke emits `typing` and restarts an inactivity countdown. The
//! countdown expiring, an explicit `stop`, or the input going empty emits a
//! single `stop typing` for that conversation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use sync_protocol::{ClientEvent, StopTypingPayload, TypingPayload, normalize_content};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Result;
use crate::transport::RelaySink;

struct Countdown {
    conversation_id: String,
    id: u64,
    cancel: CancellationToken,
}

pub struct TypingNotifier<S: RelaySink> {
    sink: Arc<S>,
    sender_name: String,
    timeout: Duration,
    countdown: Arc<Mutex<Option<Countdown>>>,
    next_id: AtomicU64,
}

impl<S: RelaySink> TypingNotifier<S> {
    pub fn new(sink: Arc<S>, sender_name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            sink,
            sender_name: sender_name.into(),
            timeout,
            countdown: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
        }
    }

    /// Conversation with a running countdown, if any.
    pub async fn active_conversation(&self) -> Option<String> {
        self.countdown
            .lock()
            .await
            .as_ref()
            .map(|c| c.conversation_id.clone())
    }

    /// React to the composer changing to `input` in `conversation_id`.
    pub async fn keystroke(&self, conversation_id: &str, input: &str) -> Result<()> {
        if normalize_content(input).is_none() {
            return self.stop().await;
        }

        let mut slot = self.countdown.lock().await;
        if let Some(previous) = slot.take() {
            previous.cancel.cancel();
            if previous.conversation_id != conversation_id {
                // Switched conversations mid-composition
                self.emit_stop(previous.conversation_id).await?;
            }
        }

        self.sink
            .emit(ClientEvent::Typing(TypingPayload {
                conversation_id: conversation_id.to_string(),
                sender_name: self.sender_name.clone(),
            }))
            .await?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        *slot = Some(Countdown {
            conversation_id: conversation_id.to_string(),
            id,
            cancel: cancel.clone(),
        });
        drop(slot);

        let sink = Arc::clone(&self.sink);
        let countdown = Arc::clone(&self.countdown);
        let timeout = self.timeout;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    let expired = {
                        let mut slot = countdown.lock().await;
                        match slot.as_ref() {
                            Some(current) if current.id == id => slot.take(),
                            _ => None,
                        }
                    };
                    if let Some(expired) = expired {
                        debug!(conversation = %expired.conversation_id, "Typing countdown expired");
                        let event = ClientEvent::StopTyping(StopTypingPayload {
                            conversation_id: expired.conversation_id,
                        });
                        if let Err(e) = sink.emit(event).await {
                            warn!("Failed to emit stop typing: {}", e);
                        }
                    }
                }
            }
        });

        Ok(())
    }

    /// Emit `stop typing` if a countdown is running. No-op otherwise.
    pub async fn stop(&self) -> Result<()> {
        let previous = self.countdown.lock().await.take();
        match previous {
            Some(previous) => {
                previous.cancel.cancel();
                self.emit_stop(previous.conversation_id).await
            }
            None => Ok(()),
        }
    }

    async fn emit_stop(&self, conversation_id: String) -> Result<()> {
        self.sink
            .emit(ClientEvent::StopTyping(StopTypingPayload { conversation_id }))
            .await
    }
}
