//! Relay transport: one lazily-opened, reopenable WebSocket per session.

use std::collections::BTreeSet;
use std::future::Future;

use futures::{SinkExt, StreamExt};
use sync_protocol::{ClientEvent, ServerEvent};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// Capacity of the inbound and outbound event queues.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Where client events go. Emission is best-effort: the relay gives no
/// acknowledgement.
pub trait RelaySink: Send + Sync + 'static {
    fn emit(&self, event: ClientEvent) -> impl Future<Output = Result<()>> + Send;
}

/// `RelaySink` over a WebSocket to the relay server.
///
/// The socket is opened on the first `emit` (or an explicit `connect`) and
/// announces the participant with `setup` before anything else. Decoded
/// server events are forwarded to the receiver returned by `new`.
///
/// When the server drops the socket the next `emit` or `connect` opens a new
/// one, re-sends `setup` and rejoins every room joined through this
/// connection. Only `close` is terminal.
pub struct RelayConnection {
    ws_url: String,
    participant_id: String,
    link: Mutex<LinkState>,
    inbound: mpsc::Sender<ServerEvent>,
    shutdown: CancellationToken,
}

#[derive(Default)]
struct LinkState {
    current: Option<Link>,
    rooms: BTreeSet<String>,
}

/// One open socket: its outbound queue and the token stopping its tasks.
struct Link {
    tx: mpsc::Sender<ClientEvent>,
    cancel: CancellationToken,
}

impl Link {
    fn is_alive(&self) -> bool {
        !self.cancel.is_cancelled() && !self.tx.is_closed()
    }
}

impl RelayConnection {
    pub fn new(
        config: &ClientConfig,
        participant_id: impl Into<String>,
    ) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (inbound, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let conn = Self {
            ws_url: config.ws_url(),
            participant_id: participant_id.into(),
            link: Mutex::new(LinkState::default()),
            inbound,
            shutdown: CancellationToken::new(),
        };
        (conn, events)
    }

    pub async fn is_connected(&self) -> bool {
        self.link
            .lock()
            .await
            .current
            .as_ref()
            .is_some_and(Link::is_alive)
    }

    /// Open the socket unless one is already live. Concurrent callers share
    /// one connection attempt.
    pub async fn connect(&self) -> Result<()> {
        let mut state = self.link.lock().await;
        self.live_sender(&mut state).await.map(|_| ())
    }

    /// Stop the socket tasks for good. Later emits fail with `RelayClosed`.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    async fn live_sender(&self, state: &mut LinkState) -> Result<mpsc::Sender<ClientEvent>> {
        if self.shutdown.is_cancelled() {
            return Err(ClientError::RelayClosed);
        }
        if let Some(link) = state.current.as_ref().filter(|l| l.is_alive()) {
            return Ok(link.tx.clone());
        }
        if state.current.take().is_some() {
            info!(rooms = state.rooms.len(), "Relay reconnecting");
        }

        let link = self.open(&state.rooms).await?;
        let tx = link.tx.clone();
        state.current = Some(link);
        Ok(tx)
    }

    async fn open(&self, rooms: &BTreeSet<String>) -> Result<Link> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(&self.ws_url)
            .await
            .map_err(ClientError::from_tungstenite)?;
        info!(url = %self.ws_url, "Relay connected");

        let (mut ws_write, mut ws_read) = ws_stream.split();

        let greeting = std::iter::once(ClientEvent::Setup(self.participant_id.clone()))
            .chain(rooms.iter().cloned().map(ClientEvent::JoinConversation));
        for event in greeting {
            let json = event.encode()?;
            ws_write
                .send(tungstenite::Message::Text(json.into()))
                .await
                .map_err(ClientError::from_tungstenite)?;
        }

        let (tx, mut rx) = mpsc::channel::<ClientEvent>(EVENT_CHANNEL_CAPACITY);
        let link_cancel = self.shutdown.child_token();

        // Outbound queue -> socket
        let cancel = link_cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        let _ = ws_write.send(tungstenite::Message::Close(None)).await;
                        break;
                    }
                    event = rx.recv() => {
                        let Some(event) = event else { break };
                        let json = match event.encode() {
                            Ok(j) => j,
                            Err(e) => {
                                warn!("Failed to encode {} event: {}", event.name(), e);
                                continue;
                            }
                        };
                        if ws_write.send(tungstenite::Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                }
            }
            // A dead writer makes the link reopen on the next emit
            cancel.cancel();
            debug!("Relay writer ended");
        });

        // Socket -> inbound queue
        let cancel = link_cancel.clone();
        let inbound = self.inbound.clone();
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    _ = cancel.cancelled() => break,
                    frame = ws_read.next() => frame,
                };
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        match ServerEvent::decode(text.as_str()) {
                            Ok(event) => {
                                if inbound.send(event).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!("Ignoring malformed relay frame: {}", e),
                        }
                    }
                    Some(Ok(tungstenite::Message::Close(_))) | None => {
                        info!("Relay closed by server");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("Relay read error: {}", e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
            // Stops the writer too
            cancel.cancel();
            debug!("Relay reader ended");
        });

        Ok(Link {
            tx,
            cancel: link_cancel,
        })
    }
}

impl RelaySink for RelayConnection {
    async fn emit(&self, event: ClientEvent) -> Result<()> {
        let tx = {
            let mut state = self.link.lock().await;
            let tx = self.live_sender(&mut state).await?;
            match &event {
                ClientEvent::JoinConversation(id) => {
                    state.rooms.insert(id.clone());
                }
                ClientEvent::LeaveConversation(id) => {
                    state.rooms.remove(id);
                }
                _ => {}
            }
            tx
        };
        debug!(event = event.name(), "Emitting relay event");
        tx.send(event).await.map_err(|_| ClientError::RelayClosed)
    }
}

impl Drop for RelayConnection {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
