//! SyncSphere chat client core
//!
//! State a chat UI renders from, kept in step with the relay server:
//! - [`ConversationStore`]: conversation list, unread counters, typing signals
//! - [`MessageTimeline`]: history and live messages of the open conversation
//! - [`TypingNotifier`]: `typing` / `stop typing` emission for the local composer
//!
//! [`ChatSession`] ties them to a [`ChatBackend`] (persistence over REST) and
//! a [`RelaySink`] (the WebSocket relay).
//!
//! ```no_run
//! use std::sync::Arc;
//! use sync_client::{ChatSession, ClientConfig, RelayConnection, RestBackend};
//!
//! # async fn run() -> sync_client::Result<()> {
//! let config = ClientConfig::load()?;
//! let backend = Arc::new(RestBackend::new(&config, "u-alice"));
//! let (relay, events) = RelayConnection::new(&config, "u-alice");
//! let session = Arc::new(ChatSession::new(&config, "u-alice", "Alice", backend, Arc::new(relay)));
//!
//! let pump = Arc::clone(&session);
//! tokio::spawn(async move { pump.pump_events(events).await });
//!
//! session.refresh_conversations().await?;
//! session.start_or_open("u-bob").await?;
//! session.send_message("hi").await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod session;
pub mod store;
pub mod transport;
pub mod typing;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use backend::{ChatBackend, RestBackend};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use session::{ChatSession, ChatState};
pub use store::{ConversationStore, Incoming, MessageTimeline, TimelineState, unread_badge};
pub use transport::{RelayConnection, RelaySink};
pub use typing::TypingNotifier;
