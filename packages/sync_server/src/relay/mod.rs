//! Room-based event relay
//!
//! One WebSocket per client. A connection announces its participant identity
//! with `setup`, joins the room of each conversation it has open, and gets
//! every other member's `new message`, `typing` and `stop typing` events.

mod hub;
mod presence;
mod rooms;
mod socket;

pub use hub::{RelayError, RelayHub};
pub use presence::PresenceRegistry;
pub use rooms::{RoomKey, RoomMultiplexer};
pub use socket::handle_relay_socket;

/// Opaque per-socket identifier (UUID v4)
pub type ConnectionId = String;
