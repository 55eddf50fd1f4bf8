pub mod conversations;
pub mod health;
pub mod messages;
pub mod users;
pub mod websocket;

// Re-export all handlers for easy route registration
pub use conversations::{create_conversation, list_conversations};
pub use health::{health_handler, health_live_handler, health_ready_handler, metrics_handler};
pub use messages::{create_message, get_messages};
pub use users::{search_users, update_profile};
pub use websocket::relay_websocket_handler;
