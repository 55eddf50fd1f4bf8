//! Client-side chat state.

mod conversations;
mod timeline;

pub use conversations::{ConversationStore, Incoming, PREVIEW_CHARS, preview, unread_badge};
pub use timeline::{MessageTimeline, TimelineState};
