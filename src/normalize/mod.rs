//! Mapping of heterogeneous upstream payloads into canonical conversations
//! and messages. Every function here is pure; fetching lives in `upstream`.

pub mod channel;
pub mod conversation;
pub mod message;
pub mod payload;

pub use channel::{matches_channel_filter, resolve_display_channel, DisplayChannel};
pub use conversation::{normalize_conversation, normalize_conversations};
pub use message::{is_file_path, normalize_message, normalize_messages, normalize_messages_at};
