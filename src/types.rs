use crate::normalize::channel::DisplayChannel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub contact_name: String,
    pub contact_id: Option<String>,
    pub last_message_text: String,
    pub last_message_time: DateTime<Utc>,
    pub display_channel: DisplayChannel,
    /// Lower-cased, deduplicated, last-message channel first.
    pub raw_channel_tags: Vec<String>,
    pub unread_count: i64,
    pub phone_number: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Sent,
    Received,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Image,
    Video,
    Audio,
    Other,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub direction: Direction,
    pub text: String,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_kind: FileKind,
    pub is_story_reply: bool,
    pub timestamp: DateTime<Utc>,
}

/// Identity fragment pushed by the CRM widget when a lead is opened.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadSnapshot {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl LeadSnapshot {
    pub fn has_identity(&self) -> bool {
        let filled = |v: &Option<String>| v.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false);
        filled(&self.phone) || filled(&self.email)
    }
}

/// A file that is already hosted somewhere the upstream can fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingFile {
    pub url: String,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendRequest {
    pub text: Option<String>,
    #[serde(default)]
    pub files: Vec<OutgoingFile>,
}
