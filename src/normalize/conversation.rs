use crate::error::NormalizeError;
use crate::normalize::channel::{matches_channel_filter, resolve_display_channel};
use crate::normalize::payload::{
    extract_records, first_string, first_timestamp, string_value, CONVERSATION_UNWRAP,
};
use crate::types::Conversation;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

const UNKNOWN_CONTACT: &str = "Unknown";

fn channel_tags(raw: &Value) -> Vec<String> {
    let last = raw.get("lastMessageChannel").into_iter();
    let history = raw
        .get("conversationChannels")
        .and_then(Value::as_array)
        .into_iter()
        .flatten();

    let mut tags: Vec<String> = Vec::new();
    for tag in last.chain(history).filter_map(Value::as_str) {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

fn contact_name(raw: &Value, profile: &Value) -> String {
    let first = first_string(profile, &["firstName", "first_name"]).unwrap_or_default();
    let last = first_string(profile, &["lastName", "last_name"]).unwrap_or_default();
    let full = format!("{first} {last}").trim().to_string();
    if !full.is_empty() {
        return full;
    }
    first_string(raw, &["groupName", "group_name"])
        .or_else(|| first_string(profile, &["groupName", "displayName"]))
        .unwrap_or_else(|| UNKNOWN_CONTACT.to_string())
}

fn last_message_text(raw: &Value) -> String {
    match raw.get("lastMessage") {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(msg @ Value::Object(_)) => {
            first_string(msg, &["messageContent", "text", "content"]).unwrap_or_default()
        }
        _ => String::new(),
    }
}

fn last_message_time(raw: &Value) -> DateTime<Utc> {
    first_timestamp(raw, &["updatedTime", "modifiedAt", "updatedAt", "lastMessageTime"])
        .or_else(|| {
            raw.get("lastMessage")
                .and_then(|msg| first_timestamp(msg, &["timestamp", "createdAt"]))
        })
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

pub fn normalize_conversation(raw: &Value) -> Result<Conversation, NormalizeError> {
    if !raw.is_object() {
        return Err(NormalizeError::MalformedRecord(
            "conversation is not an object".to_string(),
        ));
    }
    let id = first_string(raw, &["conversationId", "id"])
        .ok_or_else(|| NormalizeError::MalformedRecord("conversation without id".to_string()))?;

    let profile = raw.get("userProfile").cloned().unwrap_or(Value::Null);
    let raw_channel_tags = channel_tags(raw);

    Ok(Conversation {
        contact_name: contact_name(raw, &profile),
        contact_id: profile.get("id").and_then(string_value),
        last_message_text: last_message_text(raw),
        last_message_time: last_message_time(raw),
        display_channel: resolve_display_channel(&raw_channel_tags),
        raw_channel_tags,
        unread_count: raw
            .get("unreadMessageCount")
            .and_then(Value::as_i64)
            .unwrap_or(0),
        phone_number: first_string(&profile, &["phoneNumber", "phone"]),
        email: first_string(&profile, &["email"]),
        id,
    })
}

/// Maps a raw conversation-list body. Bad records are skipped one by one,
/// duplicate ids keep their first occurrence, newest first.
pub fn normalize_conversations(body: &Value, channel_filter: Option<&str>) -> Vec<Conversation> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for (index, raw) in extract_records(body, CONVERSATION_UNWRAP).iter().enumerate() {
        match normalize_conversation(raw) {
            Ok(conv) => {
                if !seen.insert(conv.id.clone()) {
                    debug!(id = %conv.id, "duplicate conversation id dropped");
                    continue;
                }
                out.push(conv);
            }
            Err(err) => warn!(index, "skipping conversation record: {err}"),
        }
    }

    if let Some(filter) = channel_filter.filter(|f| !f.trim().is_empty()) {
        out.retain(|conv| matches_channel_filter(&conv.raw_channel_tags, filter));
    }

    out.sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));
    out
}
