use crate::error::NormalizeError;
use crate::normalize::payload::{first_bool, first_string, first_timestamp, string_value};
use crate::types::{Direction, FileKind, Message};
use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

const TEXT_FIELDS: &[&str] = &["messageContent", "text", "body", "message", "content", "caption"];
const STORY_FIELDS: &[&str] = &["storyURL", "storyUrl", "story_url"];
const FILE_URL_FIELDS: &[&str] = &["fileURLs", "fileUrls", "file_urls"];
const TYPE_FIELDS: &[&str] = &["messageType", "type", "fileType"];

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "jfif"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "wmv", "webm"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "m4a"];
const DOCUMENT_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "txt", "csv", "zip", "rar",
];

/// Final path segment without query or fragment.
fn last_segment(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    path.rsplit('/').next().unwrap_or(path)
}

fn extension(path: &str) -> Option<String> {
    let segment = last_segment(path);
    let (stem, ext) = segment.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

fn is_known_extension(ext: &str) -> bool {
    [IMAGE_EXTENSIONS, VIDEO_EXTENSIONS, AUDIO_EXTENSIONS, DOCUMENT_EXTENSIONS]
        .iter()
        .any(|list| list.contains(&ext))
}

/// A single whitespace-free token with at least one path separator whose last
/// segment carries a known file extension.
pub fn is_file_path(candidate: &str) -> bool {
    let candidate = candidate.trim();
    if candidate.is_empty() || candidate.chars().any(char::is_whitespace) {
        return false;
    }
    if !candidate.contains('/') {
        return false;
    }
    extension(candidate)
        .map(|ext| is_known_extension(&ext))
        .unwrap_or(false)
}

fn resolve_url(path: &str, base_url: Option<&str>) -> String {
    let path = path.trim();
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    match base_url.map(|b| b.trim_end_matches('/')).filter(|b| !b.is_empty()) {
        Some(base) => format!("{}/{}", base, path.trim_start_matches('/')),
        None => path.to_string(),
    }
}

fn file_name_from(path: &str) -> Option<String> {
    let segment = last_segment(path);
    let decoded = percent_decode_str(segment).decode_utf8_lossy();
    let name = decoded.trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn classify(type_tag: Option<&str>, url: &str) -> FileKind {
    if let Some(tag) = type_tag.map(str::to_ascii_lowercase) {
        if tag.starts_with("image") {
            return FileKind::Image;
        }
        if tag.starts_with("video") {
            return FileKind::Video;
        }
        if tag.starts_with("audio") || tag.starts_with("voice") {
            return FileKind::Audio;
        }
    }
    match extension(url) {
        Some(ext) if IMAGE_EXTENSIONS.contains(&ext.as_str()) => FileKind::Image,
        Some(ext) if VIDEO_EXTENSIONS.contains(&ext.as_str()) => FileKind::Video,
        Some(ext) if AUDIO_EXTENSIONS.contains(&ext.as_str()) => FileKind::Audio,
        _ => FileKind::Other,
    }
}

struct Attachment {
    path: String,
    file_name: Option<String>,
    mime: Option<String>,
    is_story: bool,
}

impl Attachment {
    fn plain(path: &str) -> Self {
        Self {
            path: path.to_string(),
            file_name: None,
            mime: None,
            is_story: false,
        }
    }
}

fn uploaded_file(raw: &Value) -> Option<Attachment> {
    let first = raw
        .get("uploadedFiles")
        .and_then(Value::as_array)?
        .first()?;
    if let Some(url) = string_value(first) {
        return Some(Attachment::plain(&url));
    }
    let path = first_string(first, &["url", "URL", "fileUrl", "fileURL", "link", "filePath"])?;
    Some(Attachment {
        path,
        file_name: first_string(first, &["filename", "fileName", "name"]),
        mime: first_string(first, &["mimeType", "mime_type", "contentType"]),
        is_story: false,
    })
}

fn explicit_attachment(raw: &Value) -> Option<Attachment> {
    if let Some(story) = first_string(raw, STORY_FIELDS) {
        return Some(Attachment {
            is_story: true,
            ..Attachment::plain(&story)
        });
    }
    if let Some(found) = uploaded_file(raw) {
        return Some(found);
    }
    FILE_URL_FIELDS
        .iter()
        .filter_map(|key| raw.get(*key).and_then(Value::as_array))
        .find_map(|urls| urls.first().and_then(string_value))
        .map(|url| Attachment::plain(&url))
}

fn text_candidates(raw: &Value) -> Vec<String> {
    TEXT_FIELDS
        .iter()
        .filter_map(|key| raw.get(*key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn direction(raw: &Value) -> Direction {
    if let Some(sent) = first_bool(raw, &["isSentFromSleekflow", "isSent", "fromMe"]) {
        return if sent { Direction::Sent } else { Direction::Received };
    }
    match first_string(raw, &["direction"]).map(|d| d.to_ascii_lowercase()) {
        Some(d) if d == "sent" || d == "outgoing" || d == "outbound" => Direction::Sent,
        _ => Direction::Received,
    }
}

/// Maps one raw message. `Ok(None)` means the record carries neither text nor
/// a file and is dropped on purpose.
pub fn normalize_message(
    raw: &Value,
    conversation_id: &str,
    index: usize,
    base_url: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Option<Message>, NormalizeError> {
    if !raw.is_object() {
        return Err(NormalizeError::MalformedRecord(format!(
            "message {index} is not an object"
        )));
    }

    let stamped = first_timestamp(raw, &["timestamp", "createdAt", "created_at", "sentAt"]);
    let timestamp = stamped.unwrap_or(now);

    let mut text = String::new();
    let mut embedded: Option<String> = None;
    for candidate in text_candidates(raw) {
        if is_file_path(&candidate) {
            if embedded.is_none() {
                embedded = Some(candidate);
            }
        } else if text.is_empty() {
            text = candidate;
        }
    }

    let attachment =
        explicit_attachment(raw).or_else(|| embedded.as_deref().map(Attachment::plain));

    if text.is_empty() && attachment.is_none() {
        return Ok(None);
    }

    let type_tag = first_string(raw, TYPE_FIELDS);
    let (file_url, file_name, file_kind, is_story_reply) = match attachment {
        Some(found) => {
            let url = resolve_url(&found.path, base_url);
            let tag = found.mime.as_deref().or(type_tag.as_deref());
            let kind = classify(tag, &url);
            let name = found.file_name.or_else(|| file_name_from(&found.path));
            (Some(url), name, kind, found.is_story)
        }
        None => (None, None, FileKind::None, false),
    };

    let id = first_string(raw, &["id", "messageId", "message_id"]).unwrap_or_else(|| match stamped {
        Some(ts) => format!("{conversation_id}:{}:{index}", ts.timestamp_millis()),
        None => format!("{conversation_id}:{index}"),
    });

    Ok(Some(Message {
        id,
        conversation_id: conversation_id.to_string(),
        direction: direction(raw),
        text,
        file_url,
        file_name,
        file_kind,
        is_story_reply,
        timestamp,
    }))
}

/// Normalizes a fetched page set against a fixed clock, oldest first.
pub fn normalize_messages_at(
    records: &[Value],
    conversation_id: &str,
    base_url: Option<&str>,
    now: DateTime<Utc>,
) -> Vec<Message> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for (index, raw) in records.iter().enumerate() {
        match normalize_message(raw, conversation_id, index, base_url, now) {
            Ok(Some(msg)) => {
                if seen.insert(msg.id.clone()) {
                    out.push(msg);
                } else {
                    debug!(id = %msg.id, "duplicate message id dropped");
                }
            }
            Ok(None) => debug!(index, conversation_id, "empty message dropped"),
            Err(err) => warn!(index, conversation_id, "skipping message record: {err}"),
        }
    }

    out.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    out
}

pub fn normalize_messages(
    records: &[Value],
    conversation_id: &str,
    base_url: Option<&str>,
) -> Vec<Message> {
    normalize_messages_at(records, conversation_id, base_url, Utc::now())
}
