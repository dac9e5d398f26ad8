use chrono::{DateTime, TimeZone, Utc};
use convo_console::normalize::{is_file_path, normalize_message, normalize_messages_at};
use convo_console::types::{Direction, FileKind};
use serde_json::{json, Value};

const BASE: Option<&str> = Some("https://api.example.com");

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn normalize(records: &[Value]) -> Vec<convo_console::types::Message> {
    normalize_messages_at(records, "c1", BASE, now())
}

#[test]
fn test_plain_text_message() {
    let raw = json!({
        "id": "m1",
        "messageContent": "hello",
        "isSentFromSleekflow": true,
        "timestamp": 1_700_000_000
    });
    let msg = normalize_message(&raw, "c1", 0, BASE, now()).unwrap().unwrap();
    assert_eq!(msg.id, "m1");
    assert_eq!(msg.conversation_id, "c1");
    assert_eq!(msg.direction, Direction::Sent);
    assert_eq!(msg.text, "hello");
    assert_eq!(msg.file_kind, FileKind::None);
    assert!(msg.file_url.is_none());
    assert_eq!(msg.timestamp, Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap());
}

#[test]
fn test_millisecond_and_missing_timestamps() {
    let millis = json!({"id": "a", "text": "x", "timestamp": 1_700_000_000_000_i64});
    let missing = json!({"id": "b", "text": "y"});
    let a = normalize_message(&millis, "c1", 0, BASE, now()).unwrap().unwrap();
    let b = normalize_message(&missing, "c1", 1, BASE, now()).unwrap().unwrap();
    assert_eq!(a.timestamp, Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap());
    assert_eq!(b.timestamp, now());
    assert_eq!(b.direction, Direction::Received);
}

#[test]
fn test_path_in_text_promoted_to_file() {
    let raw = json!({
        "id": "m1",
        "messageContent": "Conversation/abc/photo.JPG",
        "timestamp": 1_700_000_000
    });
    let msg = normalize_message(&raw, "c1", 0, BASE, now()).unwrap().unwrap();
    assert_eq!(msg.text, "");
    assert_eq!(
        msg.file_url.as_deref(),
        Some("https://api.example.com/Conversation/abc/photo.JPG")
    );
    assert_eq!(msg.file_name.as_deref(), Some("photo.JPG"));
    assert_eq!(msg.file_kind, FileKind::Image);
}

#[test]
fn test_text_falls_through_to_non_path_candidate() {
    let raw = json!({
        "id": "m1",
        "messageContent": "uploads/voice/note.ogg",
        "caption": "listen to this",
        "timestamp": 1
    });
    let msg = normalize_message(&raw, "c1", 0, BASE, now()).unwrap().unwrap();
    assert_eq!(msg.text, "listen to this");
    assert_eq!(msg.file_kind, FileKind::Audio);
}

#[test]
fn test_prose_mentioning_a_path_is_kept_whole() {
    let raw = json!({
        "id": "m1",
        "messageContent": "please read docs/guide.pdf before the call",
        "timestamp": 1
    });
    let msg = normalize_message(&raw, "c1", 0, BASE, now()).unwrap().unwrap();
    assert_eq!(msg.text, "please read docs/guide.pdf before the call");
    assert!(msg.file_url.is_none());
    assert_eq!(msg.file_kind, FileKind::None);

    let link = json!({"id": "m2", "text": "see https://site.example/x.pdf thanks", "timestamp": 2});
    let msg = normalize_message(&link, "c1", 1, BASE, now()).unwrap().unwrap();
    assert_eq!(msg.text, "see https://site.example/x.pdf thanks");
    assert!(msg.file_url.is_none());
}

#[test]
fn test_story_reply_has_priority() {
    let raw = json!({
        "id": "m1",
        "text": "nice story",
        "storyURL": "https://cdn.example.com/story/1.mp4",
        "uploadedFiles": [{"url": "https://cdn.example.com/other.png"}],
        "timestamp": 1
    });
    let msg = normalize_message(&raw, "c1", 0, BASE, now()).unwrap().unwrap();
    assert!(msg.is_story_reply);
    assert_eq!(msg.file_url.as_deref(), Some("https://cdn.example.com/story/1.mp4"));
    assert_eq!(msg.file_kind, FileKind::Video);
    assert_eq!(msg.text, "nice story");
}

#[test]
fn test_uploaded_files_and_type_tag() {
    let raw = json!({
        "id": "m1",
        "messageType": "file",
        "uploadedFiles": [{
            "url": "/files/abc",
            "filename": "invoice.pdf",
            "mimeType": "image/png"
        }],
        "timestamp": 1
    });
    let msg = normalize_message(&raw, "c1", 0, BASE, now()).unwrap().unwrap();
    assert_eq!(msg.file_url.as_deref(), Some("https://api.example.com/files/abc"));
    assert_eq!(msg.file_name.as_deref(), Some("invoice.pdf"));
    assert_eq!(msg.file_kind, FileKind::Image);
}

#[test]
fn test_file_url_array() {
    let raw = json!({"id": "m1", "fileURLs": ["https://cdn.example.com/a/clip.mov"], "timestamp": 1});
    let msg = normalize_message(&raw, "c1", 0, BASE, now()).unwrap().unwrap();
    assert_eq!(msg.file_kind, FileKind::Video);
    assert_eq!(msg.file_name.as_deref(), Some("clip.mov"));
}

#[test]
fn test_empty_message_dropped() {
    let raw = json!({"id": "m1", "messageContent": "   ", "timestamp": 1});
    assert!(normalize_message(&raw, "c1", 0, BASE, now()).unwrap().is_none());
}

#[test]
fn test_batch_never_grows_and_sorts_ascending() {
    let records = vec![
        json!({"id": "late", "text": "b", "timestamp": 300}),
        json!({"id": "empty", "timestamp": 200}),
        json!(17),
        json!({"id": "early", "text": "a", "timestamp": 100}),
    ];
    let out = normalize(&records);
    assert!(out.len() <= records.len());
    let ids: Vec<&str> = out.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["early", "late"]);
}

#[test]
fn test_fallback_ids_are_deterministic() {
    let records = vec![
        json!({"text": "a", "timestamp": 100}),
        json!({"text": "b", "timestamp": 100}),
    ];
    let first = normalize(&records);
    let second = normalize(&records);
    assert_eq!(first, second);
    assert_eq!(first[0].id, "c1:100000:0");
    assert_eq!(first[1].id, "c1:100000:1");
}

#[test]
fn test_idempotent_output() {
    let records = vec![
        json!({"id": "m1", "text": "a", "timestamp": 100}),
        json!({"id": "m2", "messageContent": "Conversation/x/y.png", "timestamp": 200}),
    ];
    let a = serde_json::to_string(&normalize(&records)).unwrap();
    let b = serde_json::to_string(&normalize(&records)).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_no_text_ever_holds_a_path() {
    let records = vec![
        json!({"id": "1", "text": "Conversation/a/b.png"}),
        json!({"id": "2", "body": "x/y.docx", "caption": "z/w.mp3"}),
        json!({"id": "3", "message": " a/b.zip "}),
    ];
    let out = normalize(&records);
    assert_eq!(out.len(), 3);
    for msg in out {
        assert!(!is_file_path(&msg.text), "{msg:?}");
        assert!(msg.file_url.is_some());
    }
}
