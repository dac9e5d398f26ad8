use chrono::{TimeZone, Utc};
use convo_console::error::NormalizeError;
use convo_console::normalize::{normalize_conversation, normalize_conversations, DisplayChannel};
use serde_json::json;

fn record(id: &str, updated: i64, channels: &[&str]) -> serde_json::Value {
    json!({
        "conversationId": id,
        "updatedTime": updated,
        "lastMessageChannel": channels.first().copied().unwrap_or(""),
        "conversationChannels": channels,
        "userProfile": {"id": format!("contact-{id}"), "firstName": "Ada", "lastName": "Lovelace"},
        "lastMessage": {"messageContent": format!("hello from {id}")},
        "unreadMessageCount": 2
    })
}

#[test]
fn test_full_record() {
    let raw = json!({
        "conversationId": "c1",
        "updatedTime": "2024-01-02T03:04:05Z",
        "lastMessageChannel": "WhatsApp360Dialog",
        "conversationChannels": ["whatsapp360dialog", "Instagram"],
        "userProfile": {
            "id": "u1",
            "firstName": "Ada",
            "lastName": "Lovelace",
            "phoneNumber": "+44 20 7946 0018",
            "email": "ada@example.com"
        },
        "lastMessage": {"messageContent": "hi"},
        "unreadMessageCount": 3
    });

    let conv = normalize_conversation(&raw).unwrap();
    assert_eq!(conv.id, "c1");
    assert_eq!(conv.contact_name, "Ada Lovelace");
    assert_eq!(conv.contact_id.as_deref(), Some("u1"));
    assert_eq!(conv.last_message_text, "hi");
    assert_eq!(
        conv.last_message_time,
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    );
    assert_eq!(conv.raw_channel_tags, vec!["whatsapp360dialog", "instagram"]);
    assert_eq!(conv.display_channel, DisplayChannel::Instagram);
    assert_eq!(conv.unread_count, 3);
    assert_eq!(conv.phone_number.as_deref(), Some("+44 20 7946 0018"));
    assert_eq!(conv.email.as_deref(), Some("ada@example.com"));
}

#[test]
fn test_group_name_and_string_last_message() {
    let raw = json!({
        "id": 42,
        "groupName": "Support",
        "lastMessage": "plain text",
        "updatedAt": 1_700_000_000
    });
    let conv = normalize_conversation(&raw).unwrap();
    assert_eq!(conv.id, "42");
    assert_eq!(conv.contact_name, "Support");
    assert_eq!(conv.last_message_text, "plain text");
    assert_eq!(conv.display_channel, DisplayChannel::WhatsApp);
    assert!(conv.phone_number.is_none());
}

#[test]
fn test_missing_id_is_malformed() {
    let err = normalize_conversation(&json!({"groupName": "x"})).unwrap_err();
    assert!(matches!(err, NormalizeError::MalformedRecord(_)));
}

#[test]
fn test_batch_skips_bad_records_and_sorts_descending() {
    let body = json!({
        "data": [
            record("old", 1_600_000_000, &["whatsapp"]),
            {"no": "id"},
            "garbage",
            record("new", 1_700_000_000, &["instagram"]),
            record("mid", 1_650_000_000, &["facebook"])
        ]
    });
    let ids: Vec<String> = normalize_conversations(&body, None)
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(ids, vec!["new", "mid", "old"]);
}

#[test]
fn test_unwrap_strategies() {
    let items = json!({"items": [record("a", 1, &[])]});
    let bare = json!([record("a", 1, &[])]);
    let neither = json!({"result": [record("a", 1, &[])]});
    assert_eq!(normalize_conversations(&items, None).len(), 1);
    assert_eq!(normalize_conversations(&bare, None).len(), 1);
    assert!(normalize_conversations(&neither, None).is_empty());
}

#[test]
fn test_duplicate_ids_keep_first() {
    let mut second = record("dup", 1_700_000_000, &["sms"]);
    second["lastMessage"] = json!({"messageContent": "second"});
    let body = json!([record("dup", 1_700_000_000, &["sms"]), second]);
    let out = normalize_conversations(&body, None);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].last_message_text, "hello from dup");
}

#[test]
fn test_channel_filter_applied() {
    let body = json!([
        record("ig", 3, &["instagram"]),
        record("ig-wa", 2, &["instagram", "whatsapp"]),
        record("wa", 1, &["whatsapp"])
    ]);
    let ids: Vec<String> = normalize_conversations(&body, Some("instagram"))
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(ids, vec!["ig"]);

    let ids: Vec<String> = normalize_conversations(&body, Some("whatsapp"))
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(ids, vec!["ig-wa", "wa"]);
}

#[test]
fn test_idempotent() {
    let body = json!([
        record("a", 1_700_000_000, &["whatsapp"]),
        record("b", 1_700_000_100, &["line"])
    ]);
    let first = serde_json::to_string(&normalize_conversations(&body, None)).unwrap();
    let second = serde_json::to_string(&normalize_conversations(&body, None)).unwrap();
    assert_eq!(first, second);
}
