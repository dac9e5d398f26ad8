use crate::error::SendError;
use crate::normalize::DisplayChannel;
use crate::types::{Conversation, SendRequest};
use crate::upstream::UpstreamClient;
use serde_json::{json, Map, Value};
use tracing::info;

/// Payload field that names the recipient on each channel, and whether it
/// carries a phone number rather than a contact id.
fn recipient_field(channel: &DisplayChannel) -> Option<(&'static str, bool)> {
    match channel {
        DisplayChannel::WhatsApp | DisplayChannel::Sms => Some(("to", true)),
        DisplayChannel::Facebook => Some(("facebookReceiverId", false)),
        DisplayChannel::Instagram => Some(("instagramReceiverId", false)),
        DisplayChannel::Line => Some(("lineReceiverId", false)),
        DisplayChannel::WeChat => Some(("weChatReceiverOpenId", false)),
        DisplayChannel::Web => Some(("webClientSenderId", false)),
        DisplayChannel::Unknown(_) => None,
    }
}

pub fn build_send_payload(
    conversation_id: &str,
    conversation: Option<&Conversation>,
    request: &SendRequest,
) -> Result<Value, SendError> {
    let text = request
        .text
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    let files: Vec<&str> = request
        .files
        .iter()
        .map(|f| f.url.trim())
        .filter(|url| !url.is_empty())
        .collect();
    if text.is_empty() && files.is_empty() {
        return Err(SendError::Empty);
    }

    let mut payload = Map::new();
    payload.insert("conversationId".into(), json!(conversation_id));
    payload.insert(
        "messageType".into(),
        json!(if files.is_empty() { "text" } else { "file" }),
    );
    payload.insert("messageContent".into(), json!(text));
    if !files.is_empty() {
        payload.insert("fileURLs".into(), json!(files));
    }

    if let Some(conv) = conversation {
        payload.insert("channel".into(), json!(conv.display_channel.wire_name()));
        if let Some((field, by_phone)) = recipient_field(&conv.display_channel) {
            let recipient = if by_phone {
                conv.phone_number.clone()
            } else {
                Some(conv.contact_id.clone().unwrap_or_else(|| conv.id.clone()))
            };
            if let Some(recipient) = recipient {
                payload.insert(field.into(), json!(recipient));
            }
        }
    }

    Ok(Value::Object(payload))
}

pub async fn send_message(
    client: &UpstreamClient,
    conversation_id: &str,
    conversation: Option<&Conversation>,
    request: &SendRequest,
) -> Result<Value, SendError> {
    let payload = build_send_payload(conversation_id, conversation, request)?;
    info!(
        conversation_id,
        message_type = %payload["messageType"],
        "sending message"
    );
    Ok(client.send_message(&payload).await?)
}
