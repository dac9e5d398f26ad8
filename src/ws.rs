use crate::lead_filter::FilteredView;
use crate::reconcile::MessageDelta;
use axum::extract::ws::{Message, WebSocket};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

pub const CONVERSATIONS_EVENT: &str = "conversations";
pub const MESSAGES_EVENT: &str = "messages";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsEvent {
    pub event: String,
    pub payload: serde_json::Value,
}

impl WsEvent {
    pub fn conversations(view: &FilteredView) -> Self {
        Self {
            event: CONVERSATIONS_EVENT.to_string(),
            payload: json!({
                "state": view.state,
                "total": view.total,
                "conversations": view.conversations,
            }),
        }
    }

    /// `None` when the delta renders nothing.
    pub fn messages(conversation_id: &str, delta: &MessageDelta) -> Option<Self> {
        let mode = delta.mode()?;
        Some(Self {
            event: MESSAGES_EVENT.to_string(),
            payload: json!({
                "conversation_id": conversation_id,
                "mode": mode,
                "scroll": delta.scroll(),
                "messages": delta.messages(),
            }),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsCommand {
    #[serde(rename = "subscribe")]
    Subscribe { events: Option<Vec<String>> },
    #[serde(rename = "ping")]
    Ping,
}

fn encode(event: &WsEvent) -> String {
    serde_json::to_string(event).unwrap_or_default()
}

pub async fn handle_ws(mut socket: WebSocket, mut rx: broadcast::Receiver<WsEvent>) {
    let client_id = Uuid::new_v4();
    let mut subscriptions: Option<HashSet<String>> = None;
    debug!(%client_id, "console socket connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let text = match msg {
                    None | Some(Ok(Message::Close(_))) | Some(Err(_)) => break,
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(_)) => continue,
                };
                match serde_json::from_str::<WsCommand>(&text) {
                    Ok(WsCommand::Subscribe { events }) => {
                        subscriptions = events.map(|items| items.into_iter().collect());
                    }
                    Ok(WsCommand::Ping) => {
                        let health = WsEvent {
                            event: "health".to_string(),
                            payload: json!({"status": "ok"}),
                        };
                        if socket.send(Message::Text(encode(&health))).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => debug!(%client_id, "ignoring socket command: {err}"),
                }
            }
            evt = rx.recv() => {
                match evt {
                    Ok(evt) => {
                        if let Some(subs) = subscriptions.as_ref() {
                            if !subs.contains(&evt.event) {
                                continue;
                            }
                        }
                        if socket.send(Message::Text(encode(&evt))).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(%client_id, skipped, "console socket lagging, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    debug!(%client_id, "console socket closed");
}
