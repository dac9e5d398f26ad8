use convo_console::config::{Config, PollingConfig};
use convo_console::credentials::{Credential, HeaderFormat};
use convo_console::poller::{refresh_conversations, refresh_messages, tick, BusyGuard};
use convo_console::ws::{CONVERSATIONS_EVENT, MESSAGES_EVENT};
use convo_console::AppState;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn connected_state(server: &MockServer) -> AppState {
    let mut cfg = Config::default();
    cfg.polling = PollingConfig {
        enabled: false,
        interval_seconds: 5,
    };
    cfg.messaging.request_timeout_seconds = 5;
    let state = AppState::new(cfg).unwrap();
    state.credentials.replace(Credential {
        api_key: "key-1".to_string(),
        base_url: server.uri(),
        header_format: HeaderFormat::KeyHeader,
    });
    state
}

fn conversation_list() -> serde_json::Value {
    json!({"data": [
        {"conversationId": "c1", "updatedTime": 1_700_000_100, "userProfile": {"firstName": "Ada"}},
        {"conversationId": "c2", "updatedTime": 1_700_000_000, "userProfile": {"firstName": "Bob"}}
    ]})
}

async fn wait_idle(flag: &Arc<AtomicBool>) {
    for _ in 0..200 {
        if !flag.load(Ordering::Acquire) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("refresh never finished");
}

#[tokio::test]
async fn test_unchanged_list_broadcasts_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/conversation/all"))
        .respond_with(ResponseTemplate::new(200).set_body_json(conversation_list()))
        .expect(2)
        .mount(&server)
        .await;

    let state = connected_state(&server);
    let mut rx = state.ws_tx.subscribe();

    refresh_conversations(&state).await.unwrap();
    let event = rx.try_recv().unwrap();
    assert_eq!(event.event, CONVERSATIONS_EVENT);
    assert_eq!(event.payload["conversations"][0]["id"], "c1");

    refresh_conversations(&state).await.unwrap();
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_failed_tick_is_silent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let state = connected_state(&server);
    state.console.lock().await.open(Some("c1".to_string()));
    let mut rx = state.ws_tx.subscribe();

    tick(&state);
    wait_idle(&state.poll_flags.conversations).await;
    wait_idle(&state.poll_flags.messages).await;

    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    assert!(!server.received_requests().await.unwrap().is_empty());

    // The next tick runs normally once the failing one is done.
    assert!(BusyGuard::try_acquire(&state.poll_flags.conversations).is_some());
}

#[tokio::test]
async fn test_tick_skipped_while_refresh_in_flight() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/conversation/all"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(conversation_list())
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let state = connected_state(&server);
    let mut rx = state.ws_tx.subscribe();

    tick(&state);
    tick(&state);
    tick(&state);
    wait_idle(&state.poll_flags.conversations).await;

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(rx.try_recv().unwrap().event, CONVERSATIONS_EVENT);
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_tick_without_connection_does_nothing() {
    let server = MockServer::start().await;
    let state = connected_state(&server);
    state.credentials.clear();

    tick(&state);
    assert!(!state.poll_flags.conversations.load(Ordering::Acquire));
    assert!(!state.poll_flags.messages.load(Ordering::Acquire));
}

#[tokio::test]
async fn test_messages_for_closed_conversation_discarded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/conversation/message/c1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"id": "m1", "text": "hi", "timestamp": 100}]))
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let state = connected_state(&server);
    state.console.lock().await.open(Some("c1".to_string()));
    let mut rx = state.ws_tx.subscribe();

    let switch = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        state.console.lock().await.open(Some("c2".to_string()));
    };
    let (result, _) = tokio::join!(refresh_messages(&state), switch);
    result.unwrap();

    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_open_conversation_messages_broadcast() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/conversation/message/c1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"id": "m1", "text": "hi", "timestamp": 100}])),
        )
        .mount(&server)
        .await;

    let state = connected_state(&server);
    state.console.lock().await.open(Some("c1".to_string()));
    let mut rx = state.ws_tx.subscribe();

    refresh_messages(&state).await.unwrap();
    let event = rx.try_recv().unwrap();
    assert_eq!(event.event, MESSAGES_EVENT);
    assert_eq!(event.payload["mode"], "replace");
    assert_eq!(event.payload["messages"][0]["id"], "m1");

    refresh_messages(&state).await.unwrap();
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_list_fetched_under_old_channel_filter_discarded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/conversation/all"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(conversation_list())
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;

    let state = connected_state(&server);
    let mut rx = state.ws_tx.subscribe();

    let switch = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        state
            .console
            .lock()
            .await
            .set_channel_filter(Some("instagram".to_string()));
    };
    let (result, _) = tokio::join!(refresh_conversations(&state), switch);
    result.unwrap();

    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    assert!(state.console.lock().await.current_view().conversations.is_empty());
}
