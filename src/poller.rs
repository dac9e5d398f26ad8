use crate::error::UpstreamError;
use crate::normalize::{normalize_conversations, normalize_messages};
use crate::ws::WsEvent;
use crate::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// One in-flight marker per polled resource.
#[derive(Debug, Clone, Default)]
pub struct PollFlags {
    pub conversations: Arc<AtomicBool>,
    pub messages: Arc<AtomicBool>,
}

/// Clears the busy flag when the refresh finishes, however it finishes.
pub struct BusyGuard {
    flag: Arc<AtomicBool>,
}

impl BusyGuard {
    pub fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Fetches the conversation list and broadcasts it when the visible list changed.
pub async fn refresh_conversations(state: &AppState) -> Result<(), UpstreamError> {
    let filter = state.console.lock().await.channel_filter().map(str::to_string);
    let body = state.upstream.fetch_conversations(filter.as_deref()).await?;
    let conversations = normalize_conversations(&body, filter.as_deref());

    let view = {
        let mut console = state.console.lock().await;
        if console.channel_filter() != filter.as_deref() {
            debug!("channel filter changed during fetch, list discarded");
            return Ok(());
        }
        console.ingest_conversations(conversations)
    };
    if let Some(view) = view {
        debug!(count = view.conversations.len(), "conversation list changed");
        let _ = state.ws_tx.send(WsEvent::conversations(&view));
    }
    Ok(())
}

pub async fn refresh_messages(state: &AppState) -> Result<(), UpstreamError> {
    let Some(conversation_id) = state.console.lock().await.open_conversation().map(str::to_string) else {
        return Ok(());
    };
    let records = state
        .upstream
        .fetch_message_records(&conversation_id, &state.config.messaging)
        .await?;
    let base_url = state.credentials.base_url();
    let messages = normalize_messages(&records, &conversation_id, base_url.as_deref());

    let delta = state
        .console
        .lock()
        .await
        .ingest_messages(&conversation_id, &messages);
    if let Some(event) = delta
        .as_ref()
        .and_then(|delta| WsEvent::messages(&conversation_id, delta))
    {
        debug!(%conversation_id, "message list changed");
        let _ = state.ws_tx.send(event);
    }
    Ok(())
}

/// Spawns one refresh per resource unless the previous one is still running.
pub fn tick(state: &AppState) {
    if !state.credentials.is_connected() {
        return;
    }

    match BusyGuard::try_acquire(&state.poll_flags.conversations) {
        Some(guard) => {
            let state = state.clone();
            tokio::spawn(async move {
                let _guard = guard;
                if let Err(err) = refresh_conversations(&state).await {
                    warn!("background conversation refresh failed: {err}");
                }
            });
        }
        None => debug!("conversation refresh still running, tick skipped"),
    }

    match BusyGuard::try_acquire(&state.poll_flags.messages) {
        Some(guard) => {
            let state = state.clone();
            tokio::spawn(async move {
                let _guard = guard;
                if let Err(err) = refresh_messages(&state).await {
                    warn!("background message refresh failed: {err}");
                }
            });
        }
        None => debug!("message refresh still running, tick skipped"),
    }
}

pub fn start_poller(state: AppState) -> Option<JoinHandle<()>> {
    if !state.config.polling.enabled {
        info!("polling disabled");
        return None;
    }
    let period = Duration::from_secs(state.config.polling.interval_seconds.max(1));
    info!(seconds = period.as_secs(), "starting poller");

    Some(tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            tick(&state);
        }
    }))
}
