pub mod config;
pub mod console;
pub mod credentials;
pub mod crm;
pub mod error;
pub mod lead_filter;
pub mod normalize;
pub mod poller;
pub mod probe;
pub mod reconcile;
pub mod send;
pub mod types;
pub mod upstream;
pub mod ws;

pub use config::Config;

use self::config::load_config;
use self::console::ConsoleState;
use self::credentials::{Credential, CredentialStore};
use self::crm::{callback_page, CrmConnector};
use self::error::{CrmError, ProbeError, SendError, UpstreamError};
use self::normalize::{normalize_conversations, normalize_messages};
use self::poller::PollFlags;
use self::types::{LeadSnapshot, SendRequest};
use self::upstream::{build_http_client, UpstreamClient};

use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub credentials: CredentialStore,
    pub upstream: UpstreamClient,
    pub crm: CrmConnector,
    pub console: Arc<Mutex<ConsoleState>>,
    pub poll_flags: PollFlags,
    pub ws_tx: broadcast::Sender<ws::WsEvent>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let http = build_http_client(config.messaging.request_timeout_seconds)?;
        let preloaded = config.messaging.api_key.as_deref().and_then(|key| {
            Credential::assumed(key, None, &config.messaging.default_base_url)
        });
        if let Some(cred) = preloaded.as_ref() {
            info!(base_url = %cred.base_url, "messaging key loaded from configuration");
        }
        let credentials = CredentialStore::new(preloaded);
        let (ws_tx, _) = broadcast::channel(100);

        Ok(Self {
            upstream: UpstreamClient::new(http.clone(), credentials.clone()),
            crm: CrmConnector::new(http, &config.crm),
            credentials,
            console: Arc::new(Mutex::new(ConsoleState::new())),
            poll_flags: PollFlags::default(),
            ws_tx,
            config,
        })
    }
}

/// JSON error body with the status it maps to.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: Value,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({"error": message.into()}),
        }
    }

    fn with(mut self, key: &str, value: Value) -> Self {
        if let Some(map) = self.body.as_object_mut() {
            map.insert(key.to_string(), value);
        }
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        let message = err.to_string();
        match err {
            UpstreamError::NotConnected | UpstreamError::Auth { .. } => {
                Self::new(StatusCode::UNAUTHORIZED, message)
            }
            UpstreamError::Status { status, .. } => {
                Self::new(StatusCode::BAD_GATEWAY, message).with("upstream_status", json!(status))
            }
            UpstreamError::Server { .. }
            | UpstreamError::Network { .. }
            | UpstreamError::Decode { .. } => Self::new(StatusCode::BAD_GATEWAY, message),
        }
    }
}

impl From<ProbeError> for ApiError {
    fn from(err: ProbeError) -> Self {
        let message = err.to_string();
        match err {
            ProbeError::MissingKey => Self::new(StatusCode::BAD_REQUEST, message),
            ProbeError::Auth { base_url, .. } => Self::new(StatusCode::UNAUTHORIZED, message)
                .with("endpoint_found", json!(true))
                .with("base_url", json!(base_url)),
            ProbeError::EndpointNotFound { tried, last_error } => {
                Self::new(StatusCode::BAD_GATEWAY, message)
                    .with("endpoint_found", json!(false))
                    .with("tried", json!(tried))
                    .with("last_error", json!(last_error))
            }
        }
    }
}

impl From<SendError> for ApiError {
    fn from(err: SendError) -> Self {
        match err {
            SendError::Empty => Self::new(StatusCode::BAD_REQUEST, SendError::Empty.to_string()),
            SendError::Upstream(inner) => inner.into(),
        }
    }
}

impl From<CrmError> for ApiError {
    fn from(err: CrmError) -> Self {
        let status = match err {
            CrmError::NotConfigured | CrmError::NotConnected => StatusCode::BAD_REQUEST,
            CrmError::Token(_) | CrmError::Status { .. } | CrmError::Http(_) => {
                StatusCode::BAD_GATEWAY
            }
        };
        Self::new(status, err.to_string())
    }
}

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChannelQuery {
    pub channel: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenConversationRequest {
    pub conversation_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChannelFilterRequest {
    pub channel: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CrmConnectRequest {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn create_app() -> anyhow::Result<(AppState, Router)> {
    let config = load_config();
    let state = AppState::new(config)?;
    poller::start_poller(state.clone());
    let app = build_router(state.clone());
    Ok((state, app))
}

pub fn build_router(state: AppState) -> Router {
    let messaging_routes = Router::new()
        .route("/api/messaging/connect", post(messaging_connect))
        .route("/api/messaging/auto-connect", post(messaging_auto_connect))
        .route("/api/messaging/conversations", get(list_conversations))
        .route(
            "/api/messaging/conversations/:id/messages",
            get(list_messages).post(send_message),
        );

    let console_routes = Router::new()
        .route("/api/console/open-conversation", put(open_conversation))
        .route("/api/console/channel-filter", put(set_channel_filter))
        .route("/api/console/conversations", get(console_conversations));

    let crm_routes = Router::new()
        .route("/api/crm/lead", post(crm_lead))
        .route("/api/crm/show-all", post(crm_show_all))
        .route("/api/crm/clear-lead", post(crm_clear_lead))
        .route("/api/crm/connect", post(crm_connect))
        .route("/api/crm/test", get(crm_test))
        .route("/callback", get(crm_callback));

    Router::new()
        .route("/api/health", get(health))
        .route("/api/status", get(status))
        .route("/ws", get(ws_handler))
        .merge(messaging_routes)
        .merge(console_routes)
        .merge(crm_routes)
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let messaging = match state.credentials.current() {
        Some(cred) => json!({
            "connected": true,
            "base_url": cred.base_url,
            "header_format": cred.header_format,
        }),
        None => json!({"connected": false, "base_url": null, "header_format": null}),
    };
    Json(json!({
        "messaging": messaging,
        "crm": state.crm.status(),
    }))
}

async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let rx = state.ws_tx.subscribe();
    ws.on_upgrade(move |socket| ws::handle_ws(socket, rx))
}

async fn messaging_connect(
    State(state): State<AppState>,
    Json(req): Json<ConnectRequest>,
) -> Result<Json<Value>, ApiError> {
    let api_key = req.api_key.unwrap_or_default();
    let found = probe::connect(
        state.upstream.http(),
        &state.config.messaging,
        &state.credentials,
        &api_key,
        req.base_url.as_deref(),
    )
    .await
    .map_err(|err| {
        warn!("connect failed: {err}");
        ApiError::from(err)
    })?;

    Ok(Json(json!({
        "connected": true,
        "base_url": found.base_url,
        "header_format": found.header_format,
        "sample": found.sample,
    })))
}

async fn messaging_auto_connect(
    State(state): State<AppState>,
    Json(req): Json<ConnectRequest>,
) -> Result<Json<Value>, ApiError> {
    let cred = Credential::assumed(
        req.api_key.as_deref().unwrap_or_default(),
        req.base_url.as_deref(),
        &state.config.messaging.default_base_url,
    )
    .ok_or_else(|| ApiError::from(ProbeError::MissingKey))?;

    info!(base_url = %cred.base_url, "messaging key stored without probing");
    let body = json!({
        "connected": true,
        "base_url": cred.base_url,
        "header_format": cred.header_format,
    });
    state.credentials.replace(cred);
    Ok(Json(body))
}

async fn list_conversations(
    State(state): State<AppState>,
    Query(query): Query<ChannelQuery>,
) -> Result<Json<Value>, ApiError> {
    let body = state
        .upstream
        .fetch_conversations(query.channel.as_deref())
        .await
        .map_err(|err| {
            error!("conversation fetch failed: {err}");
            ApiError::from(err)
        })?;
    let conversations = normalize_conversations(&body, query.channel.as_deref());
    state.console.lock().await.remember(&conversations);
    Ok(Json(json!({"conversations": conversations})))
}

async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let records = state
        .upstream
        .fetch_message_records(&id, &state.config.messaging)
        .await
        .map_err(|err| {
            error!(conversation_id = %id, "message fetch failed: {err}");
            ApiError::from(err)
        })?;
    let base_url = state.credentials.base_url();
    let messages = normalize_messages(&records, &id, base_url.as_deref());
    Ok(Json(json!({"messages": messages})))
}

async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SendRequest>,
) -> Result<Json<Value>, ApiError> {
    let conversation = state.console.lock().await.conversation(&id).cloned();
    let data = send::send_message(&state.upstream, &id, conversation.as_ref(), &req)
        .await
        .map_err(|err| {
            error!(conversation_id = %id, "send failed: {err}");
            ApiError::from(err)
        })?;
    Ok(Json(json!({"success": true, "data": data})))
}

async fn open_conversation(
    State(state): State<AppState>,
    Json(req): Json<OpenConversationRequest>,
) -> impl IntoResponse {
    let mut console = state.console.lock().await;
    console.open(req.conversation_id);
    Json(json!({"open_conversation": console.open_conversation()}))
}

async fn set_channel_filter(
    State(state): State<AppState>,
    Json(req): Json<ChannelFilterRequest>,
) -> impl IntoResponse {
    let mut console = state.console.lock().await;
    console.set_channel_filter(req.channel);
    Json(json!({"channel": console.channel_filter()}))
}

async fn console_conversations(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.console.lock().await.current_view())
}

fn publish_view(state: &AppState, view: lead_filter::FilteredView) -> Json<lead_filter::FilteredView> {
    let _ = state.ws_tx.send(ws::WsEvent::conversations(&view));
    Json(view)
}

async fn crm_lead(
    State(state): State<AppState>,
    Json(snapshot): Json<LeadSnapshot>,
) -> impl IntoResponse {
    let view = state.console.lock().await.set_lead(snapshot);
    publish_view(&state, view)
}

async fn crm_show_all(State(state): State<AppState>) -> impl IntoResponse {
    let view = state.console.lock().await.show_all();
    publish_view(&state, view)
}

async fn crm_clear_lead(State(state): State<AppState>) -> impl IntoResponse {
    let view = state.console.lock().await.clear_lead();
    publish_view(&state, view)
}

async fn crm_connect(
    State(state): State<AppState>,
    Json(req): Json<CrmConnectRequest>,
) -> Result<Json<Value>, ApiError> {
    let auth_url = state.crm.configure(
        req.client_id.as_deref().unwrap_or_default(),
        req.client_secret.as_deref().unwrap_or_default(),
        req.redirect_uri.as_deref(),
        req.region.as_deref(),
    )?;
    Ok(Json(json!({"success": true, "auth_url": auth_url})))
}

async fn crm_test(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let data = state.crm.probe().await.map_err(|err| {
        warn!("CRM probe failed: {err}");
        ApiError::from(err)
    })?;
    Ok(Json(json!({"success": true, "data": data})))
}

async fn crm_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if let Some(err) = query.error {
        warn!("CRM authorization denied: {err}");
        return Html(callback_page(Err(err))).into_response();
    }
    let Some(code) = query.code.filter(|c| !c.trim().is_empty()) else {
        return (StatusCode::BAD_REQUEST, "invalid callback parameters").into_response();
    };
    let outcome = state.crm.exchange_code(&code).await.map_err(|err| {
        error!("CRM code exchange failed: {err}");
        err.to_string()
    });
    Html(callback_page(outcome)).into_response()
}
