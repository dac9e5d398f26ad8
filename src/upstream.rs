use crate::config::MessagingConfig;
use crate::credentials::{CredentialStore, HeaderFormat};
use crate::error::UpstreamError;
use crate::normalize::payload::{extract_records, MESSAGE_UNWRAP};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

pub const CONVERSATIONS_PATH: &str = "/api/conversation/all";
pub const SEND_PATH: &str = "/api/message/send";

const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'?')
    .add(b'<')
    .add(b'>');

pub fn messages_path(conversation_id: &str) -> String {
    format!(
        "/api/conversation/message/{}",
        utf8_percent_encode(conversation_id, PATH_SEGMENT)
    )
}

pub fn build_http_client(timeout_seconds: u64) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_seconds.max(1)))
        .build()
}

#[derive(Debug, Clone)]
pub struct UpstreamRequest<'a> {
    pub method: Method,
    pub path: &'a str,
    pub params: Vec<(&'a str, String)>,
    pub body: Option<&'a Value>,
}

impl<'a> UpstreamRequest<'a> {
    pub fn get(path: &'a str) -> Self {
        Self {
            method: Method::GET,
            path,
            params: Vec::new(),
            body: None,
        }
    }

    pub fn post(path: &'a str, body: &'a Value) -> Self {
        Self {
            method: Method::POST,
            path,
            params: Vec::new(),
            body: Some(body),
        }
    }

    pub fn param(mut self, key: &'a str, value: impl ToString) -> Self {
        self.params.push((key, value.to_string()));
        self
    }
}

/// One attempt against one base URL with one header format. Shared with the prober.
pub async fn send_with_format(
    http: &Client,
    base_url: &str,
    api_key: &str,
    format: HeaderFormat,
    req: &UpstreamRequest<'_>,
) -> Result<Value, UpstreamError> {
    let url = format!("{}{}", base_url.trim_end_matches('/'), req.path);
    debug!(
        method = %req.method,
        %url,
        header = format.header_name(),
        "upstream call"
    );

    let mut builder = http.request(req.method.clone(), &url);
    if !req.params.is_empty() {
        builder = builder.query(&req.params);
    }
    if let Some(body) = req.body {
        builder = builder.json(body);
    }
    builder = format.apply(builder, api_key);

    let resp = builder.send().await.map_err(|source| UpstreamError::Network {
        url: url.clone(),
        source,
    })?;

    let status = resp.status();
    if status.is_success() {
        let bytes = resp.bytes().await.map_err(|source| UpstreamError::Network {
            url: url.clone(),
            source,
        })?;
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Value::Null);
        }
        return serde_json::from_slice(&bytes).map_err(|err| UpstreamError::Decode {
            url,
            message: err.to_string(),
        });
    }

    let code = status.as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(match code {
        401 | 403 => UpstreamError::Auth {
            status: code,
            url,
            body,
        },
        500..=599 => UpstreamError::Server {
            status: code,
            url,
            body,
        },
        _ => UpstreamError::Status {
            status: code,
            url,
            body,
        },
    })
}

/// Authenticated access to the messaging API using the discovered credential.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: Client,
    store: CredentialStore,
}

impl UpstreamClient {
    pub fn new(http: Client, store: CredentialStore) -> Self {
        Self { http, store }
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Uses the discovered header format; a transient failure gets exactly one
    /// retry with the other format. Auth rejections are conclusive.
    pub async fn call(&self, req: &UpstreamRequest<'_>) -> Result<Value, UpstreamError> {
        let credential = self.store.current().ok_or(UpstreamError::NotConnected)?;
        let primary = credential.header_format;

        match send_with_format(
            &self.http,
            &credential.base_url,
            &credential.api_key,
            primary,
            req,
        )
        .await
        {
            Err(err) if err.is_transient() => {
                warn!(
                    path = req.path,
                    "{} failed ({err}), retrying with {}",
                    primary.header_name(),
                    primary.other().header_name()
                );
                send_with_format(
                    &self.http,
                    &credential.base_url,
                    &credential.api_key,
                    primary.other(),
                    req,
                )
                .await
            }
            result => result,
        }
    }

    pub async fn fetch_conversations(&self, channel: Option<&str>) -> Result<Value, UpstreamError> {
        let mut req = UpstreamRequest::get(CONVERSATIONS_PATH)
            .param("limit", 100)
            .param("offset", 0);
        if let Some(channel) = channel.map(str::trim).filter(|c| !c.is_empty()) {
            req = req.param("channel", channel);
        }
        self.call(&req).await
    }

    /// Walks offsets until a short or empty page; the upstream silently caps
    /// single responses.
    pub async fn fetch_message_records(
        &self,
        conversation_id: &str,
        cfg: &MessagingConfig,
    ) -> Result<Vec<Value>, UpstreamError> {
        let path = messages_path(conversation_id);
        let page_size = cfg.page_size.max(1);
        let mut records = Vec::new();

        for page in 0..cfg.max_pages.max(1) {
            let req = UpstreamRequest::get(&path)
                .param("limit", page_size)
                .param("offset", page * page_size);
            let body = self.call(&req).await?;
            let batch = extract_records(&body, MESSAGE_UNWRAP);
            let fetched = batch.len();
            records.extend(batch);
            if fetched < page_size {
                return Ok(records);
            }
        }

        warn!(
            conversation_id,
            pages = cfg.max_pages,
            "message pagination stopped at page limit"
        );
        Ok(records)
    }

    pub async fn send_message(&self, payload: &Value) -> Result<Value, UpstreamError> {
        self.call(&UpstreamRequest::post(SEND_PATH, payload)).await
    }
}
