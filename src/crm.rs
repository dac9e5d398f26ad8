//! OAuth connection to the CRM and the authenticated probe used to test it.

use crate::config::CrmConfig;
use crate::error::CrmError;
use chrono::{DateTime, Duration, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

const DEFAULT_EXPIRES_IN: i64 = 3600;
const EXPIRY_MARGIN_SECONDS: i64 = 300;
const MAX_EXPIRES_IN: i64 = 365 * 24 * 3600;

const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrmEndpoints {
    pub accounts_url: String,
    pub api_url: String,
}

impl CrmEndpoints {
    /// Unknown regions fall back to `com`.
    pub fn for_region(region: &str) -> Self {
        let tld = match region.trim() {
            "eu" => "eu",
            "in" => "in",
            "com.au" => "com.au",
            "com.cn" => "com.cn",
            _ => "com",
        };
        Self {
            accounts_url: format!("https://accounts.zoho.{tld}"),
            api_url: format!("https://www.zohoapis.{tld}"),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct CrmTokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for CrmTokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrmTokenSet")
            .field("access_token", &format_args!("<{} chars>", self.access_token.len()))
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Clone)]
pub struct CrmCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub region: String,
    pub tokens: Option<CrmTokenSet>,
}

impl fmt::Debug for CrmCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrmCredentials")
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("region", &self.region)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CrmStatus {
    pub connected: bool,
    pub region: String,
    pub has_access_token: bool,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
}

pub fn authorize_url(accounts_url: &str, creds: &CrmCredentials, scopes: &str) -> String {
    format!(
        "{}/oauth/v2/auth?scope={}&client_id={}&response_type=code&access_type=offline&redirect_uri={}&state=crm",
        accounts_url.trim_end_matches('/'),
        utf8_percent_encode(scopes, QUERY_COMPONENT),
        utf8_percent_encode(&creds.client_id, QUERY_COMPONENT),
        utf8_percent_encode(&creds.redirect_uri, QUERY_COMPONENT),
    )
}

fn token_set(resp: TokenResponse, previous_refresh: Option<String>) -> Result<CrmTokenSet, CrmError> {
    let access_token = match (resp.access_token, resp.error) {
        (Some(token), _) if !token.is_empty() => token,
        (_, Some(err)) => return Err(CrmError::Token(err)),
        _ => return Err(CrmError::Token("response carried no access_token".to_string())),
    };
    Ok(CrmTokenSet {
        access_token,
        refresh_token: resp.refresh_token.or(previous_refresh),
        expires_at: expiry_after(resp.expires_in, Utc::now()),
    })
}

/// Lifetimes outside `0..=MAX_EXPIRES_IN` are clamped before the margin is taken.
fn expiry_after(expires_in: Option<i64>, now: DateTime<Utc>) -> DateTime<Utc> {
    let lifetime = |secs: i64| {
        Duration::try_seconds(secs.saturating_sub(EXPIRY_MARGIN_SECONDS))
            .and_then(|d| now.checked_add_signed(d))
    };
    expires_in
        .map(|secs| secs.clamp(0, MAX_EXPIRES_IN))
        .and_then(lifetime)
        .or_else(|| lifetime(DEFAULT_EXPIRES_IN))
        .unwrap_or(now)
}

#[derive(Debug, Clone)]
pub struct CrmConnector {
    http: Client,
    scopes: String,
    default_redirect_uri: String,
    default_region: String,
    endpoints: Option<CrmEndpoints>,
    inner: Arc<RwLock<Option<CrmCredentials>>>,
}

impl CrmConnector {
    pub fn new(http: Client, cfg: &CrmConfig) -> Self {
        let preloaded = match (cfg.client_id.clone(), cfg.client_secret.clone()) {
            (Some(client_id), Some(client_secret)) => Some(CrmCredentials {
                client_id,
                client_secret,
                redirect_uri: cfg.redirect_uri.clone(),
                region: cfg.region.clone(),
                tokens: None,
            }),
            _ => None,
        };
        Self {
            http,
            scopes: cfg.scopes.clone(),
            default_redirect_uri: cfg.redirect_uri.clone(),
            default_region: cfg.region.clone(),
            endpoints: None,
            inner: Arc::new(RwLock::new(preloaded)),
        }
    }

    /// Pins the accounts and API hosts regardless of region.
    pub fn with_endpoints(mut self, endpoints: CrmEndpoints) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    fn endpoints(&self, region: &str) -> CrmEndpoints {
        self.endpoints
            .clone()
            .unwrap_or_else(|| CrmEndpoints::for_region(region))
    }

    pub fn credentials(&self) -> Option<CrmCredentials> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn store(&self, creds: Option<CrmCredentials>) {
        *self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = creds;
    }

    fn store_tokens(&self, mut creds: CrmCredentials, tokens: Option<CrmTokenSet>) {
        creds.tokens = tokens;
        self.store(Some(creds));
    }

    pub fn status(&self) -> CrmStatus {
        match self.credentials() {
            Some(creds) => CrmStatus {
                connected: creds.tokens.is_some(),
                has_access_token: creds.tokens.is_some(),
                region: creds.region,
            },
            None => CrmStatus {
                connected: false,
                region: self.default_region.clone(),
                has_access_token: false,
            },
        }
    }

    /// Replaces the client credentials (dropping any tokens) and returns the
    /// authorization URL the user has to visit.
    pub fn configure(
        &self,
        client_id: &str,
        client_secret: &str,
        redirect_uri: Option<&str>,
        region: Option<&str>,
    ) -> Result<String, CrmError> {
        let (client_id, client_secret) = (client_id.trim(), client_secret.trim());
        if client_id.is_empty() || client_secret.is_empty() {
            return Err(CrmError::NotConfigured);
        }
        let pick = |value: Option<&str>, fallback: &str| {
            value
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .unwrap_or(fallback)
                .to_string()
        };
        let creds = CrmCredentials {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            redirect_uri: pick(redirect_uri, &self.default_redirect_uri),
            region: pick(region, &self.default_region),
            tokens: None,
        };
        let url = authorize_url(&self.endpoints(&creds.region).accounts_url, &creds, &self.scopes);
        info!(region = %creds.region, "CRM client configured");
        self.store(Some(creds));
        Ok(url)
    }

    async fn token_request(
        &self,
        creds: &CrmCredentials,
        params: &[(&str, &str)],
    ) -> Result<TokenResponse, CrmError> {
        let url = format!("{}/oauth/v2/token", self.endpoints(&creds.region).accounts_url);
        let mut query = vec![
            ("client_id", creds.client_id.as_str()),
            ("client_secret", creds.client_secret.as_str()),
        ];
        query.extend_from_slice(params);

        let resp = self.http.post(&url).query(&query).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CrmError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json::<TokenResponse>().await?)
    }

    pub async fn exchange_code(&self, code: &str) -> Result<(), CrmError> {
        let creds = self.credentials().ok_or(CrmError::NotConfigured)?;
        let resp = self
            .token_request(
                &creds,
                &[
                    ("grant_type", "authorization_code"),
                    ("redirect_uri", creds.redirect_uri.as_str()),
                    ("code", code.trim()),
                ],
            )
            .await?;
        let tokens = token_set(resp, None)?;
        info!(
            token_len = tokens.access_token.len(),
            has_refresh = tokens.refresh_token.is_some(),
            "CRM authorization code exchanged"
        );
        self.store_tokens(creds, Some(tokens));
        Ok(())
    }

    pub async fn refresh(&self) -> Result<(), CrmError> {
        let creds = self.credentials().ok_or(CrmError::NotConfigured)?;
        let refresh_token = creds
            .tokens
            .as_ref()
            .and_then(|t| t.refresh_token.clone())
            .ok_or(CrmError::NotConnected)?;
        let resp = self
            .token_request(
                &creds,
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token.as_str()),
                ],
            )
            .await?;
        let tokens = token_set(resp, Some(refresh_token))?;
        info!(token_len = tokens.access_token.len(), "CRM access token refreshed");
        self.store_tokens(creds, Some(tokens));
        Ok(())
    }

    pub fn disconnect(&self) {
        if let Some(creds) = self.credentials() {
            self.store_tokens(creds, None);
        }
    }

    async fn get_users(&self, creds: &CrmCredentials, token: &str) -> Result<(StatusCode, Value), CrmError> {
        let url = format!("{}/crm/v3/users", self.endpoints(&creds.region).api_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("type", "AllUsers")])
            .header("Authorization", format!("Zoho-oauthtoken {token}"))
            .send()
            .await?;
        let status = resp.status();
        let body = resp.json::<Value>().await.unwrap_or(Value::Null);
        Ok((status, body))
    }

    /// Lightweight authenticated read. A 401 triggers one refresh and retry;
    /// a failed refresh leaves the CRM disconnected.
    pub async fn probe(&self) -> Result<Value, CrmError> {
        let creds = self.credentials().ok_or(CrmError::NotConnected)?;
        let tokens = creds.tokens.clone().ok_or(CrmError::NotConnected)?;

        let (status, body) = self.get_users(&creds, &tokens.access_token).await?;
        if status.is_success() {
            return Ok(body);
        }
        if status != StatusCode::UNAUTHORIZED || tokens.refresh_token.is_none() {
            return Err(CrmError::Status {
                status: status.as_u16(),
                body: body.to_string(),
            });
        }

        if let Err(err) = self.refresh().await {
            warn!("CRM token refresh failed, disconnecting: {err}");
            self.disconnect();
            return Err(err);
        }

        let creds = self.credentials().ok_or(CrmError::NotConnected)?;
        let token = creds
            .tokens
            .as_ref()
            .map(|t| t.access_token.clone())
            .ok_or(CrmError::NotConnected)?;
        let (status, body) = self.get_users(&creds, &token).await?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(CrmError::Status {
                status: status.as_u16(),
                body: body.to_string(),
            })
        }
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Page served on the OAuth redirect; it reports back to the opener window.
pub fn callback_page(outcome: Result<(), String>) -> String {
    let (title, heading, detail, message) = match outcome {
        Ok(()) => (
            "CRM connected",
            "Connection successful",
            "Your CRM account is connected. This window will close.".to_string(),
            serde_json::json!({"type": "crm_callback_success"}),
        ),
        Err(err) => (
            "CRM connection failed",
            "OAuth error",
            escape_html(&err),
            serde_json::json!({"type": "crm_callback_error", "error": err}),
        ),
    };
    let script_message = message.to_string().replace("</", "<\\/");
    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>{title}</title></head>\n<body>\n<h1>{heading}</h1>\n<p>{detail}</p>\n<script>\nif (window.opener) {{\n  window.opener.postMessage({script_message}, '*');\n  setTimeout(function () {{ window.close(); }}, 2000);\n}} else {{\n  window.location.href = '/';\n}}\n</script>\n</body>\n</html>\n"
    )
}
