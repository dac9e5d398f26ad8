//! Discovery of the (base URL, auth header) pair a messaging deployment accepts.
//!
//! The upstream is multi-region and its documentation disagrees on the header
//! name, so a connect walks every candidate region with both header formats
//! and keeps the first combination that answers 2xx. A 401/403 ends the walk:
//! the region is right and the key is wrong.

use crate::config::{trim_base_url, MessagingConfig};
use crate::credentials::{Credential, CredentialStore, HeaderFormat};
use crate::error::{ProbeError, UpstreamError};
use crate::upstream::{send_with_format, UpstreamRequest};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct ProbeSuccess {
    pub base_url: String,
    pub header_format: HeaderFormat,
    pub sample: Value,
}

/// Caller-supplied URL first, then the regional list, without duplicates.
pub fn candidate_base_urls(preferred: Option<&str>, regional: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let preferred = preferred.map(trim_base_url).filter(|u| !u.is_empty());
    for url in preferred
        .into_iter()
        .chain(regional.iter().map(|u| trim_base_url(u)))
    {
        if !url.is_empty() && !out.contains(&url) {
            out.push(url);
        }
    }
    out
}

pub async fn probe(
    http: &Client,
    cfg: &MessagingConfig,
    api_key: &str,
    preferred_base_url: Option<&str>,
) -> Result<ProbeSuccess, ProbeError> {
    let api_key = api_key.trim();
    if api_key.is_empty() {
        return Err(ProbeError::MissingKey);
    }

    let candidates = candidate_base_urls(preferred_base_url, &cfg.regional_base_urls);
    let req = UpstreamRequest::get(&cfg.probe_path)
        .param("limit", 1)
        .param("offset", 0);
    let mut last_error = None;

    info!(
        key_len = api_key.len(),
        candidates = candidates.len(),
        "probing messaging endpoints"
    );

    for base_url in &candidates {
        for format in HeaderFormat::TRIAL_ORDER {
            match send_with_format(http, base_url, api_key, format, &req).await {
                Ok(sample) => {
                    info!(%base_url, header = format.header_name(), "probe succeeded");
                    return Ok(ProbeSuccess {
                        base_url: base_url.clone(),
                        header_format: format,
                        sample,
                    });
                }
                Err(UpstreamError::Auth { status, body, .. }) => {
                    warn!(%base_url, status, "endpoint reachable but key rejected");
                    return Err(ProbeError::Auth {
                        base_url: base_url.clone(),
                        status,
                        body,
                    });
                }
                Err(err) => {
                    warn!(%base_url, header = format.header_name(), "probe attempt failed: {err}");
                    last_error = Some(err.to_string());
                }
            }
        }
    }

    Err(ProbeError::EndpointNotFound {
        tried: candidates,
        last_error,
    })
}

/// Probes and, only on success, swaps the whole credential in one write.
pub async fn connect(
    http: &Client,
    cfg: &MessagingConfig,
    store: &CredentialStore,
    api_key: &str,
    preferred_base_url: Option<&str>,
) -> Result<ProbeSuccess, ProbeError> {
    let found = probe(http, cfg, api_key, preferred_base_url).await?;
    store.replace(Credential {
        api_key: api_key.trim().to_string(),
        base_url: found.base_url.clone(),
        header_format: found.header_format,
    });
    Ok(found)
}
