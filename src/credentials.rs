use crate::config::trim_base_url;
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, RwLock};

pub const API_KEY_HEADER: &str = "X-Sleekflow-Api-Key";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderFormat {
    KeyHeader,
    BearerHeader,
}

impl HeaderFormat {
    pub const TRIAL_ORDER: [HeaderFormat; 2] = [HeaderFormat::KeyHeader, HeaderFormat::BearerHeader];

    pub fn other(self) -> Self {
        match self {
            Self::KeyHeader => Self::BearerHeader,
            Self::BearerHeader => Self::KeyHeader,
        }
    }

    pub fn header_name(self) -> &'static str {
        match self {
            Self::KeyHeader => API_KEY_HEADER,
            Self::BearerHeader => "Authorization",
        }
    }

    pub fn apply(self, req: RequestBuilder, api_key: &str) -> RequestBuilder {
        match self {
            Self::KeyHeader => req.header(API_KEY_HEADER, api_key),
            Self::BearerHeader => req.bearer_auth(api_key),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub api_key: String,
    pub base_url: String,
    pub header_format: HeaderFormat,
}

impl Credential {
    /// A credential taken on trust, without probing: key-header format and the
    /// given (or default) base URL.
    pub fn assumed(api_key: &str, base_url: Option<&str>, default_base_url: &str) -> Option<Self> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return None;
        }
        let base_url = base_url
            .map(trim_base_url)
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| trim_base_url(default_base_url));
        Some(Self {
            api_key: api_key.to_string(),
            base_url,
            header_format: HeaderFormat::KeyHeader,
        })
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("api_key", &format_args!("<{} chars>", self.api_key.len()))
            .field("base_url", &self.base_url)
            .field("header_format", &self.header_format)
            .finish()
    }
}

/// The single active messaging credential. Writers always swap the whole record.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    inner: Arc<RwLock<Option<Credential>>>,
}

impl CredentialStore {
    pub fn new(initial: Option<Credential>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    pub fn current(&self) -> Option<Credential> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn replace(&self, credential: Credential) {
        *self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(credential);
    }

    pub fn clear(&self) {
        *self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }

    pub fn is_connected(&self) -> bool {
        self.current().is_some()
    }

    pub fn base_url(&self) -> Option<String> {
        self.current().map(|c| c.base_url)
    }
}
