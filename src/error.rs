use thiserror::Error;

/// Failure of a single call to the messaging API.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("messaging API is not connected")]
    NotConnected,

    /// 401/403: the endpoint is reachable but rejected the key.
    #[error("API key rejected by {url} (status {status})")]
    Auth {
        status: u16,
        url: String,
        body: String,
    },

    #[error("upstream server error {status} at {url}")]
    Server {
        status: u16,
        url: String,
        body: String,
    },

    #[error("upstream returned {status} at {url}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    #[error("network error reaching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("undecodable upstream payload from {url}: {message}")]
    Decode { url: String, message: String },
}

impl UpstreamError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Auth { status, .. } | Self::Server { status, .. } | Self::Status { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    /// 5xx and transport failures warrant trying the other header format.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Server { .. } | Self::Network { .. })
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("API key is empty")]
    MissingKey,

    /// The region answered but refused the key; remaining base URLs were not tried.
    #[error("endpoint {base_url} is reachable but rejected the API key (status {status})")]
    Auth {
        base_url: String,
        status: u16,
        body: String,
    },

    #[error("no messaging endpoint accepted the key (tried {})", .tried.join(", "))]
    EndpointNotFound {
        tried: Vec<String>,
        last_error: Option<String>,
    },
}

/// A single raw record that could not be mapped. Never aborts a batch.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("malformed record: {0}")]
    MalformedRecord(String),
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("message needs text or at least one file")]
    Empty,

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

#[derive(Debug, Error)]
pub enum CrmError {
    #[error("CRM client credentials are not configured")]
    NotConfigured,

    #[error("CRM OAuth is not connected")]
    NotConnected,

    #[error("CRM token request failed: {0}")]
    Token(String),

    #[error("CRM API returned {status}")]
    Status { status: u16, body: String },

    #[error("CRM request failed: {0}")]
    Http(#[from] reqwest::Error),
}
