use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_BASE_URL: &str = "https://api.sleekflow.io";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub messaging: MessagingConfig,
    pub polling: PollingConfig,
    pub crm: CrmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Loaded into the credential store at start-up without probing.
    pub api_key: Option<String>,
    pub default_base_url: String,
    /// Tried in order after the caller-supplied base URL.
    pub regional_base_urls: Vec<String>,
    pub probe_path: String,
    pub request_timeout_seconds: u64,
    pub page_size: usize,
    pub max_pages: usize,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_base_url: DEFAULT_BASE_URL.to_string(),
            regional_base_urls: vec![
                DEFAULT_BASE_URL.to_string(),
                "https://sleekflow-core-app-weu-production.azurewebsites.net".to_string(),
                "https://sleekflow-core-app-eus-production.azurewebsites.net".to_string(),
                "https://sleekflow-core-app-seas-production.azurewebsites.net".to_string(),
                "https://sleekflow-core-app-uaen-production.azurewebsites.net".to_string(),
            ],
            probe_path: "/api/contact".to_string(),
            request_timeout_seconds: 15,
            page_size: 100,
            max_pages: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrmConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub region: String,
    pub scopes: String,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: "http://localhost:3000/callback".to_string(),
            region: "com".to_string(),
            scopes: "ZohoCRM.modules.ALL,ZohoCRM.settings.ALL,ZohoCRM.users.READ,ZohoCRM.org.READ"
                .to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            messaging: MessagingConfig::default(),
            polling: PollingConfig::default(),
            crm: CrmConfig::default(),
        }
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

pub fn resolve_config_path() -> PathBuf {
    env::var("CONVO_CONSOLE_CONFIG")
        .ok()
        .map(PathBuf::from)
        .unwrap_or_else(|| expand_tilde("~/.convo-console/config.json"))
}

pub fn load_config() -> Config {
    let mut cfg = load_config_file(&resolve_config_path());
    apply_env_overrides(&mut cfg);
    cfg
}

/// Reads a config file, falling back to defaults when it is missing or unparsable.
pub fn load_config_file(path: &std::path::Path) -> Config {
    if !path.exists() {
        return Config::default();
    }
    match fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str::<Config>(&raw) {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!("ignoring unparsable config {}: {err}", path.display());
                Config::default()
            }
        },
        Err(err) => {
            tracing::warn!("cannot read config {}: {err}", path.display());
            Config::default()
        }
    }
}

fn env_value(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn apply_env_overrides(cfg: &mut Config) {
    if let Some(host) = env_value("CONVO_CONSOLE_HOST") {
        cfg.server.host = host;
    }

    if let Some(port) = env_value("CONVO_CONSOLE_PORT").and_then(|v| v.parse().ok()) {
        cfg.server.port = port;
    }

    if let Some(key) = env_value("CONVO_CONSOLE_API_KEY") {
        cfg.messaging.api_key = Some(key);
    }

    if let Some(url) = env_value("CONVO_CONSOLE_BASE_URL") {
        cfg.messaging.default_base_url = trim_base_url(&url);
    }

    if let Some(secs) = env_value("CONVO_CONSOLE_POLL_SECONDS").and_then(|v| v.parse().ok()) {
        cfg.polling.interval_seconds = secs;
    }

    if let Some(id) = env_value("CONVO_CONSOLE_CRM_CLIENT_ID") {
        cfg.crm.client_id = Some(id);
    }

    if let Some(secret) = env_value("CONVO_CONSOLE_CRM_CLIENT_SECRET") {
        cfg.crm.client_secret = Some(secret);
    }

    if let Some(region) = env_value("CONVO_CONSOLE_CRM_REGION") {
        cfg.crm.region = region;
    }
}

pub fn trim_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
