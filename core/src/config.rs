use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::proxy::security::{validate_backend_url, DEFAULT_ALLOWED_PATHS};

/// Relay configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub routes: RoutesConfig,

    #[serde(default)]
    pub chat: ChatDefaults,

    #[serde(default)]
    pub rag: RagConfig,

    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

/// Where the agent backend lives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub url: String,

    /// Backend path that accepted WebSocket upgrades are relayed to
    #[serde(default = "default_backend_websocket_path")]
    pub websocket_path: String,

    /// Optional outbound HTTP proxy for backend calls
    #[serde(default)]
    pub proxy: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            websocket_path: default_backend_websocket_path(),
            proxy: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutesConfig {
    /// Fixed prefix every proxied HTTP path must live under
    #[serde(default = "default_http_root")]
    pub http_root: String,

    /// The only path a WebSocket upgrade is accepted on
    #[serde(default = "default_websocket_path")]
    pub websocket_path: String,

    /// Backend-relative path prefixes that may be forwarded
    #[serde(default = "default_allowed_paths")]
    pub allowed_paths: Vec<String>,

    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,

    #[serde(default)]
    pub endpoints: EndpointPaths,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            http_root: default_http_root(),
            websocket_path: default_websocket_path(),
            allowed_paths: default_allowed_paths(),
            cors_origin: default_cors_origin(),
            endpoints: EndpointPaths::default(),
        }
    }
}

/// Backend-relative paths that get payload/response translation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointPaths {
    #[serde(default = "default_generate_path")]
    pub generate: String,

    #[serde(default = "default_generate_stream_path")]
    pub generate_stream: String,

    #[serde(default = "default_chat_path")]
    pub chat: String,

    #[serde(default = "default_chat_stream_path")]
    pub chat_stream: String,

    #[serde(default = "default_context_aware_rag_path")]
    pub context_aware_rag: String,
}

impl Default for EndpointPaths {
    fn default() -> Self {
        Self {
            generate: default_generate_path(),
            generate_stream: default_generate_stream_path(),
            chat: default_chat_path(),
            chat_stream: default_chat_stream_path(),
            context_aware_rag: default_context_aware_rag_path(),
        }
    }
}

/// Fields every chat payload starts from before optional parameters are merged
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatDefaults {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

impl Default for ChatDefaults {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Session identifier sent to the backend `/init` call
    #[serde(default = "default_rag_uuid")]
    pub uuid: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            uuid: default_rag_uuid(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Whole-request timeout for non-streaming backend calls (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Longest wait for the next upstream chunk of a stream (seconds)
    #[serde(default = "default_stream_idle_timeout")]
    pub stream_idle_timeout: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            stream_idle_timeout: default_stream_idle_timeout(),
        }
    }
}

impl Config {
    /// Reject configurations the gates cannot enforce
    pub fn validate(&self) -> anyhow::Result<()> {
        let root = &self.routes.http_root;
        if !root.starts_with('/') || root.ends_with('/') {
            anyhow::bail!("routes.http_root must be absolute without a trailing slash: {:?}", root);
        }
        if !self.routes.websocket_path.starts_with('/') {
            anyhow::bail!("routes.websocket_path must be absolute: {:?}", self.routes.websocket_path);
        }
        if let Some(bad) = self.routes.allowed_paths.iter().find(|p| !p.starts_with('/')) {
            anyhow::bail!("routes.allowed_paths entries must be absolute: {:?}", bad);
        }

        let verdict = validate_backend_url(&self.backend.url);
        if !verdict.is_valid {
            anyhow::bail!(
                "backend.url {:?} rejected: {}",
                self.backend.url,
                verdict.error.unwrap_or_default()
            );
        }
        Ok(())
    }
}

// Default value functions
fn default_port() -> u16 { 3000 }
fn default_host() -> String { "127.0.0.1".to_string() }
fn default_backend_url() -> String { "http://127.0.0.1:8000".to_string() }
fn default_backend_websocket_path() -> String { "/websocket".to_string() }
fn default_http_root() -> String { "/api".to_string() }
fn default_websocket_path() -> String { "/ws".to_string() }
fn default_cors_origin() -> String { "http://localhost:3000".to_string() }
fn default_generate_path() -> String { "/generate".to_string() }
fn default_generate_stream_path() -> String { "/generate/stream".to_string() }
fn default_chat_path() -> String { "/chat".to_string() }
fn default_chat_stream_path() -> String { "/chat/stream".to_string() }
fn default_context_aware_rag_path() -> String { "/call".to_string() }
fn default_model() -> String { "nvidia/nemotron".to_string() }
fn default_temperature() -> f64 { 0.7 }
fn default_rag_uuid() -> String { "123456".to_string() }
fn default_request_timeout() -> u64 { 120 }
fn default_connect_timeout() -> u64 { 20 }
fn default_stream_idle_timeout() -> u64 { 300 }

fn default_allowed_paths() -> Vec<String> {
    DEFAULT_ALLOWED_PATHS.iter().map(|p| p.to_string()).collect()
}

/// Get default config file path
/// Uses ~/.config/agent-relay/config.toml
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("agent-relay")
        .join("config.toml")
}

/// Load config from file, or return defaults if not found.
///
/// Loading order:
/// 1. Specified path (if provided)
/// 2. ./config.toml (if exists)
/// 3. default_config_path() (usually ~/.config/agent-relay/config.toml)
pub fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    let config = read_config(path)?;
    config.validate()?;
    Ok(config)
}

fn read_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    if let Some(config_path) = path {
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            tracing::info!("Loaded config from specified path {:?}", config_path);
            return Ok(config);
        } else {
            anyhow::bail!("Specified config file not found: {:?}", config_path);
        }
    }

    let local_config = PathBuf::from("config.toml");
    if local_config.exists() {
        match std::fs::read_to_string(&local_config) {
            Ok(content) => match toml::from_str::<Config>(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from current directory {:?}", local_config);
                    return Ok(config);
                }
                Err(e) => {
                    tracing::error!("Failed to parse ./config.toml: {}. Falling back to default path.", e);
                }
            },
            Err(e) => {
                tracing::error!("Failed to read ./config.toml: {}. Falling back to default path.", e);
            }
        }
    }

    let default_path = default_config_path();
    if default_path.exists() {
        let content = std::fs::read_to_string(&default_path)?;
        let config: Config = toml::from_str(&content)?;
        tracing::info!("Loaded config from default path {:?}", default_path);
        Ok(config)
    } else {
        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }
}
