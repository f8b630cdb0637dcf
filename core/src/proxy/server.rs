//! Relay server - Axum HTTP + WebSocket front for the agent backend

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{any, get},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::{ChatDefaults, Config};
use crate::proxy::endpoint::RouteTable;
use crate::proxy::error::ProxyError;
use crate::proxy::handlers::http::handle_proxy_request;
use crate::proxy::handlers::response::ResponseContext;
use crate::proxy::handlers::websocket::{handle_fallback, handle_websocket};
use crate::proxy::security::{PathAllowlist, WebSocketPathValidator};
use crate::proxy::session_manager::RagSessionCache;
use crate::proxy::upstream::UpstreamClient;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub allowlist: Arc<PathAllowlist>,
    pub websocket_gate: Arc<WebSocketPathValidator>,
    pub routes: Arc<RouteTable>,
    pub upstream: Arc<UpstreamClient>,
    pub rag_sessions: Arc<RagSessionCache>,
    pub chat_defaults: Arc<ChatDefaults>,
    pub responses: Arc<ResponseContext>,
    pub backend_url: Arc<str>,
    pub backend_websocket_path: Arc<str>,
}

impl AppState {
    pub fn from_config(config: &Config) -> Result<Self, ProxyError> {
        let upstream = UpstreamClient::new(&config.timeouts, config.backend.proxy.as_deref())?;

        Ok(Self {
            allowlist: Arc::new(PathAllowlist::new(
                config.routes.http_root.clone(),
                config.routes.allowed_paths.clone(),
            )),
            websocket_gate: Arc::new(WebSocketPathValidator::new(config.routes.websocket_path.clone())),
            routes: Arc::new(RouteTable::new(&config.routes.endpoints)),
            upstream: Arc::new(upstream),
            rag_sessions: Arc::new(RagSessionCache::new(config.rag.uuid.clone())),
            chat_defaults: Arc::new(config.chat.clone()),
            responses: Arc::new(ResponseContext::new(
                config.routes.cors_origin.clone(),
                Duration::from_secs(config.timeouts.stream_idle_timeout),
            )),
            backend_url: Arc::from(config.backend.url.trim_end_matches('/')),
            backend_websocket_path: Arc::from(config.backend.websocket_path.as_str()),
        })
    }
}

/// Route table: health, the HTTP root, the WebSocket path, and a fallback
/// that turns away stray upgrades.
pub fn build_router(state: AppState) -> Router {
    let root = state.allowlist.root().to_string();
    let websocket_path = state.websocket_gate.path().to_string();

    Router::new()
        .route("/healthz", get(health_check_handler))
        .route("/health", get(health_check_handler))
        .route(&root, any(handle_proxy_request))
        .route(&format!("{}/*path", root), any(handle_proxy_request))
        .route(&websocket_path, get(handle_websocket))
        .fallback(handle_fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Relay server instance
pub struct ProxyServer {
    host: String,
    port: u16,
    state: AppState,
}

impl ProxyServer {
    pub fn new(config: &Config) -> Result<Self, ProxyError> {
        Ok(Self {
            host: config.server.host.clone(),
            port: config.server.port,
            state: AppState::from_config(config)?,
        })
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Run the relay until Ctrl+C / SIGTERM
    pub async fn run(self) -> anyhow::Result<()> {
        let app = self.router();

        let addr = format!("{}:{}", self.host, self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        tracing::info!("Relay listening on {}", addr);
        tracing::info!(
            "Forwarding {}/* and {} to {}",
            self.state.allowlist.root(),
            self.state.websocket_gate.path(),
            self.state.backend_url
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Relay stopped");
        Ok(())
    }
}

async fn health_check_handler() -> Response {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))).into_response()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_from_default_config() {
        let state = AppState::from_config(&Config::default()).unwrap();
        assert_eq!(state.allowlist.root(), "/api");
        assert_eq!(state.websocket_gate.path(), "/ws");
        assert_eq!(&*state.backend_url, "http://127.0.0.1:8000");
        assert_eq!(state.rag_sessions.session_uuid(), "123456");
    }

    #[test]
    fn test_trailing_slash_trimmed_from_backend_url() {
        let mut config = Config::default();
        config.backend.url = "http://agent:8000/".to_string();
        let state = AppState::from_config(&config).unwrap();
        assert_eq!(&*state.backend_url, "http://agent:8000");
    }
}
