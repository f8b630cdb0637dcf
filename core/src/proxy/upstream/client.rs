//! Upstream client for calling the agent backend

use axum::http::{HeaderMap, Method};
use bytes::Bytes;
use reqwest::{header, Client, Response};
use serde_json::{json, Value};
use tokio::time::Duration;

use crate::config::TimeoutsConfig;
use crate::proxy::error::ProxyError;
use crate::proxy::session_manager::RagInitializer;

/// Headers that must not cross the proxy (hop-by-hop, or rewritten by the client)
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

pub fn should_forward_header(name: &str) -> bool {
    !HOP_BY_HOP_HEADERS.contains(&name.to_ascii_lowercase().as_str())
}

#[derive(Clone)]
pub struct UpstreamClient {
    http_client: Client,
    request_timeout: Duration,
}

impl UpstreamClient {
    pub fn new(timeouts: &TimeoutsConfig, proxy_url: Option<&str>) -> Result<Self, ProxyError> {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_secs(timeouts.connect_timeout))
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .user_agent(concat!("agent-relay/", env!("CARGO_PKG_VERSION")));

        if let Some(proxy) = proxy_url.filter(|p| !p.is_empty()) {
            match reqwest::Proxy::all(proxy) {
                Ok(p) => {
                    builder = builder.proxy(p);
                    tracing::info!("Using upstream proxy: {}", proxy);
                }
                Err(e) => tracing::warn!("Ignoring invalid upstream proxy {}: {}", proxy, e),
            }
        } else {
            // Ignore ambient HTTP(S)_PROXY unless a proxy is configured
            builder = builder.no_proxy();
        }

        let http_client = builder.build()?;
        Ok(Self {
            http_client,
            request_timeout: Duration::from_secs(timeouts.request_timeout),
        })
    }

    /// POST a translated payload. Streaming calls get no whole-request
    /// timeout; their reads are bounded per chunk by the response processor.
    pub async fn post_json(&self, url: &str, body: &Value, streaming: bool) -> Result<Response, ProxyError> {
        let mut request = self
            .http_client
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(body);

        if streaming {
            request = request.header(header::ACCEPT, "text/event-stream");
        } else {
            request = request.timeout(self.request_timeout);
        }

        request.send().await.map_err(|e| {
            tracing::error!("Request to {} failed: {}", url, e);
            ProxyError::Upstream(e)
        })
    }

    /// Forward an allow-listed request verbatim
    pub async fn forward(
        &self,
        method: Method,
        url: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Result<Response, ProxyError> {
        let mut outbound = header::HeaderMap::new();
        for (name, value) in headers.iter() {
            if should_forward_header(name.as_str()) {
                outbound.append(name.clone(), value.clone());
            }
        }

        self.http_client
            .request(method, url)
            .headers(outbound)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Forwarding to {} failed: {}", url, e);
                ProxyError::Upstream(e)
            })
    }
}

impl RagInitializer for UpstreamClient {
    async fn initialize(&self, server_url: &str, session_uuid: &str) -> Result<(), ProxyError> {
        let url = format!("{}/init", server_url.trim_end_matches('/'));

        let response = self
            .http_client
            .post(&url)
            .timeout(self.request_timeout)
            .json(&json!({ "uuid": session_uuid }))
            .send()
            .await
            .map_err(|e| ProxyError::RagInitFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or(status.as_str()).to_string();
            return Err(ProxyError::RagInitFailed(reason));
        }
        Ok(())
    }
}
