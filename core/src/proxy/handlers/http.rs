//! HTTP relay handler for everything under the configured root
//!
//! Every request is normalized and checked against the allowlist before the
//! backend is touched. Endpoint paths are translated; other allow-listed
//! paths are forwarded as-is.

use axum::{
    body::{to_bytes, Body},
    extract::{ws::WebSocketUpgrade, Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use crate::proxy::endpoint::{Endpoint, PayloadContext};
use crate::proxy::error::ProxyError;
use crate::proxy::handlers::response::ResponseContext;
use crate::proxy::handlers::websocket::reject_upgrade;
use crate::proxy::mappers::UiRequest;
use crate::proxy::security::ProxyHttpPath;
use crate::proxy::server::AppState;
use crate::proxy::upstream::client::should_forward_header;

/// Upper bound on a buffered request body (100MB)
pub const MAX_BODY_BYTES: usize = 100 * 1024 * 1024;

/// Query parameters that may carry the conversation id
const CONVERSATION_QUERY_KEYS: [&str; 2] = ["conversationId", "session"];

/// Handle ANY {http_root}/*path
pub async fn handle_proxy_request(
    State(state): State<AppState>,
    ws: Option<WebSocketUpgrade>,
    request: Request,
) -> Response {
    // Upgrades belong to the WebSocket gate alone; never forward them
    if ws.is_some() || is_websocket_upgrade(request.headers()) {
        let reason = state
            .websocket_gate
            .validate(request.uri().path())
            .error
            .unwrap_or_else(|| "WebSocket upgrade rejected".to_string());
        warn!("Rejected WebSocket upgrade: {}", reason);
        return match ws {
            Some(ws) => reject_upgrade(ws, reason),
            None => ProxyError::ForbiddenPath(reason).into_response(),
        };
    }

    let raw = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let target = match state.allowlist.resolve(&raw) {
        Ok(target) => target,
        Err(reason) => {
            warn!("Rejected proxy path {}: {}", raw, reason);
            return ProxyError::ForbiddenPath(reason).into_response();
        }
    };

    if request.method() == Method::OPTIONS {
        return preflight(&state.responses);
    }

    let request_id = uuid::Uuid::new_v4().simple().to_string();
    let result = match state.routes.resolve(&target.backend_path) {
        Some(_) if request.method() != Method::POST => Err(ProxyError::MethodNotAllowed(format!(
            "{} is not allowed on {}; use POST",
            request.method(),
            target.path
        ))),
        Some(endpoint) => {
            debug!("[{}] {} {} -> {}", request_id, request.method(), target.path, endpoint.name());
            relay_endpoint(&state, endpoint, &target, request).await
        }
        None => {
            debug!("[{}] {} {} -> passthrough", request_id, request.method(), target.path);
            relay_passthrough(&state, &target, request).await
        }
    };

    result.unwrap_or_else(|e| {
        warn!("[{}] {}", request_id, e);
        e.into_response()
    })
}

async fn relay_endpoint(
    state: &AppState,
    endpoint: Endpoint,
    target: &ProxyHttpPath,
    request: Request,
) -> Result<Response, ProxyError> {
    let body = to_bytes(request.into_body(), MAX_BODY_BYTES)
        .await
        .map_err(|e| ProxyError::BadRequest(e.to_string()))?;

    let mut ui_request = parse_ui_request(&body)?;
    if ui_request.conversation_id.is_none() {
        ui_request.conversation_id = conversation_from_query(target.query.as_deref());
    }

    let ctx = PayloadContext {
        chat_defaults: &state.chat_defaults,
        rag_sessions: &state.rag_sessions,
        rag_initializer: state.upstream.as_ref(),
        server_url: &state.backend_url,
    };
    let payload = endpoint.build_payload(&ui_request, &ctx).await?;

    let url = target.backend_target(&state.backend_url);
    let upstream = state.upstream.post_json(&url, &payload, endpoint.is_streaming()).await?;

    Ok(endpoint.process_response(upstream, &state.responses).await)
}

async fn relay_passthrough(state: &AppState, target: &ProxyHttpPath, request: Request) -> Result<Response, ProxyError> {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ProxyError::BadRequest(e.to_string()))?;

    let url = target.backend_target(&state.backend_url);
    let upstream = state.upstream.forward(parts.method, &url, &parts.headers, body).await?;

    let mut builder = Response::builder().status(upstream.status());
    for (name, value) in upstream.headers() {
        if should_forward_header(name.as_str()) {
            builder = builder.header(name, value);
        }
    }

    Ok(builder
        .body(Body::from_stream(upstream.bytes_stream()))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()))
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

/// An empty body means "all defaults"
fn parse_ui_request(body: &[u8]) -> Result<UiRequest, ProxyError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(UiRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| ProxyError::BadRequest(e.to_string()))
}

fn conversation_from_query(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, value)| CONVERSATION_QUERY_KEYS.contains(&key.as_ref()) && !value.is_empty())
        .map(|(_, value)| value.into_owned())
}

fn preflight(ctx: &ResponseContext) -> Response {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, ctx.cors_origin_header())
        .header(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true")
        .header(header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, PUT, DELETE, OPTIONS")
        .header(header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type, Authorization")
        .header(header::ACCESS_CONTROL_MAX_AGE, "86400")
        .body(Body::empty())
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
