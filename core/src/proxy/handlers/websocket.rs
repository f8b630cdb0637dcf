//! WebSocket gate and bidirectional relay to the backend socket

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        OriginalUri, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as TungsteniteCloseFrame;
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::proxy::error::ProxyError;
use crate::proxy::server::AppState;

/// Control frame payloads cap the close reason at 123 bytes
const MAX_CLOSE_REASON_BYTES: usize = 123;

/// Handle GET {websocket_path}
pub async fn handle_websocket(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    ws: WebSocketUpgrade,
) -> Response {
    let verdict = state.websocket_gate.validate(uri.path());
    if !verdict.is_valid {
        let reason = verdict.error.unwrap_or_default();
        warn!("Rejected WebSocket upgrade: {}", reason);
        return reject_upgrade(ws, reason);
    }

    let target = match backend_websocket_url(&state.backend_url, &state.backend_websocket_path, uri.query()) {
        Ok(target) => target,
        Err(e) => {
            error!("{}", e);
            return e.into_response();
        }
    };

    ws.on_upgrade(move |socket| async move {
        if let Err(e) = relay(socket, target).await {
            warn!("WebSocket relay ended with error: {}", e);
        }
    })
}

/// Unmatched routes. Upgrades are accepted only to be closed with 1008.
pub async fn handle_fallback(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    match ws {
        Some(ws) => {
            let reason = state
                .websocket_gate
                .validate(uri.path())
                .error
                .unwrap_or_else(|| "WebSocket upgrade rejected".to_string());
            warn!("Rejected WebSocket upgrade: {}", reason);
            reject_upgrade(ws, reason)
        }
        None => (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response(),
    }
}

/// Complete the handshake, then immediately close with a policy violation
pub fn reject_upgrade(ws: WebSocketUpgrade, reason: String) -> Response {
    ws.on_upgrade(move |mut socket| async move {
        let frame = CloseFrame {
            code: close_code::POLICY,
            reason: truncate_reason(reason).into(),
        };
        if let Err(e) = socket.send(Message::Close(Some(frame))).await {
            debug!("Failed to send close frame: {}", e);
        }
    })
}

fn truncate_reason(mut reason: String) -> String {
    if reason.len() > MAX_CLOSE_REASON_BYTES {
        let mut end = MAX_CLOSE_REASON_BYTES;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        reason.truncate(end);
    }
    reason
}

/// `http(s)://host` -> `ws(s)://host{path}?{query}`
pub fn backend_websocket_url(backend_url: &str, path: &str, query: Option<&str>) -> Result<Url, ProxyError> {
    let mut url = Url::parse(backend_url).map_err(|e| ProxyError::InvalidBackendUrl(e.to_string()))?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    url.set_scheme(scheme)
        .map_err(|_| ProxyError::InvalidBackendUrl(format!("cannot use {} as a WebSocket URL", backend_url)))?;
    url.set_path(path);
    url.set_query(query);
    Ok(url)
}

async fn relay(client: WebSocket, target: Url) -> anyhow::Result<()> {
    let (backend, _) = connect_async(target.as_str()).await?;
    info!("WebSocket relay connected to {}", target);

    let (mut client_tx, mut client_rx) = client.split();
    let (mut backend_tx, mut backend_rx) = backend.split();

    let client_to_backend = async {
        while let Some(msg) = client_rx.next().await {
            let msg = msg?;
            let closing = matches!(msg, Message::Close(_));
            if let Some(forward) = to_backend(msg) {
                backend_tx.send(forward).await?;
            }
            if closing {
                break;
            }
        }
        Ok::<(), anyhow::Error>(())
    };

    let backend_to_client = async {
        while let Some(msg) = backend_rx.next().await {
            let msg = msg?;
            let closing = matches!(msg, TungsteniteMessage::Close(_));
            if let Some(forward) = to_client(msg) {
                client_tx.send(forward).await?;
            }
            if closing {
                break;
            }
        }
        Ok::<(), anyhow::Error>(())
    };

    tokio::select! {
        result = client_to_backend => result?,
        result = backend_to_client => result?,
    }

    debug!("WebSocket relay to {} closed", target);
    Ok(())
}

// Ping/pong is answered per hop by each socket
fn to_backend(msg: Message) -> Option<TungsteniteMessage> {
    match msg {
        Message::Text(text) => Some(TungsteniteMessage::Text(text.to_string().into())),
        Message::Binary(data) => Some(TungsteniteMessage::Binary(data)),
        Message::Close(frame) => Some(TungsteniteMessage::Close(frame.map(|f| TungsteniteCloseFrame {
            code: CloseCode::from(f.code),
            reason: f.reason,
        }))),
        Message::Ping(_) | Message::Pong(_) => None,
    }
}

fn to_client(msg: TungsteniteMessage) -> Option<Message> {
    match msg {
        TungsteniteMessage::Text(text) => Some(Message::Text(text.to_string().into())),
        TungsteniteMessage::Binary(data) => Some(Message::Binary(data)),
        TungsteniteMessage::Close(frame) => Some(Message::Close(frame.map(|f| CloseFrame {
            code: f.code.into(),
            reason: f.reason,
        }))),
        TungsteniteMessage::Ping(_) | TungsteniteMessage::Pong(_) | TungsteniteMessage::Frame(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_websocket_url() {
        let url = backend_websocket_url("http://127.0.0.1:8000", "/websocket", None).unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:8000/websocket");

        let url = backend_websocket_url("https://agent.internal/", "/websocket", Some("session=abc")).unwrap();
        assert_eq!(url.as_str(), "wss://agent.internal/websocket?session=abc");
    }

    #[test]
    fn test_backend_websocket_url_invalid() {
        assert!(backend_websocket_url("not a url", "/websocket", None).is_err());
    }

    #[test]
    fn test_truncate_reason_respects_char_boundaries() {
        let short = "WebSocket path '/x' is not allowed. Expected: /ws".to_string();
        assert_eq!(truncate_reason(short.clone()), short);

        let long = "é".repeat(100);
        let truncated = truncate_reason(long);
        assert!(truncated.len() <= MAX_CLOSE_REASON_BYTES);
        assert!(truncated.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_message_conversion() {
        assert_eq!(
            to_backend(Message::Text("hi".to_string())),
            Some(TungsteniteMessage::Text("hi".to_string()))
        );
        assert_eq!(to_backend(Message::Ping(vec![1])), None);

        let close = to_client(TungsteniteMessage::Close(Some(TungsteniteCloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        })));
        match close {
            Some(Message::Close(Some(frame))) => {
                assert_eq!(frame.code, 1000);
                assert_eq!(frame.reason, "bye");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
