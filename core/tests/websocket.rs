//! WebSocket gate and relay over real sockets

use std::time::Duration;

use agent_relay_core::config::Config;
use agent_relay_core::proxy::{build_router, AppState};
use axum::{
    extract::ws::{Message as AxumMessage, WebSocketUpgrade},
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr.to_string()
}

async fn spawn_relay(backend_url: &str) -> String {
    let mut config = Config::default();
    config.backend.url = backend_url.to_string();
    serve(build_router(AppState::from_config(&config).unwrap())).await
}

async fn echo(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(|mut socket| async move {
        while let Some(Ok(msg)) = socket.recv().await {
            if let AxumMessage::Text(text) = msg {
                if socket.send(AxumMessage::Text(format!("echo: {}", text))).await.is_err() {
                    break;
                }
            }
        }
    })
}

async fn next_message<S>(socket: &mut S) -> Message
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .expect("no frame within 5s")
        .expect("socket ended")
        .expect("socket error")
}

async fn expect_policy_close(url: String, path: &str) {
    let (mut socket, _) = connect_async(url).await.unwrap();
    match next_message(&mut socket).await {
        Message::Close(Some(frame)) => {
            assert_eq!(frame.code, CloseCode::Policy);
            assert!(frame.reason.contains(path), "reason: {}", frame.reason);
        }
        other => panic!("expected close frame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_upgrade_path_closed_with_policy_violation() {
    let relay = spawn_relay("http://127.0.0.1:9").await;
    expect_policy_close(format!("ws://{}/ws/extra", relay), "/ws/extra").await;
}

#[tokio::test]
async fn test_upgrade_under_http_root_closed_with_policy_violation() {
    let relay = spawn_relay("http://127.0.0.1:9").await;
    expect_policy_close(format!("ws://{}/api/chat", relay), "/api/chat").await;
}

#[tokio::test]
async fn test_allowed_path_relays_frames_to_backend() {
    let backend = serve(Router::new().route("/websocket", get(echo))).await;
    let relay = spawn_relay(&format!("http://{}", backend)).await;

    let (mut socket, _) = connect_async(format!("ws://{}/ws", relay)).await.unwrap();
    socket.send(Message::Text("ping".into())).await.unwrap();

    match next_message(&mut socket).await {
        Message::Text(text) => assert_eq!(text.to_string(), "echo: ping"),
        other => panic!("expected text frame, got {:?}", other),
    }
}
