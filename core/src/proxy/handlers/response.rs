//! Backend response -> UI wire format
//!
//! Non-success upstream statuses are always mirrored verbatim. Successful
//! responses are either read whole and reduced to one field, or streamed
//! through [`SseLineParser`] one chunk at a time.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, warn};

use crate::proxy::error::ProxyError;
use crate::proxy::mappers::intermediate::{encode_intermediate_line, is_truthy};
use crate::proxy::sse::{SseFrame, SseLineParser};

pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream; charset=utf-8";
pub const PLAIN_TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Settings every processor needs
#[derive(Debug, Clone)]
pub struct ResponseContext {
    pub cors_origin: String,
    pub stream_idle_timeout: Duration,
}

impl ResponseContext {
    pub fn new(cors_origin: impl Into<String>, stream_idle_timeout: Duration) -> Self {
        Self {
            cors_origin: cors_origin.into(),
            stream_idle_timeout,
        }
    }

    pub(crate) fn cors_origin_header(&self) -> HeaderValue {
        HeaderValue::from_str(&self.cors_origin).unwrap_or_else(|_| {
            warn!("CORS origin {:?} is not a valid header value", self.cors_origin);
            HeaderValue::from_static("null")
        })
    }
}

/// Which field a streaming processor lifts out of each `data:` line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFlavor {
    /// Write `choices[0].message.content` / `choices[0].delta.content` as raw text
    Chat,
    /// Write the whole data payload when it carries a string `value`
    Generate,
}

/// Mirror a failed upstream status and body
pub async fn passthrough_failure(response: reqwest::Response) -> Response {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    debug!("Passing through upstream status {}", status);

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn text_response(ctx: &ResponseContext, content_type: &'static str, body: String) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, ctx.cors_origin_header())
        .header(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true")
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

async fn read_success_body(response: reqwest::Response) -> Result<String, Response> {
    if !response.status().is_success() {
        return Err(passthrough_failure(response).await);
    }
    response.text().await.map_err(|e| {
        tracing::error!("Failed to read upstream body: {}", e);
        ProxyError::Upstream(e).into_response()
    })
}

/// `/generate`: the body goes back untouched as JSON
pub async fn process_generate(response: reqwest::Response, ctx: &ResponseContext) -> Response {
    match read_success_body(response).await {
        Ok(body) => text_response(ctx, JSON_CONTENT_TYPE, body),
        Err(resp) => resp,
    }
}

/// `/chat`: reduce to the assistant text
pub async fn process_chat(response: reqwest::Response, ctx: &ResponseContext) -> Response {
    match read_success_body(response).await {
        Ok(body) => text_response(ctx, PLAIN_TEXT_CONTENT_TYPE, extract_chat_content(&body)),
        Err(resp) => resp,
    }
}

/// Context-aware RAG: reduce to the answer
pub async fn process_context_aware_rag(response: reqwest::Response, ctx: &ResponseContext) -> Response {
    match read_success_body(response).await {
        Ok(body) => text_response(ctx, PLAIN_TEXT_CONTENT_TYPE, extract_rag_answer(&body)),
        Err(resp) => resp,
    }
}

pub fn extract_chat_content(body: &str) -> String {
    let Ok(parsed) = serde_json::from_str::<Value>(body) else {
        return body.to_string();
    };
    first_truthy([
        parsed.pointer("/choices/0/message/content"),
        parsed.get("message"),
        parsed.get("answer"),
        parsed.get("value"),
    ])
    .map(render)
    .unwrap_or_else(|| body.to_string())
}

pub fn extract_rag_answer(body: &str) -> String {
    let Ok(parsed) = serde_json::from_str::<Value>(body) else {
        return body.to_string();
    };
    first_truthy([parsed.pointer("/state/chat/answer"), parsed.get("answer")])
        .map(render)
        .unwrap_or_else(|| body.to_string())
}

fn first_truthy<'a, const N: usize>(candidates: [Option<&'a Value>; N]) -> Option<&'a Value> {
    candidates.into_iter().flatten().find(|v| is_truthy(v))
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Streaming endpoints. Headers go out before the first upstream chunk.
pub async fn process_stream(
    response: reqwest::Response,
    flavor: StreamFlavor,
    ctx: &ResponseContext,
) -> Response {
    if !response.status().is_success() {
        return passthrough_failure(response).await;
    }

    let body = Body::from_stream(transform_stream(
        response.bytes_stream(),
        flavor,
        ctx.stream_idle_timeout,
    ));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, EVENT_STREAM_CONTENT_TYPE)
        .header(header::TRANSFER_ENCODING, "chunked")
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, ctx.cors_origin_header())
        .header(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true")
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Pull loop over the upstream bytes: read, decode, split, dispatch.
///
/// The returned stream ends on a sentinel, on upstream end or error, or when a
/// read stalls past `idle_timeout`. Dropping it (client disconnect) drops the
/// upstream stream with it, releasing the backend connection.
pub fn transform_stream<S, E>(
    upstream: S,
    flavor: StreamFlavor,
    idle_timeout: Duration,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    async_stream::stream! {
        let mut upstream = Box::pin(upstream);
        let mut parser = SseLineParser::new();

        loop {
            let chunk = match tokio::time::timeout(idle_timeout, upstream.next()).await {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(e))) => {
                    warn!("Upstream stream error: {}", e);
                    break;
                }
                Ok(None) => break,
                Err(_) => {
                    warn!("Upstream stream idle for {:?}, closing", idle_timeout);
                    break;
                }
            };

            for frame in parser.feed(&chunk) {
                if let Some(text) = render_frame(flavor, frame) {
                    yield Ok::<Bytes, Infallible>(Bytes::from(text));
                }
            }
            if parser.is_done() {
                break;
            }
        }

        parser.finish();
    }
}

fn render_frame(flavor: StreamFlavor, frame: SseFrame) -> Option<String> {
    match frame {
        SseFrame::Data(data) => match flavor {
            StreamFlavor::Chat => chat_delta(&data),
            StreamFlavor::Generate => generate_chunk(data),
        },
        SseFrame::IntermediateData(line) => encode_intermediate_line(&line),
        SseFrame::Done => None,
    }
}

fn parse_data(data: &str) -> Option<Value> {
    serde_json::from_str(data)
        .map_err(|e| debug!("Ignoring unparseable data line: {}", e))
        .ok()
}

fn chat_delta(data: &str) -> Option<String> {
    let parsed = parse_data(data)?;
    let content = [
        parsed.pointer("/choices/0/message/content"),
        parsed.pointer("/choices/0/delta/content"),
    ]
    .into_iter()
    .flatten()
    .filter_map(Value::as_str)
    .find(|s| !s.is_empty())
    .map(str::to_string);
    content
}

fn generate_chunk(data: String) -> Option<String> {
    let parsed = parse_data(&data)?;
    match parsed.get("value") {
        Some(Value::String(value)) if !value.is_empty() => Some(data),
        _ => None,
    }
}
