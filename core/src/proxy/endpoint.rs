//! Closed dispatch table of translated endpoints
//!
//! Each variant pairs one payload builder with one response processor.

use axum::response::Response;
use serde_json::Value;

use crate::config::{ChatDefaults, EndpointPaths};
use crate::proxy::error::ProxyError;
use crate::proxy::handlers::response::{self, ResponseContext, StreamFlavor};
use crate::proxy::mappers::payload;
use crate::proxy::mappers::UiRequest;
use crate::proxy::session_manager::{RagInitializer, RagSessionCache};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Generate,
    GenerateStream,
    Chat,
    ChatStream,
    ContextAwareRag,
}

impl Endpoint {
    pub const ALL: [Endpoint; 5] = [
        Endpoint::Generate,
        Endpoint::GenerateStream,
        Endpoint::Chat,
        Endpoint::ChatStream,
        Endpoint::ContextAwareRag,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Endpoint::Generate => "generate",
            Endpoint::GenerateStream => "generate-stream",
            Endpoint::Chat => "chat",
            Endpoint::ChatStream => "chat-stream",
            Endpoint::ContextAwareRag => "context-aware-rag",
        }
    }

    pub fn is_streaming(self) -> bool {
        matches!(self, Endpoint::GenerateStream | Endpoint::ChatStream)
    }

    pub async fn build_payload<I: RagInitializer>(
        self,
        request: &UiRequest,
        ctx: &PayloadContext<'_, I>,
    ) -> Result<Value, ProxyError> {
        match self {
            Endpoint::Generate => Ok(payload::build_generate_payload(request.input_text())),
            Endpoint::GenerateStream => Ok(payload::build_generate_stream_payload(request.input_text())),
            Endpoint::Chat => Ok(payload::build_chat_payload(
                &request.messages,
                request.use_chat_history,
                request.optional_params_raw(),
                ctx.chat_defaults,
            )),
            Endpoint::ChatStream => Ok(payload::build_chat_stream_payload(
                &request.messages,
                request.use_chat_history,
                request.optional_params_raw(),
                ctx.chat_defaults,
            )),
            Endpoint::ContextAwareRag => {
                payload::build_context_aware_rag_payload(
                    &request.messages,
                    request.conversation_id.as_deref(),
                    ctx.server_url,
                    ctx.rag_sessions,
                    ctx.rag_initializer,
                )
                .await
            }
        }
    }

    pub async fn process_response(self, upstream: reqwest::Response, ctx: &ResponseContext) -> Response {
        match self {
            Endpoint::Generate => response::process_generate(upstream, ctx).await,
            Endpoint::GenerateStream => response::process_stream(upstream, StreamFlavor::Generate, ctx).await,
            Endpoint::Chat => response::process_chat(upstream, ctx).await,
            Endpoint::ChatStream => response::process_stream(upstream, StreamFlavor::Chat, ctx).await,
            Endpoint::ContextAwareRag => response::process_context_aware_rag(upstream, ctx).await,
        }
    }
}

/// Everything a payload builder may need besides the request itself
pub struct PayloadContext<'a, I> {
    pub chat_defaults: &'a ChatDefaults,
    pub rag_sessions: &'a RagSessionCache,
    pub rag_initializer: &'a I,
    /// Base URL of the backend the RAG `/init` call goes to
    pub server_url: &'a str,
}

/// Backend-relative path -> endpoint
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<(String, Endpoint)>,
}

impl RouteTable {
    pub fn new(paths: &EndpointPaths) -> Self {
        let routes = Endpoint::ALL
            .into_iter()
            .map(|endpoint| {
                let path = match endpoint {
                    Endpoint::Generate => &paths.generate,
                    Endpoint::GenerateStream => &paths.generate_stream,
                    Endpoint::Chat => &paths.chat,
                    Endpoint::ChatStream => &paths.chat_stream,
                    Endpoint::ContextAwareRag => &paths.context_aware_rag,
                };
                (path.clone(), endpoint)
            })
            .collect();
        Self { routes }
    }

    /// Exact match only; anything else is plain passthrough
    pub fn resolve(&self, backend_path: &str) -> Option<Endpoint> {
        self.routes
            .iter()
            .find(|(path, _)| path == backend_path)
            .map(|(_, endpoint)| *endpoint)
    }

    pub fn path_of(&self, endpoint: Endpoint) -> Option<&str> {
        self.routes
            .iter()
            .find(|(_, e)| *e == endpoint)
            .map(|(path, _)| path.as_str())
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new(&EndpointPaths::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::mappers::ChatMessage;
    use serde_json::json;

    struct NoInit;

    impl RagInitializer for NoInit {
        async fn initialize(&self, _server_url: &str, _session_uuid: &str) -> Result<(), ProxyError> {
            Ok(())
        }
    }

    #[test]
    fn test_route_table_defaults() {
        let table = RouteTable::default();
        assert_eq!(table.resolve("/chat"), Some(Endpoint::Chat));
        assert_eq!(table.resolve("/chat/stream"), Some(Endpoint::ChatStream));
        assert_eq!(table.resolve("/generate"), Some(Endpoint::Generate));
        assert_eq!(table.resolve("/generate/stream"), Some(Endpoint::GenerateStream));
        assert_eq!(table.resolve("/call"), Some(Endpoint::ContextAwareRag));
        assert_eq!(table.resolve("/chat/stream/extra"), None);
        assert_eq!(table.resolve("/mcp/client/tool/list"), None);
        assert_eq!(table.path_of(Endpoint::ChatStream), Some("/chat/stream"));
    }

    #[test]
    fn test_streaming_variants() {
        let streaming: Vec<_> = Endpoint::ALL.into_iter().filter(|e| e.is_streaming()).collect();
        assert_eq!(streaming, vec![Endpoint::GenerateStream, Endpoint::ChatStream]);
    }

    #[tokio::test]
    async fn test_dispatch_builds_matching_payloads() {
        let defaults = ChatDefaults::default();
        let sessions = RagSessionCache::new("123456");
        let ctx = PayloadContext {
            chat_defaults: &defaults,
            rag_sessions: &sessions,
            rag_initializer: &NoInit,
            server_url: "http://localhost:8000",
        };
        let request = UiRequest {
            messages: vec![ChatMessage::user("What is RAG?")],
            ..UiRequest::default()
        };

        let chat = Endpoint::ChatStream.build_payload(&request, &ctx).await.unwrap();
        assert_eq!(chat["stream"], json!(true));

        let generate = Endpoint::Generate.build_payload(&request, &ctx).await.unwrap();
        assert_eq!(generate, json!({"input_message": "What is RAG?"}));

        let rag = Endpoint::ContextAwareRag.build_payload(&request, &ctx).await.unwrap();
        assert_eq!(rag, json!({"state": {"chat": {"question": "What is RAG?"}}}));
        assert!(sessions.is_initialized("123456-default"));
    }
}
