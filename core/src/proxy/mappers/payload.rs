//! UI request -> backend payload builders
//!
//! Chat payloads start from the configured defaults, merge the parsed optional
//! parameters, then overwrite `stream` and `messages` last so nothing the UI
//! sends can reintroduce a reserved field.

use serde_json::{json, Map, Value};

use super::models::{ChatMessage, Role};
use super::optional_params::parse_optional_params;
use crate::config::ChatDefaults;
use crate::proxy::error::ProxyError;
use crate::proxy::security::validate_backend_url;
use crate::proxy::session_manager::{RagInitializer, RagSessionCache};

const USER_MESSAGE_NOT_FOUND: &str = "User message not found: messages array is empty or invalid.";

pub fn build_generate_payload(input_text: Option<&str>) -> Value {
    json!({ "input_message": input_text.unwrap_or("") })
}

/// Same body as [`build_generate_payload`]; streaming is handled on the response side
pub fn build_generate_stream_payload(input_text: Option<&str>) -> Value {
    build_generate_payload(input_text)
}

pub fn build_chat_payload(
    messages: &[ChatMessage],
    use_chat_history: bool,
    optional_params: &str,
    defaults: &ChatDefaults,
) -> Value {
    build_chat_body(messages, use_chat_history, optional_params, defaults, false)
}

pub fn build_chat_stream_payload(
    messages: &[ChatMessage],
    use_chat_history: bool,
    optional_params: &str,
    defaults: &ChatDefaults,
) -> Value {
    build_chat_body(messages, use_chat_history, optional_params, defaults, true)
}

fn build_chat_body(
    messages: &[ChatMessage],
    use_chat_history: bool,
    optional_params: &str,
    defaults: &ChatDefaults,
    stream: bool,
) -> Value {
    let mut body = Map::new();
    body.insert("model".to_string(), json!(defaults.model));
    body.insert("temperature".to_string(), json!(defaults.temperature));
    body.extend(parse_optional_params(optional_params));

    body.insert("stream".to_string(), Value::Bool(stream));
    body.insert(
        "messages".to_string(),
        json!(select_messages(messages, use_chat_history)),
    );
    Value::Object(body)
}

/// Whole history, or only the last turn
fn select_messages(messages: &[ChatMessage], use_chat_history: bool) -> &[ChatMessage] {
    if use_chat_history {
        return messages;
    }
    match messages.last() {
        Some(last) => std::slice::from_ref(last),
        None => &[],
    }
}

/// Build the context-aware RAG payload, initializing the conversation upstream
/// the first time its composite key is seen.
pub async fn build_context_aware_rag_payload<I: RagInitializer>(
    messages: &[ChatMessage],
    conversation_id: Option<&str>,
    server_url: &str,
    sessions: &RagSessionCache,
    initializer: &I,
) -> Result<Value, ProxyError> {
    let question = match messages.last() {
        Some(last) if last.role == Role::User => last.content.as_str(),
        _ => return Err(ProxyError::InvalidInput(USER_MESSAGE_NOT_FOUND.to_string())),
    };

    let key = sessions.conversation_key(conversation_id);
    if !sessions.is_initialized(&key) {
        let verdict = validate_backend_url(server_url);
        if !verdict.is_valid {
            return Err(ProxyError::InvalidBackendUrl(verdict.error.unwrap_or_default()));
        }

        initializer
            .initialize(server_url, sessions.session_uuid())
            .await
            .map_err(|e| match e {
                ProxyError::RagInitFailed(reason) => ProxyError::RagInitFailed(reason),
                other => ProxyError::RagInitFailed(other.to_string()),
            })?;

        tracing::info!("Initialized RAG conversation {}", key);
        sessions.mark_initialized(key);
    }

    Ok(json!({
        "state": {
            "chat": {
                "question": question
            }
        }
    }))
}
