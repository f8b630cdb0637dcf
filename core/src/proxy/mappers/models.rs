//! Request shapes the chat UI sends

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Body of a POST from the chat UI to any translated endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,

    #[serde(default = "default_use_chat_history")]
    pub use_chat_history: bool,

    /// Raw string, either a JSON object or `key=value,key=value`
    #[serde(default)]
    pub optional_generation_parameters: Option<String>,

    #[serde(default)]
    pub conversation_id: Option<String>,

    /// Explicit prompt for the generate endpoints
    #[serde(default)]
    pub input_message: Option<String>,
}

impl Default for UiRequest {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            use_chat_history: default_use_chat_history(),
            optional_generation_parameters: None,
            conversation_id: None,
            input_message: None,
        }
    }
}

fn default_use_chat_history() -> bool {
    true
}

impl UiRequest {
    /// Prompt for the generate endpoints: explicit input, else the last message
    pub fn input_text(&self) -> Option<&str> {
        self.input_message
            .as_deref()
            .or_else(|| self.messages.last().map(|m| m.content.as_str()))
    }

    pub fn optional_params_raw(&self) -> &str {
        self.optional_generation_parameters.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ui_request_camel_case() {
        let request: UiRequest = serde_json::from_str(
            r#"{
                "messages": [{"role": "user", "content": "hi"}],
                "useChatHistory": false,
                "optionalGenerationParameters": "max_tokens=10",
                "conversationId": "conv-1"
            }"#,
        )
        .unwrap();

        assert_eq!(request.messages, vec![ChatMessage::user("hi")]);
        assert!(!request.use_chat_history);
        assert_eq!(request.optional_params_raw(), "max_tokens=10");
        assert_eq!(request.conversation_id.as_deref(), Some("conv-1"));
        assert_eq!(request.input_text(), Some("hi"));
    }

    #[test]
    fn test_ui_request_defaults() {
        let request: UiRequest = serde_json::from_str("{}").unwrap();
        assert!(request.use_chat_history);
        assert!(request.messages.is_empty());
        assert_eq!(request.input_text(), None);
        assert_eq!(request.optional_params_raw(), "");
    }

    #[test]
    fn test_unknown_role_rejected() {
        let parsed = serde_json::from_str::<ChatMessage>(r#"{"role": "tool", "content": "x"}"#);
        assert!(parsed.is_err());
    }
}
