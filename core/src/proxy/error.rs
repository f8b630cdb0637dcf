//! Error type shared by the relay handlers

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// The UI sent something a payload builder cannot use
    #[error("{0}")]
    InvalidInput(String),

    #[error("CA RAG initialization failed: {0}")]
    RagInitFailed(String),

    #[error("{0}")]
    ForbiddenPath(String),

    #[error("Invalid backend URL: {0}")]
    InvalidBackendUrl(String),

    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("Invalid request body: {0}")]
    BadRequest(String),

    #[error("{0}")]
    MethodNotAllowed(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidInput(_) | ProxyError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ProxyError::ForbiddenPath(_) => StatusCode::FORBIDDEN,
            ProxyError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::InvalidBackendUrl(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::RagInitFailed(_) | ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ProxyError::ForbiddenPath("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(ProxyError::InvalidInput("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ProxyError::RagInitFailed("x".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ProxyError::MethodNotAllowed("x".into()).status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }

    #[test]
    fn test_rag_message_prefix() {
        let err = ProxyError::RagInitFailed("Internal Server Error".into());
        assert_eq!(err.to_string(), "CA RAG initialization failed: Internal Server Error");
    }
}
