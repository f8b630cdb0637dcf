//! Conversation registry for the context-aware RAG backend
//! Tracks which conversations have already been initialized upstream

use dashmap::DashSet;
use std::future::Future;

use crate::proxy::error::ProxyError;

const DEFAULT_CONVERSATION: &str = "default";

/// Performs the out-of-band `/init` call for a RAG session
pub trait RagInitializer: Send + Sync {
    fn initialize(
        &self,
        server_url: &str,
        session_uuid: &str,
    ) -> impl Future<Output = Result<(), ProxyError>> + Send;
}

/// Insert-only set of composite conversation keys.
///
/// Owned by the server state and injected into the RAG payload builder, so
/// each router (and each test) gets its own registry.
pub struct RagSessionCache {
    session_uuid: String,
    initialized: DashSet<String>,
}

impl RagSessionCache {
    pub fn new(session_uuid: impl Into<String>) -> Self {
        Self {
            session_uuid: session_uuid.into(),
            initialized: DashSet::new(),
        }
    }

    pub fn session_uuid(&self) -> &str {
        &self.session_uuid
    }

    /// `<session uuid>-<conversation id>`, with empty ids collapsing to `default`
    pub fn conversation_key(&self, conversation_id: Option<&str>) -> String {
        let conversation = conversation_id
            .filter(|id| !id.is_empty())
            .unwrap_or(DEFAULT_CONVERSATION);
        format!("{}-{}", self.session_uuid, conversation)
    }

    pub fn is_initialized(&self, key: &str) -> bool {
        self.initialized.contains(key)
    }

    /// Returns false if the key was already present
    pub fn mark_initialized(&self, key: String) -> bool {
        self.initialized.insert(key)
    }

    pub fn len(&self) -> usize {
        self.initialized.len()
    }

    pub fn is_empty(&self) -> bool {
        self.initialized.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_key_defaults() {
        let cache = RagSessionCache::new("123456");
        assert_eq!(cache.conversation_key(Some("conv-1")), "123456-conv-1");
        assert_eq!(cache.conversation_key(Some("")), "123456-default");
        assert_eq!(cache.conversation_key(None), "123456-default");
    }

    #[test]
    fn test_insert_only() {
        let cache = RagSessionCache::new("abc");
        let key = cache.conversation_key(Some("c"));
        assert!(!cache.is_initialized(&key));
        assert!(cache.mark_initialized(key.clone()));
        assert!(!cache.mark_initialized(key.clone()));
        assert!(cache.is_initialized(&key));
        assert_eq!(cache.len(), 1);
    }
}
