//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the per-conversation chat state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::config::Config;
use autofix_core::domain::ChatMessage;
use autofix_core::ports::{GenerationService, VectorSearchService, VehicleStore};

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn VehicleStore>,
    pub vectors: Arc<dyn VectorSearchService>,
    pub llm: Arc<dyn GenerationService>,
    pub conversations: ConversationRegistry,
}

//=========================================================================================
// Conversation State (Prototype Chat Endpoints)
//=========================================================================================

/// A summary generated for one uploaded file.
#[derive(Debug, Clone)]
pub struct FileSummary {
    pub file_name: String,
    pub summary: String,
}

/// The state of one logical conversation: its vector collection, the per-file
/// summaries, and the message history. Callers address a conversation by id
/// on every request; there is no process-wide "current" conversation.
#[derive(Debug)]
pub struct Conversation {
    pub id: Uuid,
    pub collection: String,
    pub summaries: Vec<FileSummary>,
    pub messages: Vec<ChatMessage>,
    pub has_documents: bool,
}

impl Conversation {
    fn new(id: Uuid) -> Self {
        Self {
            id,
            collection: format!("conversation_{}", id.simple()),
            summaries: Vec::new(),
            messages: Vec::new(),
            has_documents: false,
        }
    }
}

/// An in-memory registry of conversations keyed by id. Each conversation is
/// behind its own lock, so two callers on different conversations never
/// contend and two callers on the same conversation serialize.
#[derive(Clone, Default)]
pub struct ConversationRegistry {
    inner: Arc<RwLock<HashMap<Uuid, Arc<Mutex<Conversation>>>>>,
}

impl ConversationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a conversation, or creates one when no id was supplied or the
    /// id is unknown yet (a fresh client picking its own conversation id).
    pub async fn get_or_create(&self, id: Option<Uuid>) -> (Uuid, Arc<Mutex<Conversation>>) {
        let id = id.unwrap_or_else(Uuid::new_v4);
        let mut registry = self.inner.write().await;
        let conversation = registry
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(Conversation::new(id))))
            .clone();
        (id, conversation)
    }

    /// Looks up an existing conversation.
    pub async fn get(&self, id: Uuid) -> Option<Arc<Mutex<Conversation>>> {
        self.inner.read().await.get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn conversations_are_isolated_by_id() {
        let registry = ConversationRegistry::new();
        let (id_a, conv_a) = registry.get_or_create(None).await;
        let (id_b, conv_b) = registry.get_or_create(None).await;
        assert_ne!(id_a, id_b);

        conv_a.lock().await.has_documents = true;
        assert!(!conv_b.lock().await.has_documents);
    }

    #[tokio::test]
    async fn get_or_create_is_stable_for_a_known_id() {
        let registry = ConversationRegistry::new();
        let (id, conv) = registry.get_or_create(None).await;
        conv.lock().await.has_documents = true;

        let (same_id, same_conv) = registry.get_or_create(Some(id)).await;
        assert_eq!(id, same_id);
        assert!(same_conv.lock().await.has_documents);
        assert!(registry.get(id).await.is_some());
    }

    #[tokio::test]
    async fn unknown_conversations_are_absent_from_get() {
        let registry = ConversationRegistry::new();
        assert!(registry.get(Uuid::new_v4()).await.is_none());
    }

    #[test]
    fn collection_names_embed_the_conversation_id() {
        let id = Uuid::new_v4();
        let conversation = Conversation::new(id);
        assert!(conversation.collection.contains(&id.simple().to_string()));
    }
}
