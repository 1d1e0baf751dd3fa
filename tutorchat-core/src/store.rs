use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::error::{CoreResult, TutorChatError};
use crate::model::{Conversation, NewConversation, NewMessage, StoredMessage};

/// Where finished turns are written. The real deployment is a managed
/// relational store behind an auth'd API; the core only ever appends through
/// this seam and never mutates conversation metadata directly.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(&self, new: NewConversation) -> CoreResult<Conversation>;

    /// Appends a message and touches the parent conversation's
    /// `updated_at_ms`.
    async fn insert_message(&self, new: NewMessage) -> CoreResult<StoredMessage>;

    async fn list_conversations(&self) -> CoreResult<Vec<Conversation>>;

    /// Messages of one conversation, oldest first.
    async fn load_messages(&self, conversation_id: &str) -> CoreResult<Vec<StoredMessage>>;
}

pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[derive(Debug, Default)]
struct MemoryInner {
    conversations: HashMap<String, Conversation>,
    messages: Vec<StoredMessage>,
}

/// In-memory store used by tests and the CLI smoke tool.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn create_conversation(&self, new: NewConversation) -> CoreResult<Conversation> {
        let conversation = Conversation {
            id: uuid::Uuid::new_v4().to_string(),
            title: new.title,
            class_id: new.class_id,
            mode: new.mode,
            pinned: false,
            archived: false,
            updated_at_ms: now_ms(),
        };
        let mut inner = self.inner.lock().expect("store lock");
        inner
            .conversations
            .insert(conversation.id.clone(), conversation.clone());
        Ok(conversation)
    }

    async fn insert_message(&self, new: NewMessage) -> CoreResult<StoredMessage> {
        let mut inner = self.inner.lock().expect("store lock");
        let now = now_ms();
        let Some(conversation) = inner.conversations.get_mut(&new.conversation_id) else {
            return Err(TutorChatError::Validation(format!(
                "conversation '{}' does not exist",
                new.conversation_id
            )));
        };
        conversation.updated_at_ms = now;
        let message = StoredMessage {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: new.conversation_id,
            role: new.role,
            content: new.content,
            sources: new.sources,
            created_at_ms: now,
        };
        inner.messages.push(message.clone());
        Ok(message)
    }

    async fn list_conversations(&self) -> CoreResult<Vec<Conversation>> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner.conversations.values().cloned().collect())
    }

    async fn load_messages(&self, conversation_id: &str) -> CoreResult<Vec<StoredMessage>> {
        let inner = self.inner.lock().expect("store lock");
        let mut messages: Vec<StoredMessage> = inner
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        // Insertion order breaks ties within one millisecond.
        messages.sort_by_key(|m| m.created_at_ms);
        Ok(messages)
    }
}
