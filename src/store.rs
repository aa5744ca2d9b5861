use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::models::{Conversation, ConversationUserSetting, LastMessage, Message};
use crate::object_id::ObjectId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("store timed out after {0:?}")]
    Timeout(Duration),
    /// Transport or driver failure reported by a store implementation.
    #[error("store failure: {0}")]
    Backend(String),
}

/// Document-level access to conversations, messages and per-user settings.
///
/// Implementations only read and write documents; the rules about who may be
/// in which conversation live in [`crate::service`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_conversation(&self, id: ObjectId) -> Result<Option<Conversation>, StoreError>;

    /// Looks up the private conversation between `a` and `b`, in either order.
    async fn find_private(&self, a: ObjectId, b: ObjectId) -> Result<Option<Conversation>, StoreError>;

    async fn find_group(
        &self,
        title: &str,
        participants: &[ObjectId],
    ) -> Result<Option<Conversation>, StoreError>;

    async fn insert_conversation(&self, conversation: Conversation) -> Result<(), StoreError>;

    /// Replaces the participant list. Returns whether a document was modified.
    async fn set_participants(
        &self,
        id: ObjectId,
        participants: Vec<ObjectId>,
        updated_at: SystemTime,
    ) -> Result<bool, StoreError>;

    async fn set_last_message(&self, id: ObjectId, last: LastMessage) -> Result<bool, StoreError>;

    async fn insert_message(&self, message: Message) -> Result<(), StoreError>;

    async fn messages_for(&self, conversation_id: ObjectId) -> Result<Vec<Message>, StoreError>;

    async fn upsert_user_setting(&self, setting: ConversationUserSetting) -> Result<(), StoreError>;

    async fn find_user_setting(
        &self,
        conversation_id: ObjectId,
        user_id: ObjectId,
    ) -> Result<Option<ConversationUserSetting>, StoreError>;
}

#[derive(Default)]
struct Collections {
    conversations: HashMap<ObjectId, Conversation>,
    messages: Vec<Message>,
    settings: HashMap<(ObjectId, ObjectId), ConversationUserSetting>,
}

/// In-process store. Private conversations carry a uniqueness constraint on
/// their participant pair, so two racing inserts cannot both succeed.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Collections>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn conversation_count(&self) -> usize {
        self.inner.read().await.conversations.len()
    }
}

fn is_private_pair(conversation: &Conversation, a: ObjectId, b: ObjectId) -> bool {
    !conversation.is_group && conversation.same_participants(&[a, b])
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_conversation(&self, id: ObjectId) -> Result<Option<Conversation>, StoreError> {
        let collections = self.inner.read().await;
        Ok(collections.conversations.get(&id).cloned())
    }

    async fn find_private(&self, a: ObjectId, b: ObjectId) -> Result<Option<Conversation>, StoreError> {
        let collections = self.inner.read().await;
        Ok(collections
            .conversations
            .values()
            .find(|c| is_private_pair(c, a, b))
            .cloned())
    }

    async fn find_group(
        &self,
        title: &str,
        participants: &[ObjectId],
    ) -> Result<Option<Conversation>, StoreError> {
        let collections = self.inner.read().await;
        Ok(collections
            .conversations
            .values()
            .find(|c| {
                c.is_group
                    && c.title.as_deref() == Some(title)
                    && c.same_participants(participants)
            })
            .cloned())
    }

    async fn insert_conversation(&self, conversation: Conversation) -> Result<(), StoreError> {
        let mut collections = self.inner.write().await;

        if collections.conversations.contains_key(&conversation.id) {
            return Err(StoreError::Conflict(format!(
                "duplicate conversation id {}",
                conversation.id
            )));
        }

        if !conversation.is_group {
            if let &[a, b] = conversation.participants.as_slice() {
                if collections
                    .conversations
                    .values()
                    .any(|c| is_private_pair(c, a, b))
                {
                    return Err(StoreError::Conflict(
                        "private conversation already exists".to_string(),
                    ));
                }
            }
        }

        collections.conversations.insert(conversation.id, conversation);
        Ok(())
    }

    async fn set_participants(
        &self,
        id: ObjectId,
        participants: Vec<ObjectId>,
        updated_at: SystemTime,
    ) -> Result<bool, StoreError> {
        let mut collections = self.inner.write().await;
        match collections.conversations.get_mut(&id) {
            Some(conversation) if conversation.participants != participants => {
                conversation.participants = participants;
                conversation.updated_at = updated_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_last_message(&self, id: ObjectId, last: LastMessage) -> Result<bool, StoreError> {
        let mut collections = self.inner.write().await;
        match collections.conversations.get_mut(&id) {
            Some(conversation) => {
                conversation.updated_at = last.timestamp;
                conversation.last_message = Some(last);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_message(&self, message: Message) -> Result<(), StoreError> {
        let mut collections = self.inner.write().await;
        collections.messages.push(message);
        Ok(())
    }

    async fn messages_for(&self, conversation_id: ObjectId) -> Result<Vec<Message>, StoreError> {
        let collections = self.inner.read().await;
        Ok(collections
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn upsert_user_setting(&self, setting: ConversationUserSetting) -> Result<(), StoreError> {
        let mut collections = self.inner.write().await;
        collections
            .settings
            .insert((setting.conversation_id, setting.user_id), setting);
        Ok(())
    }

    async fn find_user_setting(
        &self,
        conversation_id: ObjectId,
        user_id: ObjectId,
    ) -> Result<Option<ConversationUserSetting>, StoreError> {
        let collections = self.inner.read().await;
        Ok(collections.settings.get(&(conversation_id, user_id)).cloned())
    }
}
