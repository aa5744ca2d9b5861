use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use log::{debug, warn};

use crate::models::{Conversation, Message, NewMessage};
use crate::object_id::ObjectId;
use crate::store::{DocumentStore, StoreError};

pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(10);

async fn bounded<T, F>(deadline: Duration, op: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(deadline, op).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Store call exceeded deadline of {:?}", deadline);
            Err(StoreError::Timeout(deadline))
        }
    }
}

fn dedup(ids: &[ObjectId]) -> Vec<ObjectId> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(id) {
            out.push(*id);
        }
    }
    out
}

#[derive(Clone)]
pub struct ConversationService {
    store: Arc<dyn DocumentStore>,
    deadline: Duration,
}

impl ConversationService {
    pub fn new(store: Arc<dyn DocumentStore>, deadline: Duration) -> Self {
        ConversationService { store, deadline }
    }

    pub async fn find_private_conversation(
        &self,
        a: ObjectId,
        b: ObjectId,
    ) -> Result<Conversation, StoreError> {
        bounded(self.deadline, self.find_private(a, b)).await
    }

    /// Returns the existing private conversation for the pair, or creates it.
    pub async fn create_private_conversation(
        &self,
        creator: ObjectId,
        other: ObjectId,
    ) -> Result<Conversation, StoreError> {
        if creator == other {
            return Err(StoreError::Conflict(
                "you cannot create a conversation with yourself".to_string(),
            ));
        }
        bounded(self.deadline, self.find_or_insert_private(creator, other)).await
    }

    /// Creates a group, or returns an existing group with the same title and
    /// the same participant set.
    pub async fn create_group_conversation(
        &self,
        title: &str,
        creator: ObjectId,
        participants: &[ObjectId],
    ) -> Result<Conversation, StoreError> {
        let participants = dedup(participants);
        if participants.len() < 2 {
            return Err(StoreError::Conflict(
                "group must have at least 2 participants".to_string(),
            ));
        }
        bounded(
            self.deadline,
            self.find_or_insert_group(title, creator, participants),
        )
        .await
    }

    pub async fn add_participants(
        &self,
        conversation_id: ObjectId,
        user_ids: &[ObjectId],
    ) -> Result<(), StoreError> {
        bounded(self.deadline, self.extend_group(conversation_id, user_ids)).await
    }

    async fn find_private(&self, a: ObjectId, b: ObjectId) -> Result<Conversation, StoreError> {
        self.store
            .find_private(a, b)
            .await?
            .ok_or_else(|| StoreError::NotFound("private conversation not found".to_string()))
    }

    async fn find_or_insert_private(
        &self,
        creator: ObjectId,
        other: ObjectId,
    ) -> Result<Conversation, StoreError> {
        if let Some(existing) = self.store.find_private(creator, other).await? {
            debug!("Reusing private conversation {}", existing.id);
            return Ok(existing);
        }

        let conversation = Conversation::private(creator, other);
        self.store.insert_conversation(conversation.clone()).await?;
        Ok(conversation)
    }

    async fn find_or_insert_group(
        &self,
        title: &str,
        creator: ObjectId,
        participants: Vec<ObjectId>,
    ) -> Result<Conversation, StoreError> {
        if let Some(existing) = self.store.find_group(title, &participants).await? {
            debug!("Reusing group conversation {}", existing.id);
            return Ok(existing);
        }

        let conversation = Conversation::group(title.to_string(), creator, participants);
        self.store.insert_conversation(conversation.clone()).await?;
        Ok(conversation)
    }

    async fn extend_group(
        &self,
        conversation_id: ObjectId,
        user_ids: &[ObjectId],
    ) -> Result<(), StoreError> {
        let conversation = self
            .store
            .find_conversation(conversation_id)
            .await?
            .ok_or_else(|| StoreError::NotFound("conversation not found".to_string()))?;

        if !conversation.is_group {
            return Err(StoreError::Conflict(
                "cannot add users to a private one-on-one conversation".to_string(),
            ));
        }

        let newcomers: Vec<ObjectId> = dedup(user_ids)
            .into_iter()
            .filter(|id| !conversation.has_participant(*id))
            .collect();
        if newcomers.is_empty() {
            return Err(StoreError::Conflict(
                "all users are already in the group".to_string(),
            ));
        }

        let mut participants = conversation.participants;
        participants.extend(newcomers);

        let modified = self
            .store
            .set_participants(conversation_id, participants, SystemTime::now())
            .await?;
        if !modified {
            return Err(StoreError::Conflict("no changes were made".to_string()));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct MessageService {
    store: Arc<dyn DocumentStore>,
    deadline: Duration,
}

impl MessageService {
    pub fn new(store: Arc<dyn DocumentStore>, deadline: Duration) -> Self {
        MessageService { store, deadline }
    }

    /// Appends a message and refreshes the conversation's last-message snapshot.
    pub async fn create_message(&self, new: NewMessage) -> Result<Message, StoreError> {
        bounded(self.deadline, self.append(Message::from_new(new))).await
    }

    async fn append(&self, message: Message) -> Result<Message, StoreError> {
        self.store.insert_message(message.clone()).await?;
        let touched = self
            .store
            .set_last_message(message.conversation_id, message.snapshot())
            .await?;
        if !touched {
            debug!(
                "Message {} stored for unknown conversation {}",
                message.id, message.conversation_id
            );
        }
        Ok(message)
    }
}
