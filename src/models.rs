use std::collections::HashSet;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::object_id::ObjectId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ObjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub is_group: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_avatar: Option<String>,
    pub participants: Vec<ObjectId>,
    pub created_by: ObjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<LastMessage>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

/// Snapshot of the newest message, kept on the conversation for listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub content: String,
    pub sender_id: ObjectId,
    pub timestamp: SystemTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: ObjectId,
    pub conversation_id: ObjectId,
    pub sender_id: ObjectId,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,
    pub created_at: SystemTime,
}

/// Message fields supplied by a caller; id and timestamp are assigned on insert.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: ObjectId,
    pub sender_id: ObjectId,
    pub content: String,
    pub attachment_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationUserSetting {
    pub conversation_id: ObjectId,
    pub user_id: ObjectId,
    pub is_muted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted_at: Option<SystemTime>,
}

impl Conversation {
    pub fn private(creator: ObjectId, other: ObjectId) -> Self {
        let now = SystemTime::now();
        Conversation {
            id: ObjectId::new(),
            title: None,
            is_group: false,
            group_avatar: None,
            participants: vec![creator, other],
            created_by: creator,
            last_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn group(title: String, creator: ObjectId, participants: Vec<ObjectId>) -> Self {
        let now = SystemTime::now();
        Conversation {
            id: ObjectId::new(),
            title: Some(title),
            is_group: true,
            group_avatar: None,
            participants,
            created_by: creator,
            last_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_participant(&self, user: ObjectId) -> bool {
        self.participants.contains(&user)
    }

    /// True when the participant lists hold the same ids, ignoring order and repeats.
    pub fn same_participants(&self, other: &[ObjectId]) -> bool {
        let ours: HashSet<_> = self.participants.iter().collect();
        let theirs: HashSet<_> = other.iter().collect();
        ours == theirs
    }
}

impl Message {
    pub fn from_new(new: NewMessage) -> Self {
        Message {
            id: ObjectId::new(),
            conversation_id: new.conversation_id,
            sender_id: new.sender_id,
            content: new.content,
            attachment_url: new.attachment_url,
            created_at: SystemTime::now(),
        }
    }

    pub fn snapshot(&self) -> LastMessage {
        LastMessage {
            content: self.content.clone(),
            sender_id: self.sender_id,
            timestamp: self.created_at,
        }
    }
}

impl ConversationUserSetting {
    pub fn muted(conversation_id: ObjectId, user_id: ObjectId, is_muted: bool) -> Self {
        ConversationUserSetting {
            conversation_id,
            user_id,
            is_muted,
            muted_at: is_muted.then(SystemTime::now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participant_comparison_ignores_order() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        let convo = Conversation::private(a, b);
        assert!(convo.same_participants(&[b, a]));
        assert!(!convo.same_participants(&[a]));
        assert!(!convo.same_participants(&[a, b, ObjectId::new()]));
    }

    #[test]
    fn private_conversation_document_omits_title() {
        let convo = Conversation::private(ObjectId::new(), ObjectId::new());
        let value = serde_json::to_value(&convo).unwrap();
        assert!(value.get("title").is_none());
        assert_eq!(value["isGroup"], false);
        assert_eq!(value["participants"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn unmuting_clears_timestamp() {
        let setting = ConversationUserSetting::muted(ObjectId::new(), ObjectId::new(), false);
        assert!(setting.muted_at.is_none());
        let setting = ConversationUserSetting::muted(ObjectId::new(), ObjectId::new(), true);
        assert!(setting.muted_at.is_some());
    }
}
