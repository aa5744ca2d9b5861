use serde::{Deserialize, Deserializer};
use thiserror::Error;

use crate::object_id::ObjectId;

/// Rejections produced while decoding a command line. The `Display` text is
/// what goes back on the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid JSON format")]
    InvalidFormat,
    #[error("Unknown command")]
    UnknownCommand,
    #[error("Missing senderId or receiverId")]
    MissingConversationFields,
    #[error("Invalid sender or receiver ObjectID")]
    InvalidConversationIds,
    #[error("Missing title, creatorId, or participantIds")]
    MissingGroupFields,
    #[error("Invalid creatorId")]
    InvalidCreatorId,
    #[error("Invalid participant ID: {0}")]
    InvalidParticipantId(String),
    #[error("Missing senderId, conversationId, or content")]
    MissingMessageFields,
    #[error("Invalid ObjectID(s)")]
    InvalidMessageIds,
    #[error("Missing roomId, playerId, or playerName")]
    MissingRoomFields,
}

/// Treats an explicit `null` like an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Every field any command may carry. Absent or null fields decode as empty.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RawCommand {
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    kind: String,
    #[serde(deserialize_with = "null_as_default")]
    sender_id: String,
    #[serde(deserialize_with = "null_as_default")]
    receiver_id: String,
    #[serde(deserialize_with = "null_as_default")]
    title: String,
    #[serde(deserialize_with = "null_as_default")]
    creator_id: String,
    #[serde(deserialize_with = "null_as_default")]
    participant_ids: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    conversation_id: String,
    #[serde(deserialize_with = "null_as_default")]
    content: String,
    #[serde(deserialize_with = "null_as_default")]
    room_id: String,
    #[serde(deserialize_with = "null_as_default")]
    player_id: String,
    #[serde(deserialize_with = "null_as_default")]
    player_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateConversation {
        sender: ObjectId,
        receiver: ObjectId,
    },
    CreateGroupConversation {
        title: String,
        creator: ObjectId,
        participants: Vec<ObjectId>,
    },
    SendMessage {
        sender: ObjectId,
        conversation: ObjectId,
        content: String,
    },
    CreateRoom {
        room_id: String,
        player_id: String,
        player_name: String,
    },
}

impl Command {
    /// Wire discriminator for this command.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::CreateConversation { .. } => "create_conversation",
            Command::CreateGroupConversation { .. } => "create_group_conversation",
            Command::SendMessage { .. } => "send_message",
            Command::CreateRoom { .. } => "create_room",
        }
    }

    /// Decodes one command line. Surrounding whitespace is ignored.
    pub fn parse(line: &str) -> Result<Command, ProtocolError> {
        let raw: RawCommand =
            serde_json::from_str(line.trim()).map_err(|_| ProtocolError::InvalidFormat)?;

        match raw.kind.as_str() {
            "create_conversation" => raw.into_create_conversation(),
            "create_group_conversation" => raw.into_create_group(),
            "send_message" => raw.into_send_message(),
            "create_room" => raw.into_create_room(),
            _ => Err(ProtocolError::UnknownCommand),
        }
    }
}

impl RawCommand {
    fn into_create_conversation(self) -> Result<Command, ProtocolError> {
        if self.sender_id.is_empty() || self.receiver_id.is_empty() {
            return Err(ProtocolError::MissingConversationFields);
        }

        match (
            ObjectId::parse_hex(&self.sender_id),
            ObjectId::parse_hex(&self.receiver_id),
        ) {
            (Ok(sender), Ok(receiver)) => Ok(Command::CreateConversation { sender, receiver }),
            _ => Err(ProtocolError::InvalidConversationIds),
        }
    }

    fn into_create_group(self) -> Result<Command, ProtocolError> {
        if self.title.is_empty() || self.creator_id.is_empty() || self.participant_ids.is_empty() {
            return Err(ProtocolError::MissingGroupFields);
        }

        let creator =
            ObjectId::parse_hex(&self.creator_id).map_err(|_| ProtocolError::InvalidCreatorId)?;

        let participants = self
            .participant_ids
            .iter()
            .map(|raw| {
                ObjectId::parse_hex(raw.trim())
                    .map_err(|_| ProtocolError::InvalidParticipantId(raw.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Command::CreateGroupConversation {
            title: self.title,
            creator,
            participants,
        })
    }

    fn into_send_message(self) -> Result<Command, ProtocolError> {
        if self.sender_id.is_empty() || self.conversation_id.is_empty() || self.content.is_empty() {
            return Err(ProtocolError::MissingMessageFields);
        }

        match (
            ObjectId::parse_hex(&self.sender_id),
            ObjectId::parse_hex(&self.conversation_id),
        ) {
            (Ok(sender), Ok(conversation)) => Ok(Command::SendMessage {
                sender,
                conversation,
                content: self.content,
            }),
            _ => Err(ProtocolError::InvalidMessageIds),
        }
    }

    fn into_create_room(self) -> Result<Command, ProtocolError> {
        if self.room_id.is_empty() || self.player_id.is_empty() || self.player_name.is_empty() {
            return Err(ProtocolError::MissingRoomFields);
        }

        Ok(Command::CreateRoom {
            room_id: self.room_id,
            player_id: self.player_id,
            player_name: self.player_name,
        })
    }
}
