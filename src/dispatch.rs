use std::sync::Arc;

use log::{debug, error};

use crate::models::NewMessage;
use crate::protocol::Command;
use crate::room::{ConnectionId, Player, RoomRegistry};
use crate::service::{ConversationService, MessageService};

/// Routes each command line to exactly one handler and renders its reply.
#[derive(Clone)]
pub struct Dispatcher {
    rooms: Arc<RoomRegistry>,
    conversations: ConversationService,
    messages: MessageService,
}

/// Keeps a reply on one line even when an embedded error message is not.
fn single_line(reply: String) -> String {
    if reply.contains(['\n', '\r']) {
        reply.replace(['\n', '\r'], " ")
    } else {
        reply
    }
}

impl Dispatcher {
    pub fn new(
        rooms: Arc<RoomRegistry>,
        conversations: ConversationService,
        messages: MessageService,
    ) -> Self {
        Dispatcher {
            rooms,
            conversations,
            messages,
        }
    }

    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.rooms
    }

    /// Handles one raw line from `connection` and returns the reply text,
    /// without a trailing newline.
    pub async fn handle_line(&self, line: &str, connection: ConnectionId) -> String {
        let reply = match Command::parse(line) {
            Ok(command) => {
                debug!("Dispatching {} for {}", command.kind(), connection);
                self.execute(command, connection).await
            }
            Err(e) => e.to_string(),
        };
        single_line(reply)
    }

    async fn execute(&self, command: Command, connection: ConnectionId) -> String {
        match command {
            Command::CreateConversation { sender, receiver } => {
                match self
                    .conversations
                    .create_private_conversation(sender, receiver)
                    .await
                {
                    Ok(convo) => format!("Conversation created with ID: {}", convo.id),
                    Err(e) => {
                        error!("Failed to create conversation: {}", e);
                        format!("Error creating conversation: {e}")
                    }
                }
            }

            Command::CreateGroupConversation {
                title,
                creator,
                participants,
            } => {
                match self
                    .conversations
                    .create_group_conversation(&title, creator, &participants)
                    .await
                {
                    Ok(convo) => format!("Group conversation created with ID: {}", convo.id),
                    Err(e) => {
                        error!("Failed to create group conversation: {}", e);
                        format!("Error creating group conversation: {e}")
                    }
                }
            }

            Command::SendMessage {
                sender,
                conversation,
                content,
            } => {
                let new = NewMessage {
                    conversation_id: conversation,
                    sender_id: sender,
                    content,
                    attachment_url: None,
                };
                match self.messages.create_message(new).await {
                    Ok(saved) => format!("Message saved with ID: {}", saved.id),
                    Err(e) => {
                        error!("Failed to save message: {}", e);
                        format!("Error saving message: {e}")
                    }
                }
            }

            Command::CreateRoom {
                room_id,
                player_id,
                player_name,
            } => {
                let player = Player::new(player_id, player_name, connection);
                self.rooms.join(&room_id, player).await;
                format!("Room created and player joined: {room_id}")
            }
        }
    }
}
