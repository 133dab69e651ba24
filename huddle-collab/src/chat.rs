use log::info;
use thiserror::Error;

use crate::{
    events::CollabEvent, rooms::require_member, CollabContext, Database, DatabaseError,
    MessageData, ModerationError, NewMessage, PrimaryKey, RoomError, UserData,
};

pub struct ChatService<Db> {
    context: CollabContext<Db>,
}

#[derive(Debug, Error)]
pub enum ChatError {
    /// The moderation gate flagged the content; nothing was persisted
    #[error(transparent)]
    Flagged(#[from] ModerationError),
    #[error(transparent)]
    Room(#[from] RoomError),
    #[error(transparent)]
    Db(#[from] DatabaseError),
}

impl<Db> ChatService<Db>
where
    Db: Database,
{
    pub fn new(context: &CollabContext<Db>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Accepts a message for a room: the sender must be a member, the
    /// content passes the moderation gate, and the persisted row is
    /// reloaded with the sender's identity before it fans out.
    pub async fn send_message(
        &self,
        room_id: PrimaryKey,
        sender: &UserData,
        content: &str,
    ) -> Result<MessageData, ChatError> {
        let room = self.context.database.room_by_id(room_id).await?;

        require_member(&self.context.database, room.id, sender.id).await?;

        self.context.moderation.ensure_clean(content)?;

        let message = self
            .context
            .database
            .create_message(NewMessage {
                room_id: room.id,
                sender_id: sender.id,
                content: content.to_string(),
            })
            .await?;

        info!("User {} sent a message to room {}", sender.username, room.id);

        self.context.emit(CollabEvent::MessageSent {
            room_id: room.id,
            message: message.clone(),
        });

        Ok(message)
    }
}
