use std::sync::Arc;

use log::info;
use thiserror::Error;

use crate::{
    events::CollabEvent, CollabContext, Database, DatabaseError, MemberRole, MessageData,
    ModerationError, PrimaryKey, RoomData, RoomMemberData, UserData,
};

pub struct RoomManager<Db> {
    context: CollabContext<Db>,
}

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("User is not a member of this room")]
    UserNotInRoom,
    #[error("Only the owner or a co-owner can do this")]
    NotManager,
    #[error("Only the owner can do this")]
    NotOwner,
    #[error("The room already has an owner")]
    OwnerExists,
    #[error("A room must keep exactly one owner")]
    SoleOwner,
    #[error("The owner must transfer ownership before being removed")]
    OwnerImmovable,
    #[error("This action cannot target yourself")]
    SelfTarget,
    #[error("A private room requires two distinct users")]
    SelfPairing,
    #[error(transparent)]
    Moderation(#[from] ModerationError),
    #[error(transparent)]
    Db(#[from] DatabaseError),
}

/// Resolves the role a user holds in a room, or [RoomError::UserNotInRoom].
pub(crate) async fn member_role<Db>(
    db: &Arc<Db>,
    room_id: PrimaryKey,
    user_id: PrimaryKey,
) -> Result<MemberRole, RoomError>
where
    Db: Database,
{
    db.member(room_id, user_id)
        .await
        .map(|m| m.role)
        .map_err(|e| match e {
            DatabaseError::NotFound { .. } => RoomError::UserNotInRoom,
            e => RoomError::Db(e),
        })
}

pub(crate) async fn require_member<Db>(
    db: &Arc<Db>,
    room_id: PrimaryKey,
    user_id: PrimaryKey,
) -> Result<(), RoomError>
where
    Db: Database,
{
    member_role(db, room_id, user_id).await.map(|_| ())
}

pub(crate) async fn require_manager<Db>(
    db: &Arc<Db>,
    room_id: PrimaryKey,
    user_id: PrimaryKey,
) -> Result<(), RoomError>
where
    Db: Database,
{
    let role = member_role(db, room_id, user_id).await?;

    if !role.can_manage() {
        return Err(RoomError::NotManager);
    }

    Ok(())
}

pub(crate) async fn require_owner<Db>(
    db: &Arc<Db>,
    room_id: PrimaryKey,
    user_id: PrimaryKey,
) -> Result<(), RoomError>
where
    Db: Database,
{
    let role = member_role(db, room_id, user_id).await?;

    if role != MemberRole::Owner {
        return Err(RoomError::NotOwner);
    }

    Ok(())
}

impl<Db> RoomManager<Db>
where
    Db: Database,
{
    pub fn new(context: &CollabContext<Db>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    pub async fn room_by_id(&self, room_id: PrimaryKey) -> Result<RoomData, RoomError> {
        Ok(self.context.database.room_by_id(room_id).await?)
    }

    pub async fn member(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<RoomMemberData, RoomError> {
        Ok(self.context.database.member(room_id, user_id).await?)
    }

    pub async fn require_member(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<(), RoomError> {
        require_member(&self.context.database, room_id, user_id).await
    }

    /// Renames a room. The new name passes the moderation gate before it is
    /// persisted.
    pub async fn rename_room(
        &self,
        room_id: PrimaryKey,
        actor_id: PrimaryKey,
        name: &str,
    ) -> Result<RoomData, RoomError> {
        self.context.moderation.ensure_clean(name)?;
        require_manager(&self.context.database, room_id, actor_id).await?;

        let room = self.context.database.rename_room(room_id, name).await?;

        self.context.emit(CollabEvent::RoomRenamed {
            room_id,
            new_name: room.name.clone(),
        });

        Ok(room)
    }

    /// Changes a member's role. Only managers may do this, and the room's
    /// exactly-one-owner invariant is preserved: assigning `owner` fails
    /// while another user holds it, and the sole owner cannot be demoted.
    pub async fn set_role(
        &self,
        room_id: PrimaryKey,
        actor_id: PrimaryKey,
        target_id: PrimaryKey,
        new_role: MemberRole,
    ) -> Result<RoomMemberData, RoomError> {
        require_manager(&self.context.database, room_id, actor_id).await?;

        let room = self.context.database.room_by_id(room_id).await?;
        let target = self.context.database.member(room_id, target_id).await?;

        if new_role == MemberRole::Owner {
            let other_owner = room
                .members
                .iter()
                .any(|m| m.role == MemberRole::Owner && m.user.id != target_id);

            if other_owner {
                return Err(RoomError::OwnerExists);
            }
        }

        if target.role == MemberRole::Owner && new_role != MemberRole::Owner {
            return Err(RoomError::SoleOwner);
        }

        // The database re-checks both guards inside its own transaction, so
        // concurrent promotions cannot both commit
        let member = self
            .context
            .database
            .set_member_role(room_id, target_id, new_role)
            .await?;

        self.context.emit(CollabEvent::RoleChanged {
            room_id,
            user_id: target_id,
            new_role,
        });

        Ok(member)
    }

    /// Atomically swaps ownership: the current owner becomes a co-owner and
    /// the target becomes the owner.
    pub async fn transfer_owner(
        &self,
        room_id: PrimaryKey,
        actor_id: PrimaryKey,
        target_id: PrimaryKey,
    ) -> Result<(), RoomError> {
        if actor_id == target_id {
            return Err(RoomError::SelfTarget);
        }

        require_owner(&self.context.database, room_id, actor_id).await?;

        // Prove the target is a member before attempting the swap
        let _ = self.context.database.member(room_id, target_id).await?;

        self.context
            .database
            .transfer_owner(room_id, actor_id, target_id)
            .await?;

        info!(
            "Ownership of room {} transferred from user {} to user {}",
            room_id, actor_id, target_id
        );

        self.context.emit(CollabEvent::OwnerTransferred {
            room_id,
            from_user: actor_id,
            to_user: target_id,
        });

        Ok(())
    }

    /// Removes a member from a room. Managers cannot remove themselves
    /// through this path, and the owner must transfer ownership first.
    pub async fn remove_member(
        &self,
        room_id: PrimaryKey,
        actor_id: PrimaryKey,
        target_id: PrimaryKey,
    ) -> Result<(), RoomError> {
        require_manager(&self.context.database, room_id, actor_id).await?;

        if actor_id == target_id {
            return Err(RoomError::SelfTarget);
        }

        let target = self.context.database.member(room_id, target_id).await?;

        if target.role == MemberRole::Owner {
            return Err(RoomError::OwnerImmovable);
        }

        self.context
            .database
            .delete_room_member(room_id, target_id)
            .await?;

        self.context.emit(CollabEvent::MemberLeft {
            room_id,
            user_id: target_id,
        });

        Ok(())
    }

    /// Returns the private room shared with the target, creating it if the
    /// pair doesn't have one yet. Calling this twice returns the same room.
    pub async fn create_private_room(
        &self,
        actor: &UserData,
        target_id: PrimaryKey,
    ) -> Result<RoomData, RoomError> {
        if actor.id == target_id {
            return Err(RoomError::SelfPairing);
        }

        // Surface a not-found for the target before creating anything
        let _ = self.context.database.user_by_id(target_id).await?;

        let room = self
            .context
            .database
            .private_room(actor.id, target_id)
            .await?;

        Ok(room)
    }

    pub async fn private_rooms(&self, user_id: PrimaryKey) -> Result<Vec<RoomData>, RoomError> {
        Ok(self.context.database.private_rooms_of(user_id).await?)
    }

    pub async fn private_room_with(
        &self,
        user_id: PrimaryKey,
        target_id: PrimaryKey,
    ) -> Result<RoomData, RoomError> {
        Ok(self
            .context
            .database
            .private_room_between(user_id, target_id)
            .await?)
    }

    /// Room history, oldest first. Only members can read it.
    pub async fn messages(
        &self,
        room_id: PrimaryKey,
        actor_id: PrimaryKey,
        limit: i64,
    ) -> Result<Vec<MessageData>, RoomError> {
        let _ = self.context.database.room_by_id(room_id).await?;
        require_member(&self.context.database, room_id, actor_id).await?;

        Ok(self
            .context
            .database
            .messages_by_room(room_id, limit)
            .await?)
    }
}
