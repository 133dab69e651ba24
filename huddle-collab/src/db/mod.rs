use async_trait::async_trait;
use thiserror::Error;

mod data;
pub use data::*;

mod pg;
pub use pg::*;

#[cfg(test)]
mod memory;
#[cfg(test)]
pub use memory::MemoryDatabase;

pub type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists, or an invariant would be violated
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
    /// A referential constraint blocked a delete
    #[error("operation blocked by dependent {relation} records")]
    Dependency { relation: String },
}

/// Helper trait to reduce boilerplate
pub trait IntoDatabaseError {
    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError;
    fn any(self) -> DatabaseError;
}

/// Helper trait to reduce boilerplate
pub trait DatabaseResult {
    /// Turns the Result into a conflict error if it's Ok()
    fn conflict_or_ok(self, resource: &'static str, field: &'static str, value: &str)
        -> Result<()>;
}

impl<T> DatabaseResult for Result<T> {
    fn conflict_or_ok(
        self,
        resource: &'static str,
        field: &'static str,
        value: &str,
    ) -> Result<()> {
        match self {
            Ok(_) => Err(DatabaseError::Conflict {
                resource,
                field,
                value: value.to_string(),
            }),
            Err(e) => match e {
                DatabaseError::NotFound { .. } => Ok(()),
                e => Err(e),
            },
        }
    }
}

/// Represents a type that can fetch and mutate huddle data in a database.
///
/// Compound operations (ownership transfer, invitation accepts, the team
/// cascade) are single methods so implementations can make them atomic.
#[async_trait]
pub trait Database: Send + Sync + 'static {
    async fn check_for_superuser(&self) -> Result<bool>;
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData>;
    async fn user_by_username(&self, username: &str) -> Result<UserData>;
    async fn user_by_email(&self, email: &str) -> Result<UserData>;
    async fn create_user(&self, new_user: NewUser) -> Result<UserData>;

    async fn session_by_token(&self, token: &str) -> Result<SessionData>;
    async fn create_session(&self, new_session: NewSession) -> Result<SessionData>;
    async fn delete_session_by_token(&self, token: &str) -> Result<()>;
    async fn clear_expired_sessions(&self) -> Result<()>;

    async fn room_by_id(&self, room_id: PrimaryKey) -> Result<RoomData>;
    async fn room_of_team(&self, team_id: PrimaryKey) -> Result<RoomData>;
    async fn rename_room(&self, room_id: PrimaryKey, name: &str) -> Result<RoomData>;
    async fn member(&self, room_id: PrimaryKey, user_id: PrimaryKey) -> Result<RoomMemberData>;
    async fn create_room_member(&self, new_member: NewRoomMember) -> Result<RoomMemberData>;
    async fn delete_room_member(&self, room_id: PrimaryKey, user_id: PrimaryKey) -> Result<()>;
    /// Updates a member's role. Fails with a conflict if the room would
    /// end up with zero or more than one owner.
    async fn set_member_role(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
        role: MemberRole,
    ) -> Result<RoomMemberData>;
    /// Atomic two-row swap: `from_user` becomes co-owner, `to_user` becomes
    /// owner, in the same transaction.
    async fn transfer_owner(
        &self,
        room_id: PrimaryKey,
        from_user: PrimaryKey,
        to_user: PrimaryKey,
    ) -> Result<()>;

    /// Returns the private room for the unordered pair, creating it (room,
    /// pairing, and both member rows) if it doesn't exist yet. The first
    /// user is the caller and becomes the room's owner on creation.
    async fn private_room(&self, user_a: PrimaryKey, user_b: PrimaryKey) -> Result<RoomData>;
    async fn private_room_between(
        &self,
        user_a: PrimaryKey,
        user_b: PrimaryKey,
    ) -> Result<RoomData>;
    async fn private_rooms_of(&self, user_id: PrimaryKey) -> Result<Vec<RoomData>>;

    async fn team_by_id(&self, team_id: PrimaryKey) -> Result<TeamData>;
    async fn team_by_name(&self, name: &str) -> Result<TeamData>;
    /// Creates the team, its room, and the owner membership in one
    /// transaction. Optionally assigns the owner's `team_id` pointer.
    async fn create_team(&self, new_team: NewTeam) -> Result<TeamData>;
    async fn sub_teams_of(&self, team_id: PrimaryKey) -> Result<Vec<TeamData>>;
    async fn set_team_parent(
        &self,
        team_id: PrimaryKey,
        parent_team_id: Option<PrimaryKey>,
    ) -> Result<TeamData>;
    /// Removes a set of teams and everything they own in dependency order,
    /// in one transaction. `team_ids` and `room_ids` must already cover the
    /// whole sub-tree; `users.team_id` pointers into the set are cleared
    /// before memberships are deleted.
    async fn delete_team_tree(
        &self,
        team_ids: &[PrimaryKey],
        room_ids: &[PrimaryKey],
    ) -> Result<()>;

    async fn team_invite_by_id(&self, invite_id: PrimaryKey) -> Result<TeamInviteData>;
    /// Finds a pending invitation with the exact same scope, inviter, and
    /// target. Used for duplicate detection.
    async fn live_team_invite(
        &self,
        team_id: PrimaryKey,
        inviter_id: PrimaryKey,
        user_id: Option<PrimaryKey>,
        email: Option<&str>,
    ) -> Result<TeamInviteData>;
    async fn team_invites_for_team(&self, team_id: PrimaryKey) -> Result<Vec<TeamInviteData>>;
    async fn team_invites_for_user(
        &self,
        user_id: PrimaryKey,
        email: &str,
    ) -> Result<Vec<TeamInviteData>>;
    async fn create_team_invite(&self, new_invite: NewTeamInvite) -> Result<TeamInviteData>;
    /// Conditional status update, guarded on the current status so an
    /// invitation can never be consumed twice.
    async fn set_team_invite_status(
        &self,
        invite_id: PrimaryKey,
        from: InviteStatus,
        to: InviteStatus,
    ) -> Result<()>;
    /// Flips the invitation to accepted and creates the membership in one
    /// transaction. When `team_pointer` is set, the member's `team_id` is
    /// assigned if it is currently null.
    async fn accept_team_invite(
        &self,
        invite_id: PrimaryKey,
        new_member: NewRoomMember,
        team_pointer: Option<PrimaryKey>,
    ) -> Result<RoomMemberData>;

    async fn friend_invite_by_id(&self, invite_id: PrimaryKey) -> Result<FriendInviteData>;
    async fn live_friend_invite(
        &self,
        inviter_id: PrimaryKey,
        user_id: Option<PrimaryKey>,
        email: Option<&str>,
    ) -> Result<FriendInviteData>;
    async fn friend_invites_for_user(
        &self,
        user_id: PrimaryKey,
        email: &str,
    ) -> Result<Vec<FriendInviteData>>;
    async fn create_friend_invite(&self, new_invite: NewFriendInvite) -> Result<FriendInviteData>;
    async fn set_friend_invite_status(
        &self,
        invite_id: PrimaryKey,
        from: InviteStatus,
        to: InviteStatus,
    ) -> Result<()>;
    /// Flips the invitation to accepted and creates both directions of the
    /// follow relation in one transaction.
    async fn accept_friend_invite(
        &self,
        invite_id: PrimaryKey,
        user_a: PrimaryKey,
        user_b: PrimaryKey,
    ) -> Result<()>;
    async fn is_following(
        &self,
        follower_id: PrimaryKey,
        followee_id: PrimaryKey,
    ) -> Result<bool>;

    async fn create_message(&self, new_message: NewMessage) -> Result<MessageData>;
    async fn message_by_id(&self, message_id: PrimaryKey) -> Result<MessageData>;
    async fn messages_by_room(&self, room_id: PrimaryKey, limit: i64) -> Result<Vec<MessageData>>;

    async fn create_announcement(&self, new: NewAnnouncement) -> Result<AnnouncementData>;
    async fn announcements_of_team(&self, team_id: PrimaryKey) -> Result<Vec<AnnouncementData>>;
    async fn create_project_result(&self, new: NewProjectResult) -> Result<ProjectResultData>;
    async fn project_results_of_team(&self, team_id: PrimaryKey)
        -> Result<Vec<ProjectResultData>>;
}
