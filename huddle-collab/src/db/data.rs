use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The type used for primary keys in the database.
pub type PrimaryKey = i32;

/// A huddle account
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserData {
    pub id: PrimaryKey,
    pub username: String,
    pub email: String,
    pub password: String,
    pub display_name: String,
    pub superuser: bool,
    /// The top-level team this user belongs to, if any.
    /// Sub-team access is tracked through room memberships, never here.
    pub team_id: Option<PrimaryKey>,
}

/// Login session data for authentication
#[derive(Debug, Clone)]
pub struct SessionData {
    pub id: PrimaryKey,
    /// The session token, or key if you will
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// The user that is logged in
    pub user: UserData,
}

/// What a chat room is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    /// The room belongs to a team.
    Team,
    /// The room belongs to a pair of users.
    Private,
}

/// The role a member holds within a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Owner,
    CoOwner,
    Member,
}

impl MemberRole {
    /// Owners and co-owners can administrate a room.
    pub fn can_manage(&self) -> bool {
        matches!(self, Self::Owner | Self::CoOwner)
    }
}

/// The lifecycle of an invitation. `Pending` is the only live state,
/// everything else is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

impl InviteStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// The only allowed transitions are `pending -> accepted | rejected | expired`.
    pub fn can_transition_to(&self, next: InviteStatus) -> bool {
        matches!(self, Self::Pending) && next.is_terminal()
    }
}

/// A huddle chat room
#[derive(Debug, Clone)]
pub struct RoomData {
    pub id: PrimaryKey,
    pub kind: RoomKind,
    pub name: String,
    /// Set iff `kind` is [RoomKind::Team]
    pub team_id: Option<PrimaryKey>,
    pub members: Vec<RoomMemberData>,
}

/// A member of a room
#[derive(Debug, Clone)]
pub struct RoomMemberData {
    pub id: PrimaryKey,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
    pub user: UserData,
}

/// The unique pairing behind a private room. `user_one_id` is always the
/// smaller of the two ids.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PrivateChatData {
    pub id: PrimaryKey,
    pub user_one_id: PrimaryKey,
    pub user_two_id: PrimaryKey,
    pub room_id: PrimaryKey,
}

/// A team, possibly a sub-team of another team
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TeamData {
    pub id: PrimaryKey,
    pub name: String,
    pub description: Option<String>,
    pub grade: i32,
    pub is_public: bool,
    pub parent_team_id: Option<PrimaryKey>,
}

/// An invitation into a team
#[derive(Debug, Clone)]
pub struct TeamInviteData {
    pub id: PrimaryKey,
    pub team_id: PrimaryKey,
    pub inviter: UserData,
    /// Exactly one of `user_id` and `email` is set
    pub user_id: Option<PrimaryKey>,
    pub email: Option<String>,
    pub message: Option<String>,
    pub status: InviteStatus,
    pub expires_at: DateTime<Utc>,
}

/// An invitation to become mutual friends with another user
#[derive(Debug, Clone)]
pub struct FriendInviteData {
    pub id: PrimaryKey,
    pub inviter: UserData,
    /// Exactly one of `user_id` and `email` is set
    pub user_id: Option<PrimaryKey>,
    pub email: Option<String>,
    pub message: Option<String>,
    pub status: InviteStatus,
    pub expires_at: DateTime<Utc>,
}

/// A chat message. Append-only, never mutated after creation.
#[derive(Debug, Clone)]
pub struct MessageData {
    pub id: PrimaryKey,
    pub room_id: PrimaryKey,
    pub sender: UserData,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A team-scoped announcement
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AnnouncementData {
    pub id: PrimaryKey,
    pub team_id: PrimaryKey,
    pub author_id: PrimaryKey,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A project result recorded against a team
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProjectResultData {
    pub id: PrimaryKey,
    pub team_id: PrimaryKey,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub display_name: String,
    pub superuser: bool,
}

#[derive(Debug)]
pub struct NewSession {
    pub token: String,
    pub user_id: PrimaryKey,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewTeam {
    pub name: String,
    pub description: Option<String>,
    pub grade: i32,
    pub is_public: bool,
    pub parent_team_id: Option<PrimaryKey>,
    /// The owner of the new team's room
    pub user_id: PrimaryKey,
    /// When set, the owner's `team_id` pointer is set to this team id
    /// if it is currently null
    pub assign_pointer: bool,
}

#[derive(Debug)]
pub struct NewRoomMember {
    pub room_id: PrimaryKey,
    pub user_id: PrimaryKey,
    pub role: MemberRole,
}

#[derive(Debug)]
pub struct NewTeamInvite {
    pub team_id: PrimaryKey,
    pub inviter_id: PrimaryKey,
    pub user_id: Option<PrimaryKey>,
    pub email: Option<String>,
    pub message: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewFriendInvite {
    pub inviter_id: PrimaryKey,
    pub user_id: Option<PrimaryKey>,
    pub email: Option<String>,
    pub message: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewMessage {
    pub room_id: PrimaryKey,
    pub sender_id: PrimaryKey,
    pub content: String,
}

#[derive(Debug)]
pub struct NewAnnouncement {
    pub team_id: PrimaryKey,
    pub author_id: PrimaryKey,
    pub content: String,
}

#[derive(Debug)]
pub struct NewProjectResult {
    pub team_id: PrimaryKey,
    pub name: String,
}
