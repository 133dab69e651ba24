//! All schemas that are exposed from endpoints are defined here
//! along with the conversions from collab data

use chrono::{DateTime, Utc};
use huddle_collab::{
    AnnouncementData, FriendInviteData, InviteStatus, MemberRole, MessageData, RoomData,
    RoomKind, RoomMemberData, SessionData, TeamData, TeamInviteData, UserData,
};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct User {
    id: i32,
    username: String,
    display_name: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoginResult {
    token: String,
    user: User,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Room {
    id: i32,
    kind: &'static str,
    name: String,
    team_id: Option<i32>,
    members: Vec<RoomMember>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoomMember {
    id: i32,
    role: &'static str,
    joined_at: DateTime<Utc>,
    user: User,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Team {
    id: i32,
    name: String,
    description: Option<String>,
    grade: i32,
    is_public: bool,
    parent_team_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TeamInvite {
    id: i32,
    team_id: i32,
    inviter: User,
    user_id: Option<i32>,
    email: Option<String>,
    message: Option<String>,
    status: &'static str,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FriendInvite {
    id: i32,
    inviter: User,
    user_id: Option<i32>,
    email: Option<String>,
    message: Option<String>,
    status: &'static str,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Message {
    id: i32,
    room_id: i32,
    sender: User,
    content: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Announcement {
    id: i32,
    team_id: i32,
    author_id: i32,
    content: String,
    created_at: DateTime<Utc>,
}

fn kind_str(kind: RoomKind) -> &'static str {
    match kind {
        RoomKind::Team => "team",
        RoomKind::Private => "private",
    }
}

pub(crate) fn role_str(role: MemberRole) -> &'static str {
    match role {
        MemberRole::Owner => "owner",
        MemberRole::CoOwner => "co_owner",
        MemberRole::Member => "member",
    }
}

fn status_str(status: InviteStatus) -> &'static str {
    match status {
        InviteStatus::Pending => "pending",
        InviteStatus::Accepted => "accepted",
        InviteStatus::Rejected => "rejected",
        InviteStatus::Expired => "expired",
    }
}

/// Helper trait to convert any type into a serialized version
pub trait ToSerialized<T>
where
    T: Serialize,
{
    fn to_serialized(&self) -> T;
}

impl<I, O> ToSerialized<Vec<O>> for Vec<I>
where
    I: ToSerialized<O>,
    O: Serialize,
{
    fn to_serialized(&self) -> Vec<O> {
        self.iter().map(|x| x.to_serialized()).collect()
    }
}

impl ToSerialized<User> for UserData {
    fn to_serialized(&self) -> User {
        User {
            id: self.id,
            username: self.username.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

impl ToSerialized<LoginResult> for SessionData {
    fn to_serialized(&self) -> LoginResult {
        LoginResult {
            token: self.token.clone(),
            user: self.user.to_serialized(),
        }
    }
}

impl ToSerialized<Room> for RoomData {
    fn to_serialized(&self) -> Room {
        Room {
            id: self.id,
            kind: kind_str(self.kind),
            name: self.name.clone(),
            team_id: self.team_id,
            members: self.members.to_serialized(),
        }
    }
}

impl ToSerialized<RoomMember> for RoomMemberData {
    fn to_serialized(&self) -> RoomMember {
        RoomMember {
            id: self.id,
            role: role_str(self.role),
            joined_at: self.joined_at,
            user: self.user.to_serialized(),
        }
    }
}

impl ToSerialized<Team> for TeamData {
    fn to_serialized(&self) -> Team {
        Team {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            grade: self.grade,
            is_public: self.is_public,
            parent_team_id: self.parent_team_id,
        }
    }
}

impl ToSerialized<TeamInvite> for TeamInviteData {
    fn to_serialized(&self) -> TeamInvite {
        TeamInvite {
            id: self.id,
            team_id: self.team_id,
            inviter: self.inviter.to_serialized(),
            user_id: self.user_id,
            email: self.email.clone(),
            message: self.message.clone(),
            status: status_str(self.status),
            expires_at: self.expires_at,
        }
    }
}

impl ToSerialized<FriendInvite> for FriendInviteData {
    fn to_serialized(&self) -> FriendInvite {
        FriendInvite {
            id: self.id,
            inviter: self.inviter.to_serialized(),
            user_id: self.user_id,
            email: self.email.clone(),
            message: self.message.clone(),
            status: status_str(self.status),
            expires_at: self.expires_at,
        }
    }
}

impl ToSerialized<Message> for MessageData {
    fn to_serialized(&self) -> Message {
        Message {
            id: self.id,
            room_id: self.room_id,
            sender: self.sender.to_serialized(),
            content: self.content.clone(),
            created_at: self.created_at,
        }
    }
}

impl ToSerialized<Announcement> for AnnouncementData {
    fn to_serialized(&self) -> Announcement {
        Announcement {
            id: self.id,
            team_id: self.team_id,
            author_id: self.author_id,
            content: self.content.clone(),
            created_at: self.created_at,
        }
    }
}
