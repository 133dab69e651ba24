//! An in-memory [Database] used by unit tests. One mutex over the whole
//! store stands in for the transactional isolation the postgres
//! implementation gets from the database.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::{
    AnnouncementData, Database, DatabaseError, FriendInviteData, InviteStatus, MemberRole,
    MessageData, NewAnnouncement, NewFriendInvite, NewMessage, NewProjectResult, NewRoomMember,
    NewSession, NewTeam, NewTeamInvite, NewUser, PrimaryKey, ProjectResultData, Result, RoomData,
    RoomKind, RoomMemberData, SessionData, TeamData, TeamInviteData, UserData,
};

#[derive(Debug, Clone)]
struct StoredRoom {
    id: PrimaryKey,
    kind: RoomKind,
    name: String,
    team_id: Option<PrimaryKey>,
}

#[derive(Debug, Clone)]
struct StoredMember {
    id: PrimaryKey,
    room_id: PrimaryKey,
    user_id: PrimaryKey,
    role: MemberRole,
    joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredSession {
    id: PrimaryKey,
    token: String,
    user_id: PrimaryKey,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredPrivateChat {
    user_one_id: PrimaryKey,
    user_two_id: PrimaryKey,
    room_id: PrimaryKey,
}

#[derive(Debug, Clone)]
struct StoredInvite {
    id: PrimaryKey,
    /// Zero for friend invites
    team_id: PrimaryKey,
    inviter_id: PrimaryKey,
    user_id: Option<PrimaryKey>,
    email: Option<String>,
    message: Option<String>,
    status: InviteStatus,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    id: PrimaryKey,
    room_id: PrimaryKey,
    sender_id: PrimaryKey,
    content: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    users: HashMap<PrimaryKey, UserData>,
    sessions: Vec<StoredSession>,
    rooms: HashMap<PrimaryKey, StoredRoom>,
    members: Vec<StoredMember>,
    private_chats: Vec<StoredPrivateChat>,
    teams: HashMap<PrimaryKey, TeamData>,
    team_invites: HashMap<PrimaryKey, StoredInvite>,
    friend_invites: HashMap<PrimaryKey, StoredInvite>,
    messages: Vec<StoredMessage>,
    announcements: Vec<AnnouncementData>,
    project_results: Vec<ProjectResultData>,
    follows: Vec<(PrimaryKey, PrimaryKey)>,
    next_id: PrimaryKey,
}

impl State {
    fn next_id(&mut self) -> PrimaryKey {
        self.next_id += 1;
        self.next_id
    }

    fn user(&self, user_id: PrimaryKey) -> Result<UserData> {
        self.users
            .get(&user_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            })
    }

    fn member_data(&self, member: &StoredMember) -> Result<RoomMemberData> {
        Ok(RoomMemberData {
            id: member.id,
            role: member.role,
            joined_at: member.joined_at,
            user: self.user(member.user_id)?,
        })
    }

    fn member_of(&self, room_id: PrimaryKey, user_id: PrimaryKey) -> Result<RoomMemberData> {
        self.members
            .iter()
            .find(|m| m.room_id == room_id && m.user_id == user_id)
            .ok_or(DatabaseError::NotFound {
                resource: "room member",
                identifier: "room_id:user_id",
            })
            .and_then(|m| self.member_data(m))
    }

    fn room_data(&self, room: &StoredRoom) -> Result<RoomData> {
        let members = self
            .members
            .iter()
            .filter(|m| m.room_id == room.id)
            .map(|m| self.member_data(m))
            .collect::<Result<Vec<_>>>()?;

        Ok(RoomData {
            id: room.id,
            kind: room.kind,
            name: room.name.clone(),
            team_id: room.team_id,
            members,
        })
    }

    fn room(&self, room_id: PrimaryKey) -> Result<RoomData> {
        self.rooms
            .get(&room_id)
            .ok_or(DatabaseError::NotFound {
                resource: "room",
                identifier: "id",
            })
            .and_then(|r| self.room_data(r))
    }

    fn insert_member(&mut self, new_member: &NewRoomMember) -> Result<RoomMemberData> {
        if self
            .member_of(new_member.room_id, new_member.user_id)
            .is_ok()
        {
            return Err(DatabaseError::Conflict {
                resource: "room member",
                field: "user:room",
                value: format!("{}:{}", new_member.user_id, new_member.room_id),
            });
        }

        let member = StoredMember {
            id: self.next_id(),
            room_id: new_member.room_id,
            user_id: new_member.user_id,
            role: new_member.role,
            joined_at: Utc::now(),
        };

        self.members.push(member.clone());
        self.member_data(&member)
    }

    fn team_invite_data(&self, invite: &StoredInvite) -> Result<TeamInviteData> {
        Ok(TeamInviteData {
            id: invite.id,
            team_id: invite.team_id,
            inviter: self.user(invite.inviter_id)?,
            user_id: invite.user_id,
            email: invite.email.clone(),
            message: invite.message.clone(),
            status: invite.status,
            expires_at: invite.expires_at,
        })
    }

    fn friend_invite_data(&self, invite: &StoredInvite) -> Result<FriendInviteData> {
        Ok(FriendInviteData {
            id: invite.id,
            inviter: self.user(invite.inviter_id)?,
            user_id: invite.user_id,
            email: invite.email.clone(),
            message: invite.message.clone(),
            status: invite.status,
            expires_at: invite.expires_at,
        })
    }

    fn message_data(&self, message: &StoredMessage) -> Result<MessageData> {
        Ok(MessageData {
            id: message.id,
            room_id: message.room_id,
            sender: self.user(message.sender_id)?,
            content: message.content.clone(),
            created_at: message.created_at,
        })
    }

    fn consume_invite(
        invites: &mut HashMap<PrimaryKey, StoredInvite>,
        resource: &'static str,
        invite_id: PrimaryKey,
        from: InviteStatus,
        to: InviteStatus,
    ) -> Result<StoredInvite> {
        let invite = invites.get_mut(&invite_id).ok_or(DatabaseError::NotFound {
            resource,
            identifier: "id",
        })?;

        if invite.status != from || !invite.status.can_transition_to(to) {
            return Err(DatabaseError::Conflict {
                resource,
                field: "status",
                value: "not pending".to_string(),
            });
        }

        invite.status = to;
        Ok(invite.clone())
    }
}

#[derive(Default)]
pub struct MemoryDatabase {
    state: Mutex<State>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn check_for_superuser(&self) -> Result<bool> {
        Ok(self.state.lock().users.values().any(|u| u.superuser))
    }

    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        self.state.lock().user(user_id)
    }

    async fn user_by_username(&self, username: &str) -> Result<UserData> {
        self.state
            .lock()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "username",
            })
    }

    async fn user_by_email(&self, email: &str) -> Result<UserData> {
        self.state
            .lock()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "email",
            })
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        let mut state = self.state.lock();

        if state.users.values().any(|u| u.username == new_user.username) {
            return Err(DatabaseError::Conflict {
                resource: "user",
                field: "username",
                value: new_user.username,
            });
        }

        if state.users.values().any(|u| u.email == new_user.email) {
            return Err(DatabaseError::Conflict {
                resource: "user",
                field: "email",
                value: new_user.email,
            });
        }

        let id = state.next_id();
        let user = UserData {
            id,
            username: new_user.username,
            email: new_user.email,
            password: new_user.password,
            display_name: new_user.display_name,
            superuser: new_user.superuser,
            team_id: None,
        };

        state.users.insert(id, user.clone());
        Ok(user)
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        let state = self.state.lock();

        let session = state
            .sessions
            .iter()
            .find(|s| s.token == token)
            .ok_or(DatabaseError::NotFound {
                resource: "session",
                identifier: "token",
            })?;

        Ok(SessionData {
            id: session.id,
            token: session.token.clone(),
            expires_at: session.expires_at,
            user: state.user(session.user_id)?,
        })
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        let token = {
            let mut state = self.state.lock();

            if state.sessions.iter().any(|s| s.token == new_session.token) {
                return Err(DatabaseError::Conflict {
                    resource: "session",
                    field: "token",
                    value: new_session.token,
                });
            }

            let id = state.next_id();
            state.sessions.push(StoredSession {
                id,
                token: new_session.token.clone(),
                user_id: new_session.user_id,
                expires_at: new_session.expires_at,
            });

            new_session.token
        };

        self.session_by_token(&token).await
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        let mut state = self.state.lock();

        let before = state.sessions.len();
        state.sessions.retain(|s| s.token != token);

        if state.sessions.len() == before {
            return Err(DatabaseError::NotFound {
                resource: "session",
                identifier: "token",
            });
        }

        Ok(())
    }

    async fn clear_expired_sessions(&self) -> Result<()> {
        let now = Utc::now();
        self.state.lock().sessions.retain(|s| s.expires_at > now);
        Ok(())
    }

    async fn room_by_id(&self, room_id: PrimaryKey) -> Result<RoomData> {
        self.state.lock().room(room_id)
    }

    async fn room_of_team(&self, team_id: PrimaryKey) -> Result<RoomData> {
        let state = self.state.lock();

        state
            .rooms
            .values()
            .find(|r| r.team_id == Some(team_id))
            .ok_or(DatabaseError::NotFound {
                resource: "room",
                identifier: "team_id",
            })
            .and_then(|r| state.room_data(r))
    }

    async fn rename_room(&self, room_id: PrimaryKey, name: &str) -> Result<RoomData> {
        let mut state = self.state.lock();

        let room = state.rooms.get_mut(&room_id).ok_or(DatabaseError::NotFound {
            resource: "room",
            identifier: "id",
        })?;

        room.name = name.to_string();
        state.room(room_id)
    }

    async fn member(&self, room_id: PrimaryKey, user_id: PrimaryKey) -> Result<RoomMemberData> {
        self.state.lock().member_of(room_id, user_id)
    }

    async fn create_room_member(&self, new_member: NewRoomMember) -> Result<RoomMemberData> {
        self.state.lock().insert_member(&new_member)
    }

    async fn delete_room_member(&self, room_id: PrimaryKey, user_id: PrimaryKey) -> Result<()> {
        let mut state = self.state.lock();

        let before = state.members.len();
        state
            .members
            .retain(|m| !(m.room_id == room_id && m.user_id == user_id));

        if state.members.len() == before {
            return Err(DatabaseError::NotFound {
                resource: "room member",
                identifier: "room_id:user_id",
            });
        }

        Ok(())
    }

    async fn set_member_role(
        &self,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
        role: MemberRole,
    ) -> Result<RoomMemberData> {
        let mut state = self.state.lock();

        let current = state.member_of(room_id, user_id)?.role;

        if role == MemberRole::Owner && current != MemberRole::Owner {
            let other_owner = state
                .members
                .iter()
                .any(|m| m.room_id == room_id && m.role == MemberRole::Owner && m.user_id != user_id);

            if other_owner {
                return Err(DatabaseError::Conflict {
                    resource: "room member",
                    field: "role",
                    value: "owner".to_string(),
                });
            }
        }

        if current == MemberRole::Owner && role != MemberRole::Owner {
            return Err(DatabaseError::Conflict {
                resource: "room",
                field: "owner",
                value: user_id.to_string(),
            });
        }

        let member = state
            .members
            .iter_mut()
            .find(|m| m.room_id == room_id && m.user_id == user_id)
            .expect("member exists after role check");

        member.role = role;
        state.member_of(room_id, user_id)
    }

    async fn transfer_owner(
        &self,
        room_id: PrimaryKey,
        from_user: PrimaryKey,
        to_user: PrimaryKey,
    ) -> Result<()> {
        let mut state = self.state.lock();

        let from_role = state.member_of(room_id, from_user)?.role;

        if from_role != MemberRole::Owner {
            return Err(DatabaseError::Conflict {
                resource: "room",
                field: "owner",
                value: from_user.to_string(),
            });
        }

        let _ = state.member_of(room_id, to_user)?;

        for member in state.members.iter_mut() {
            if member.room_id != room_id {
                continue;
            }

            if member.user_id == from_user {
                member.role = MemberRole::CoOwner;
            } else if member.user_id == to_user {
                member.role = MemberRole::Owner;
            }
        }

        Ok(())
    }

    async fn private_room(&self, user_a: PrimaryKey, user_b: PrimaryKey) -> Result<RoomData> {
        if let Ok(existing) = self.private_room_between(user_a, user_b).await {
            return Ok(existing);
        }

        let mut state = self.state.lock();

        let first = state.user(user_a)?;
        let second = state.user(user_b)?;

        let (lo, hi) = if user_a < user_b {
            (user_a, user_b)
        } else {
            (user_b, user_a)
        };

        let room_id = state.next_id();
        state.rooms.insert(
            room_id,
            StoredRoom {
                id: room_id,
                kind: RoomKind::Private,
                name: format!("{} & {}", first.display_name, second.display_name),
                team_id: None,
            },
        );

        state.private_chats.push(StoredPrivateChat {
            user_one_id: lo,
            user_two_id: hi,
            room_id,
        });

        state.insert_member(&NewRoomMember {
            room_id,
            user_id: user_a,
            role: MemberRole::Owner,
        })?;
        state.insert_member(&NewRoomMember {
            room_id,
            user_id: user_b,
            role: MemberRole::Member,
        })?;

        state.room(room_id)
    }

    async fn private_room_between(
        &self,
        user_a: PrimaryKey,
        user_b: PrimaryKey,
    ) -> Result<RoomData> {
        let (lo, hi) = if user_a < user_b {
            (user_a, user_b)
        } else {
            (user_b, user_a)
        };

        let state = self.state.lock();

        let pairing = state
            .private_chats
            .iter()
            .find(|p| p.user_one_id == lo && p.user_two_id == hi)
            .ok_or(DatabaseError::NotFound {
                resource: "private chat",
                identifier: "user_one_id:user_two_id",
            })?;

        state.room(pairing.room_id)
    }

    async fn private_rooms_of(&self, user_id: PrimaryKey) -> Result<Vec<RoomData>> {
        let state = self.state.lock();

        state
            .private_chats
            .iter()
            .filter(|p| p.user_one_id == user_id || p.user_two_id == user_id)
            .map(|p| state.room(p.room_id))
            .collect()
    }

    async fn team_by_id(&self, team_id: PrimaryKey) -> Result<TeamData> {
        self.state
            .lock()
            .teams
            .get(&team_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "team",
                identifier: "id",
            })
    }

    async fn team_by_name(&self, name: &str) -> Result<TeamData> {
        self.state
            .lock()
            .teams
            .values()
            .find(|t| t.name == name)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "team",
                identifier: "name",
            })
    }

    async fn create_team(&self, new_team: NewTeam) -> Result<TeamData> {
        let mut state = self.state.lock();

        if state.teams.values().any(|t| t.name == new_team.name) {
            return Err(DatabaseError::Conflict {
                resource: "team",
                field: "name",
                value: new_team.name,
            });
        }

        let owner = state.user(new_team.user_id)?;

        let team_id = state.next_id();
        let team = TeamData {
            id: team_id,
            name: new_team.name.clone(),
            description: new_team.description,
            grade: new_team.grade,
            is_public: new_team.is_public,
            parent_team_id: new_team.parent_team_id,
        };
        state.teams.insert(team_id, team.clone());

        let room_id = state.next_id();
        state.rooms.insert(
            room_id,
            StoredRoom {
                id: room_id,
                kind: RoomKind::Team,
                name: new_team.name,
                team_id: Some(team_id),
            },
        );

        state.insert_member(&NewRoomMember {
            room_id,
            user_id: owner.id,
            role: MemberRole::Owner,
        })?;

        if new_team.assign_pointer {
            let user = state.users.get_mut(&owner.id).expect("owner exists");

            if user.team_id.is_none() {
                user.team_id = Some(team_id);
            }
        }

        Ok(team)
    }

    async fn sub_teams_of(&self, team_id: PrimaryKey) -> Result<Vec<TeamData>> {
        Ok(self
            .state
            .lock()
            .teams
            .values()
            .filter(|t| t.parent_team_id == Some(team_id))
            .cloned()
            .collect())
    }

    async fn set_team_parent(
        &self,
        team_id: PrimaryKey,
        parent_team_id: Option<PrimaryKey>,
    ) -> Result<TeamData> {
        let mut state = self.state.lock();

        let team = state.teams.get_mut(&team_id).ok_or(DatabaseError::NotFound {
            resource: "team",
            identifier: "id",
        })?;

        team.parent_team_id = parent_team_id;
        Ok(team.clone())
    }

    async fn delete_team_tree(
        &self,
        team_ids: &[PrimaryKey],
        room_ids: &[PrimaryKey],
    ) -> Result<()> {
        let mut state = self.state.lock();

        for user in state.users.values_mut() {
            if user.team_id.is_some_and(|id| team_ids.contains(&id)) {
                user.team_id = None;
            }
        }

        state
            .announcements
            .retain(|a| !team_ids.contains(&a.team_id));
        state
            .project_results
            .retain(|p| !team_ids.contains(&p.team_id));
        state
            .team_invites
            .retain(|_, i| !team_ids.contains(&i.team_id));
        state.messages.retain(|m| !room_ids.contains(&m.room_id));
        state.members.retain(|m| !room_ids.contains(&m.room_id));
        state.rooms.retain(|id, _| !room_ids.contains(id));
        state.teams.retain(|id, _| !team_ids.contains(id));

        Ok(())
    }

    async fn team_invite_by_id(&self, invite_id: PrimaryKey) -> Result<TeamInviteData> {
        let state = self.state.lock();

        state
            .team_invites
            .get(&invite_id)
            .ok_or(DatabaseError::NotFound {
                resource: "team invite",
                identifier: "id",
            })
            .and_then(|i| state.team_invite_data(i))
    }

    async fn live_team_invite(
        &self,
        team_id: PrimaryKey,
        inviter_id: PrimaryKey,
        user_id: Option<PrimaryKey>,
        email: Option<&str>,
    ) -> Result<TeamInviteData> {
        let state = self.state.lock();

        state
            .team_invites
            .values()
            .find(|i| {
                i.team_id == team_id
                    && i.inviter_id == inviter_id
                    && i.user_id == user_id
                    && i.email.as_deref() == email
                    && i.status == InviteStatus::Pending
            })
            .ok_or(DatabaseError::NotFound {
                resource: "team invite",
                identifier: "target",
            })
            .and_then(|i| state.team_invite_data(i))
    }

    async fn team_invites_for_team(&self, team_id: PrimaryKey) -> Result<Vec<TeamInviteData>> {
        let state = self.state.lock();

        state
            .team_invites
            .values()
            .filter(|i| i.team_id == team_id)
            .map(|i| state.team_invite_data(i))
            .collect()
    }

    async fn team_invites_for_user(
        &self,
        user_id: PrimaryKey,
        email: &str,
    ) -> Result<Vec<TeamInviteData>> {
        let state = self.state.lock();

        state
            .team_invites
            .values()
            .filter(|i| i.user_id == Some(user_id) || i.email.as_deref() == Some(email))
            .map(|i| state.team_invite_data(i))
            .collect()
    }

    async fn create_team_invite(&self, new_invite: NewTeamInvite) -> Result<TeamInviteData> {
        let mut state = self.state.lock();

        let id = state.next_id();
        let invite = StoredInvite {
            id,
            team_id: new_invite.team_id,
            inviter_id: new_invite.inviter_id,
            user_id: new_invite.user_id,
            email: new_invite.email,
            message: new_invite.message,
            status: InviteStatus::Pending,
            expires_at: new_invite.expires_at,
        };

        state.team_invites.insert(id, invite);
        let invite = state.team_invites.get(&id).expect("invite just inserted");
        state.team_invite_data(invite)
    }

    async fn set_team_invite_status(
        &self,
        invite_id: PrimaryKey,
        from: InviteStatus,
        to: InviteStatus,
    ) -> Result<()> {
        let mut state = self.state.lock();
        State::consume_invite(&mut state.team_invites, "team invite", invite_id, from, to)
            .map(|_| ())
    }

    async fn accept_team_invite(
        &self,
        invite_id: PrimaryKey,
        new_member: NewRoomMember,
        team_pointer: Option<PrimaryKey>,
    ) -> Result<RoomMemberData> {
        let mut state = self.state.lock();

        if state
            .member_of(new_member.room_id, new_member.user_id)
            .is_ok()
        {
            return Err(DatabaseError::Conflict {
                resource: "room member",
                field: "user:room",
                value: format!("{}:{}", new_member.user_id, new_member.room_id),
            });
        }

        State::consume_invite(
            &mut state.team_invites,
            "team invite",
            invite_id,
            InviteStatus::Pending,
            InviteStatus::Accepted,
        )?;

        let member = state.insert_member(&new_member)?;

        if let Some(team_id) = team_pointer {
            if let Some(user) = state.users.get_mut(&new_member.user_id) {
                if user.team_id.is_none() {
                    user.team_id = Some(team_id);
                }
            }
        }

        Ok(member)
    }

    async fn friend_invite_by_id(&self, invite_id: PrimaryKey) -> Result<FriendInviteData> {
        let state = self.state.lock();

        state
            .friend_invites
            .get(&invite_id)
            .ok_or(DatabaseError::NotFound {
                resource: "friend invite",
                identifier: "id",
            })
            .and_then(|i| state.friend_invite_data(i))
    }

    async fn live_friend_invite(
        &self,
        inviter_id: PrimaryKey,
        user_id: Option<PrimaryKey>,
        email: Option<&str>,
    ) -> Result<FriendInviteData> {
        let state = self.state.lock();

        state
            .friend_invites
            .values()
            .find(|i| {
                i.inviter_id == inviter_id
                    && i.user_id == user_id
                    && i.email.as_deref() == email
                    && i.status == InviteStatus::Pending
            })
            .ok_or(DatabaseError::NotFound {
                resource: "friend invite",
                identifier: "target",
            })
            .and_then(|i| state.friend_invite_data(i))
    }

    async fn friend_invites_for_user(
        &self,
        user_id: PrimaryKey,
        email: &str,
    ) -> Result<Vec<FriendInviteData>> {
        let state = self.state.lock();

        state
            .friend_invites
            .values()
            .filter(|i| i.user_id == Some(user_id) || i.email.as_deref() == Some(email))
            .map(|i| state.friend_invite_data(i))
            .collect()
    }

    async fn create_friend_invite(&self, new_invite: NewFriendInvite) -> Result<FriendInviteData> {
        let mut state = self.state.lock();

        let id = state.next_id();
        let invite = StoredInvite {
            id,
            team_id: 0,
            inviter_id: new_invite.inviter_id,
            user_id: new_invite.user_id,
            email: new_invite.email,
            message: new_invite.message,
            status: InviteStatus::Pending,
            expires_at: new_invite.expires_at,
        };

        state.friend_invites.insert(id, invite);
        let invite = state.friend_invites.get(&id).expect("invite just inserted");
        state.friend_invite_data(invite)
    }

    async fn set_friend_invite_status(
        &self,
        invite_id: PrimaryKey,
        from: InviteStatus,
        to: InviteStatus,
    ) -> Result<()> {
        let mut state = self.state.lock();
        State::consume_invite(
            &mut state.friend_invites,
            "friend invite",
            invite_id,
            from,
            to,
        )
        .map(|_| ())
    }

    async fn accept_friend_invite(
        &self,
        invite_id: PrimaryKey,
        user_a: PrimaryKey,
        user_b: PrimaryKey,
    ) -> Result<()> {
        let mut state = self.state.lock();

        State::consume_invite(
            &mut state.friend_invites,
            "friend invite",
            invite_id,
            InviteStatus::Pending,
            InviteStatus::Accepted,
        )?;

        for pair in [(user_a, user_b), (user_b, user_a)] {
            if !state.follows.contains(&pair) {
                state.follows.push(pair);
            }
        }

        Ok(())
    }

    async fn is_following(
        &self,
        follower_id: PrimaryKey,
        followee_id: PrimaryKey,
    ) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .follows
            .contains(&(follower_id, followee_id)))
    }

    async fn create_message(&self, new_message: NewMessage) -> Result<MessageData> {
        let mut state = self.state.lock();

        let message = StoredMessage {
            id: state.next_id(),
            room_id: new_message.room_id,
            sender_id: new_message.sender_id,
            content: new_message.content,
            created_at: Utc::now(),
        };

        state.messages.push(message.clone());
        state.message_data(&message)
    }

    async fn message_by_id(&self, message_id: PrimaryKey) -> Result<MessageData> {
        let state = self.state.lock();

        state
            .messages
            .iter()
            .find(|m| m.id == message_id)
            .ok_or(DatabaseError::NotFound {
                resource: "message",
                identifier: "id",
            })
            .and_then(|m| state.message_data(m))
    }

    async fn messages_by_room(&self, room_id: PrimaryKey, limit: i64) -> Result<Vec<MessageData>> {
        let state = self.state.lock();

        let mut messages: Vec<_> = state
            .messages
            .iter()
            .filter(|m| m.room_id == room_id)
            .collect();

        messages.sort_by_key(|m| m.created_at);

        let skip = messages.len().saturating_sub(limit as usize);

        messages
            .into_iter()
            .skip(skip)
            .map(|m| state.message_data(m))
            .collect()
    }

    async fn create_announcement(&self, new: NewAnnouncement) -> Result<AnnouncementData> {
        let mut state = self.state.lock();

        let announcement = AnnouncementData {
            id: state.next_id(),
            team_id: new.team_id,
            author_id: new.author_id,
            content: new.content,
            created_at: Utc::now(),
        };

        state.announcements.push(announcement.clone());
        Ok(announcement)
    }

    async fn announcements_of_team(&self, team_id: PrimaryKey) -> Result<Vec<AnnouncementData>> {
        Ok(self
            .state
            .lock()
            .announcements
            .iter()
            .filter(|a| a.team_id == team_id)
            .cloned()
            .collect())
    }

    async fn create_project_result(&self, new: NewProjectResult) -> Result<ProjectResultData> {
        let mut state = self.state.lock();

        let result = ProjectResultData {
            id: state.next_id(),
            team_id: new.team_id,
            name: new.name,
            created_at: Utc::now(),
        };

        state.project_results.push(result.clone());
        Ok(result)
    }

    async fn project_results_of_team(
        &self,
        team_id: PrimaryKey,
    ) -> Result<Vec<ProjectResultData>> {
        Ok(self
            .state
            .lock()
            .project_results
            .iter()
            .filter(|p| p.team_id == team_id)
            .cloned()
            .collect())
    }
}
