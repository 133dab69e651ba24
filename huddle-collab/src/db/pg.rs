use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, Error as SqlxError, PgPool, Postgres, Transaction};

use crate::{
    AnnouncementData, Database, DatabaseError, DatabaseResult, FriendInviteData, IntoDatabaseError,
    InviteStatus, MemberRole, MessageData, NewAnnouncement, NewFriendInvite, NewMessage,
    NewProjectResult, NewRoomMember, NewSession, NewTeam, NewTeamInvite, NewUser, PrimaryKey,
    PrivateChatData, ProjectResultData, Result, RoomData, RoomKind, RoomMemberData, SessionData,
    TeamData, TeamInviteData, UserData,
};

/// A postgres database implementation for huddle
pub struct PgDatabase {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct RoomRow {
    id: PrimaryKey,
    kind: RoomKind,
    name: String,
    team_id: Option<PrimaryKey>,
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    member_id: PrimaryKey,
    role: MemberRole,
    joined_at: DateTime<Utc>,
    user_id: PrimaryKey,
    username: String,
    email: String,
    password: String,
    display_name: String,
    superuser: bool,
    team_id: Option<PrimaryKey>,
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    session_id: PrimaryKey,
    token: String,
    expires_at: DateTime<Utc>,
    user_id: PrimaryKey,
    username: String,
    email: String,
    password: String,
    display_name: String,
    superuser: bool,
    team_id: Option<PrimaryKey>,
}

#[derive(sqlx::FromRow)]
struct TeamInviteRow {
    invite_id: PrimaryKey,
    team_id: PrimaryKey,
    target_user_id: Option<PrimaryKey>,
    target_email: Option<String>,
    message: Option<String>,
    status: InviteStatus,
    expires_at: DateTime<Utc>,
    user_id: PrimaryKey,
    username: String,
    email: String,
    password: String,
    display_name: String,
    superuser: bool,
    inviter_team_id: Option<PrimaryKey>,
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    message_id: PrimaryKey,
    room_id: PrimaryKey,
    content: String,
    created_at: DateTime<Utc>,
    user_id: PrimaryKey,
    username: String,
    email: String,
    password: String,
    display_name: String,
    superuser: bool,
    team_id: Option<PrimaryKey>,
}

const MEMBER_COLUMNS: &str = "
    room_members.id AS member_id,
    room_members.role,
    room_members.joined_at,
    users.id AS user_id,
    users.username,
    users.email,
    users.password,
    users.display_name,
    users.superuser,
    users.team_id";

impl MemberRow {
    fn into_data(self) -> RoomMemberData {
        RoomMemberData {
            id: self.member_id,
            role: self.role,
            joined_at: self.joined_at,
            user: UserData {
                id: self.user_id,
                username: self.username,
                email: self.email,
                password: self.password,
                display_name: self.display_name,
                superuser: self.superuser,
                team_id: self.team_id,
            },
        }
    }
}

impl TeamInviteRow {
    fn into_data(self) -> TeamInviteData {
        TeamInviteData {
            id: self.invite_id,
            team_id: self.team_id,
            inviter: UserData {
                id: self.user_id,
                username: self.username,
                email: self.email,
                password: self.password,
                display_name: self.display_name,
                superuser: self.superuser,
                team_id: self.inviter_team_id,
            },
            user_id: self.target_user_id,
            email: self.target_email,
            message: self.message,
            status: self.status,
            expires_at: self.expires_at,
        }
    }
}

impl MessageRow {
    fn into_data(self) -> MessageData {
        MessageData {
            id: self.message_id,
            room_id: self.room_id,
            sender: UserData {
                id: self.user_id,
                username: self.username,
                email: self.email,
                password: self.password,
                display_name: self.display_name,
                superuser: self.superuser,
                team_id: self.team_id,
            },
            content: self.content,
            created_at: self.created_at,
        }
    }
}

impl PgDatabase {
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        Ok(Self { pool })
    }

    async fn room_members(&self, room_id: PrimaryKey) -> Result<Vec<RoomMemberData>> {
        let rows: Vec<MemberRow> = sqlx::query_as(&format!(
            "SELECT {MEMBER_COLUMNS}
            FROM room_members
                INNER JOIN users ON room_members.user_id = users.id
            WHERE room_members.room_id = $1"
        ))
        .bind(room_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(rows.into_iter().map(MemberRow::into_data).collect())
    }

    async fn assemble_room(&self, row: RoomRow) -> Result<RoomData> {
        let members = self.room_members(row.id).await?;

        Ok(RoomData {
            id: row.id,
            kind: row.kind,
            name: row.name,
            team_id: row.team_id,
            members,
        })
    }

    /// Role of a member, locked for the remainder of the transaction.
    async fn member_role_for_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        room_id: PrimaryKey,
        user_id: PrimaryKey,
    ) -> Result<MemberRole> {
        let (role,): (MemberRole,) = sqlx::query_as(
            "SELECT role FROM room_members WHERE room_id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| e.not_found_or("room member", "room_id:user_id"))?;

        Ok(role)
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn check_for_superuser(&self) -> Result<bool> {
        let result = sqlx::query("SELECT id FROM users WHERE superuser = true")
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(SqlxError::RowNotFound) => Ok(false),
            Err(e) => Err(e.any()),
        }
    }

    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "id"))
    }

    async fn user_by_username(&self, username: &str) -> Result<UserData> {
        sqlx::query_as("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "username"))
    }

    async fn user_by_email(&self, email: &str) -> Result<UserData> {
        sqlx::query_as("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("user", "email"))
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        self.user_by_username(&new_user.username)
            .await
            .conflict_or_ok("user", "username", &new_user.username)?;

        self.user_by_email(&new_user.email)
            .await
            .conflict_or_ok("user", "email", &new_user.email)?;

        sqlx::query_as(
            "INSERT INTO users (username, email, password, display_name, superuser)
            VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.password)
        .bind(&new_user.display_name)
        .bind(new_user.superuser)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        let row: SessionRow = sqlx::query_as(
            "SELECT
                sessions.id AS session_id,
                sessions.token,
                sessions.expires_at,
                users.id AS user_id,
                users.username,
                users.email,
                users.password,
                users.display_name,
                users.superuser,
                users.team_id
            FROM sessions
                INNER JOIN users ON sessions.user_id = users.id
            WHERE token = $1",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("session", "token"))?;

        Ok(SessionData {
            id: row.session_id,
            token: row.token,
            expires_at: row.expires_at,
            user: UserData {
                id: row.user_id,
                username: row.username,
                email: row.email,
                password: row.password,
                display_name: row.display_name,
                superuser: row.superuser,
                team_id: row.team_id,
            },
        })
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        self.session_by_token(&new_session.token)
            .await
            .conflict_or_ok("session", "token", &new_session.token)?;

        let (token,): (String,) = sqlx::query_as(
            "INSERT INTO sessions (token, user_id, expires_at) VALUES ($1, $2, $3) RETURNING token",
        )
        .bind(&new_session.token)
        .bind(new_session.user_id)
        .bind(new_session.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?;

        self.session_by_token(&token).await
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        // Ensure session exists
        let _ = self.session_by_token(token).await?;

        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn clear_expired_sessions(&self) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE timezone('UTC', now()) > expires_at")
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn room_by_id(&self, room_id: PrimaryKey) -> Result<RoomData> {
        let row: RoomRow = sqlx::query_as("SELECT * FROM rooms WHERE id = $1")
            .bind(room_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("room", "id"))?;

        self.assemble_room(row).await
    }

    async fn room_of_team(&self, team_id: PrimaryKey) -> Result<RoomData> {
        let row: RoomRow = sqlx::query_as("SELECT * FROM rooms WHERE team_id = $1")
            .bind(team_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("room", "team_id"))?;

        self.assemble_room(row).await
    }

    async fn rename_room(&self, room_id: PrimaryKey, name: &str) -> Result<RoomData> {
        let result = sqlx::query("UPDATE rooms SET name = $1 WHERE id = $2")
            .bind(name)
            .bind(room_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound {
                resource: "room",
                identifier: "id",
            });
        }

        self.room_by_id(room_id).await
    }

    async fn member(&self, room_id: PrimaryKey, user_id: PrimaryKey) -> Result<RoomMemberData> {
        let row: MemberRow = sqlx::query_as(&format!(
            "SELECT {MEMBER_COLUMNS}
            FROM room_members
                INNER JOIN users ON room_members.user_id = users.id
            WHERE room_members.room_id = $1 AND room_members.user_id = $2"
        ))
        .bind(room_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("room member", "room_id:user_id"))?;

        Ok(row.into_data())
    }

    async fn create_room_member(&self, new_member: NewRoomMember) -> Result<RoomMemberData> {
        // Ensure the user isn't a member of this room already
        self.member(new_member.room_id, new_member.user_id)
            .await
            .conflict_or_ok(
                "room member",
                "user:room",
                format!("{}:{}", new_member.user_id, new_member.room_id).as_str(),
            )?;

        sqlx::query("INSERT INTO room_members (room_id, user_id, role) VALUES ($1, $2, $3)")
            .bind(new_member.room_id)
            .bind(new_member.user_id)
            .bind(new_member.role)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        self.member(new_member.room_id, new_member.user_id).await
    }

    async fn delete_room_member(&self, room_id: PrimaryKey, user_id: PrimaryKey) -> Result<()> {
        let result = sqlx::query("DELETE FROM room_members WHERE room_id = $1 AND user_id = $2")
            .bind(room_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
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
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        let current = self.member_role_for_update(&mut tx, room_id, user_id).await?;

        if role == MemberRole::Owner && current != MemberRole::Owner {
            let other_owner = sqlx::query(
                "SELECT user_id FROM room_members
                WHERE room_id = $1 AND role = $2 AND user_id <> $3 FOR UPDATE",
            )
            .bind(room_id)
            .bind(MemberRole::Owner)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| e.any())?;

            if other_owner.is_some() {
                return Err(DatabaseError::Conflict {
                    resource: "room member",
                    field: "role",
                    value: "owner".to_string(),
                });
            }
        }

        // The sole owner cannot be demoted directly, only through a transfer
        if current == MemberRole::Owner && role != MemberRole::Owner {
            return Err(DatabaseError::Conflict {
                resource: "room",
                field: "owner",
                value: user_id.to_string(),
            });
        }

        sqlx::query("UPDATE room_members SET role = $1 WHERE room_id = $2 AND user_id = $3")
            .bind(role)
            .bind(room_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        tx.commit().await.map_err(|e| e.any())?;

        self.member(room_id, user_id).await
    }

    async fn transfer_owner(
        &self,
        room_id: PrimaryKey,
        from_user: PrimaryKey,
        to_user: PrimaryKey,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        let from_role = self
            .member_role_for_update(&mut tx, room_id, from_user)
            .await?;

        if from_role != MemberRole::Owner {
            return Err(DatabaseError::Conflict {
                resource: "room",
                field: "owner",
                value: from_user.to_string(),
            });
        }

        // Locks the target row and proves it exists
        let _ = self
            .member_role_for_update(&mut tx, room_id, to_user)
            .await?;

        sqlx::query("UPDATE room_members SET role = $1 WHERE room_id = $2 AND user_id = $3")
            .bind(MemberRole::CoOwner)
            .bind(room_id)
            .bind(from_user)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        sqlx::query("UPDATE room_members SET role = $1 WHERE room_id = $2 AND user_id = $3")
            .bind(MemberRole::Owner)
            .bind(room_id)
            .bind(to_user)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        tx.commit().await.map_err(|e| e.any())
    }

    async fn private_room(&self, user_a: PrimaryKey, user_b: PrimaryKey) -> Result<RoomData> {
        if let Ok(existing) = self.private_room_between(user_a, user_b).await {
            return Ok(existing);
        }

        let first = self.user_by_id(user_a).await?;
        let second = self.user_by_id(user_b).await?;

        let (lo, hi) = if user_a < user_b {
            (user_a, user_b)
        } else {
            (user_b, user_a)
        };

        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        let (room_id,): (PrimaryKey,) = sqlx::query_as(
            "INSERT INTO rooms (kind, name, team_id) VALUES ($1, $2, NULL) RETURNING id",
        )
        .bind(RoomKind::Private)
        .bind(format!("{} & {}", first.display_name, second.display_name))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        let insert_pair = sqlx::query(
            "INSERT INTO private_chats (user_one_id, user_two_id, room_id)
            VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind(lo)
        .bind(hi)
        .bind(room_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| e.any())?;

        // Lost a race against a concurrent create for the same pair
        if insert_pair.rows_affected() == 0 {
            drop(tx);
            return self.private_room_between(user_a, user_b).await;
        }

        sqlx::query("INSERT INTO room_members (room_id, user_id, role) VALUES ($1, $2, $3)")
            .bind(room_id)
            .bind(user_a)
            .bind(MemberRole::Owner)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        sqlx::query("INSERT INTO room_members (room_id, user_id, role) VALUES ($1, $2, $3)")
            .bind(room_id)
            .bind(user_b)
            .bind(MemberRole::Member)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        tx.commit().await.map_err(|e| e.any())?;

        self.room_by_id(room_id).await
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

        let pairing: PrivateChatData = sqlx::query_as(
            "SELECT * FROM private_chats WHERE user_one_id = $1 AND user_two_id = $2",
        )
        .bind(lo)
        .bind(hi)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("private chat", "user_one_id:user_two_id"))?;

        self.room_by_id(pairing.room_id).await
    }

    async fn private_rooms_of(&self, user_id: PrimaryKey) -> Result<Vec<RoomData>> {
        let rows: Vec<RoomRow> = sqlx::query_as(
            "SELECT rooms.* FROM rooms
                INNER JOIN private_chats ON private_chats.room_id = rooms.id
            WHERE private_chats.user_one_id = $1 OR private_chats.user_two_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        let mut rooms = Vec::with_capacity(rows.len());

        for row in rows {
            rooms.push(self.assemble_room(row).await?);
        }

        Ok(rooms)
    }

    async fn team_by_id(&self, team_id: PrimaryKey) -> Result<TeamData> {
        sqlx::query_as("SELECT * FROM teams WHERE id = $1")
            .bind(team_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("team", "id"))
    }

    async fn team_by_name(&self, name: &str) -> Result<TeamData> {
        sqlx::query_as("SELECT * FROM teams WHERE name = $1")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| e.not_found_or("team", "name"))
    }

    async fn create_team(&self, new_team: NewTeam) -> Result<TeamData> {
        self.team_by_name(&new_team.name)
            .await
            .conflict_or_ok("team", "name", &new_team.name)?;

        let owner = self.user_by_id(new_team.user_id).await?;

        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        let (team_id,): (PrimaryKey,) = sqlx::query_as(
            "INSERT INTO teams (name, description, grade, is_public, parent_team_id)
            VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(&new_team.name)
        .bind(&new_team.description)
        .bind(new_team.grade)
        .bind(new_team.is_public)
        .bind(new_team.parent_team_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_fk_violation)?;

        let (room_id,): (PrimaryKey,) =
            sqlx::query_as("INSERT INTO rooms (kind, name, team_id) VALUES ($1, $2, $3) RETURNING id")
                .bind(RoomKind::Team)
                .bind(&new_team.name)
                .bind(team_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| e.any())?;

        sqlx::query("INSERT INTO room_members (room_id, user_id, role) VALUES ($1, $2, $3)")
            .bind(room_id)
            .bind(owner.id)
            .bind(MemberRole::Owner)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        if new_team.assign_pointer {
            sqlx::query("UPDATE users SET team_id = $1 WHERE id = $2 AND team_id IS NULL")
                .bind(team_id)
                .bind(owner.id)
                .execute(&mut *tx)
                .await
                .map_err(|e| e.any())?;
        }

        tx.commit().await.map_err(|e| e.any())?;

        self.team_by_id(team_id).await
    }

    async fn sub_teams_of(&self, team_id: PrimaryKey) -> Result<Vec<TeamData>> {
        sqlx::query_as("SELECT * FROM teams WHERE parent_team_id = $1")
            .bind(team_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())
    }

    async fn set_team_parent(
        &self,
        team_id: PrimaryKey,
        parent_team_id: Option<PrimaryKey>,
    ) -> Result<TeamData> {
        let result = sqlx::query("UPDATE teams SET parent_team_id = $1 WHERE id = $2")
            .bind(parent_team_id)
            .bind(team_id)
            .execute(&self.pool)
            .await
            .map_err(map_fk_violation)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound {
                resource: "team",
                identifier: "id",
            });
        }

        self.team_by_id(team_id).await
    }

    async fn delete_team_tree(
        &self,
        team_ids: &[PrimaryKey],
        room_ids: &[PrimaryKey],
    ) -> Result<()> {
        let teams: Vec<PrimaryKey> = team_ids.to_vec();
        let rooms: Vec<PrimaryKey> = room_ids.to_vec();

        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        // Pointers first, so membership deletion can't orphan them
        sqlx::query("UPDATE users SET team_id = NULL WHERE team_id = ANY($1)")
            .bind(&teams)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        // Strict dependency order, leaves before the trunk
        let steps = [
            "DELETE FROM announcements WHERE team_id = ANY($1)",
            "DELETE FROM project_results WHERE team_id = ANY($1)",
            "DELETE FROM team_invites WHERE team_id = ANY($1)",
        ];

        for step in steps {
            sqlx::query(step)
                .bind(&teams)
                .execute(&mut *tx)
                .await
                .map_err(map_fk_violation)?;
        }

        let room_steps = [
            "DELETE FROM messages WHERE room_id = ANY($1)",
            "DELETE FROM room_members WHERE room_id = ANY($1)",
            "DELETE FROM rooms WHERE id = ANY($1)",
        ];

        for step in room_steps {
            sqlx::query(step)
                .bind(&rooms)
                .execute(&mut *tx)
                .await
                .map_err(map_fk_violation)?;
        }

        sqlx::query("DELETE FROM teams WHERE id = ANY($1)")
            .bind(&teams)
            .execute(&mut *tx)
            .await
            .map_err(map_fk_violation)?;

        tx.commit().await.map_err(|e| e.any())
    }

    async fn team_invite_by_id(&self, invite_id: PrimaryKey) -> Result<TeamInviteData> {
        let row: TeamInviteRow = sqlx::query_as(&format!(
            "{TEAM_INVITE_SELECT} WHERE team_invites.id = $1"
        ))
        .bind(invite_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("team invite", "id"))?;

        Ok(row.into_data())
    }

    async fn live_team_invite(
        &self,
        team_id: PrimaryKey,
        inviter_id: PrimaryKey,
        user_id: Option<PrimaryKey>,
        email: Option<&str>,
    ) -> Result<TeamInviteData> {
        let row: TeamInviteRow = sqlx::query_as(&format!(
            "{TEAM_INVITE_SELECT}
            WHERE team_invites.team_id = $1
                AND team_invites.inviter_id = $2
                AND team_invites.target_user_id IS NOT DISTINCT FROM $3
                AND team_invites.target_email IS NOT DISTINCT FROM $4
                AND team_invites.status = $5"
        ))
        .bind(team_id)
        .bind(inviter_id)
        .bind(user_id)
        .bind(email)
        .bind(InviteStatus::Pending)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("team invite", "target"))?;

        Ok(row.into_data())
    }

    async fn team_invites_for_team(&self, team_id: PrimaryKey) -> Result<Vec<TeamInviteData>> {
        let rows: Vec<TeamInviteRow> = sqlx::query_as(&format!(
            "{TEAM_INVITE_SELECT} WHERE team_invites.team_id = $1"
        ))
        .bind(team_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(rows.into_iter().map(TeamInviteRow::into_data).collect())
    }

    async fn team_invites_for_user(
        &self,
        user_id: PrimaryKey,
        email: &str,
    ) -> Result<Vec<TeamInviteData>> {
        let rows: Vec<TeamInviteRow> = sqlx::query_as(&format!(
            "{TEAM_INVITE_SELECT}
            WHERE team_invites.target_user_id = $1 OR team_invites.target_email = $2"
        ))
        .bind(user_id)
        .bind(email)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(rows.into_iter().map(TeamInviteRow::into_data).collect())
    }

    async fn create_team_invite(&self, new_invite: NewTeamInvite) -> Result<TeamInviteData> {
        let (invite_id,): (PrimaryKey,) = sqlx::query_as(
            "INSERT INTO team_invites
                (team_id, inviter_id, target_user_id, target_email, message, status, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
        )
        .bind(new_invite.team_id)
        .bind(new_invite.inviter_id)
        .bind(new_invite.user_id)
        .bind(&new_invite.email)
        .bind(&new_invite.message)
        .bind(InviteStatus::Pending)
        .bind(new_invite.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_fk_violation)?;

        self.team_invite_by_id(invite_id).await
    }

    async fn set_team_invite_status(
        &self,
        invite_id: PrimaryKey,
        from: InviteStatus,
        to: InviteStatus,
    ) -> Result<()> {
        let result =
            sqlx::query("UPDATE team_invites SET status = $1 WHERE id = $2 AND status = $3")
                .bind(to)
                .bind(invite_id)
                .bind(from)
                .execute(&self.pool)
                .await
                .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            // Distinguish a consumed invitation from a missing one
            let _ = self.team_invite_by_id(invite_id).await?;

            return Err(DatabaseError::Conflict {
                resource: "team invite",
                field: "status",
                value: "not pending".to_string(),
            });
        }

        Ok(())
    }

    async fn accept_team_invite(
        &self,
        invite_id: PrimaryKey,
        new_member: NewRoomMember,
        team_pointer: Option<PrimaryKey>,
    ) -> Result<RoomMemberData> {
        self.member(new_member.room_id, new_member.user_id)
            .await
            .conflict_or_ok(
                "room member",
                "user:room",
                format!("{}:{}", new_member.user_id, new_member.room_id).as_str(),
            )?;

        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        let consumed =
            sqlx::query("UPDATE team_invites SET status = $1 WHERE id = $2 AND status = $3")
                .bind(InviteStatus::Accepted)
                .bind(invite_id)
                .bind(InviteStatus::Pending)
                .execute(&mut *tx)
                .await
                .map_err(|e| e.any())?;

        if consumed.rows_affected() == 0 {
            return Err(DatabaseError::Conflict {
                resource: "team invite",
                field: "status",
                value: "not pending".to_string(),
            });
        }

        sqlx::query("INSERT INTO room_members (room_id, user_id, role) VALUES ($1, $2, $3)")
            .bind(new_member.room_id)
            .bind(new_member.user_id)
            .bind(new_member.role)
            .execute(&mut *tx)
            .await
            .map_err(|e| e.any())?;

        if let Some(team_id) = team_pointer {
            sqlx::query("UPDATE users SET team_id = $1 WHERE id = $2 AND team_id IS NULL")
                .bind(team_id)
                .bind(new_member.user_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| e.any())?;
        }

        tx.commit().await.map_err(|e| e.any())?;

        self.member(new_member.room_id, new_member.user_id).await
    }

    async fn friend_invite_by_id(&self, invite_id: PrimaryKey) -> Result<FriendInviteData> {
        let row: TeamInviteRow = sqlx::query_as(&format!(
            "{FRIEND_INVITE_SELECT} WHERE friend_invites.id = $1"
        ))
        .bind(invite_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("friend invite", "id"))?;

        Ok(friend_invite_from_row(row))
    }

    async fn live_friend_invite(
        &self,
        inviter_id: PrimaryKey,
        user_id: Option<PrimaryKey>,
        email: Option<&str>,
    ) -> Result<FriendInviteData> {
        let row: TeamInviteRow = sqlx::query_as(&format!(
            "{FRIEND_INVITE_SELECT}
            WHERE friend_invites.inviter_id = $1
                AND friend_invites.target_user_id IS NOT DISTINCT FROM $2
                AND friend_invites.target_email IS NOT DISTINCT FROM $3
                AND friend_invites.status = $4"
        ))
        .bind(inviter_id)
        .bind(user_id)
        .bind(email)
        .bind(InviteStatus::Pending)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("friend invite", "target"))?;

        Ok(friend_invite_from_row(row))
    }

    async fn friend_invites_for_user(
        &self,
        user_id: PrimaryKey,
        email: &str,
    ) -> Result<Vec<FriendInviteData>> {
        let rows: Vec<TeamInviteRow> = sqlx::query_as(&format!(
            "{FRIEND_INVITE_SELECT}
            WHERE friend_invites.target_user_id = $1 OR friend_invites.target_email = $2"
        ))
        .bind(user_id)
        .bind(email)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(rows.into_iter().map(friend_invite_from_row).collect())
    }

    async fn create_friend_invite(&self, new_invite: NewFriendInvite) -> Result<FriendInviteData> {
        let (invite_id,): (PrimaryKey,) = sqlx::query_as(
            "INSERT INTO friend_invites
                (inviter_id, target_user_id, target_email, message, status, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        )
        .bind(new_invite.inviter_id)
        .bind(new_invite.user_id)
        .bind(&new_invite.email)
        .bind(&new_invite.message)
        .bind(InviteStatus::Pending)
        .bind(new_invite.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_fk_violation)?;

        self.friend_invite_by_id(invite_id).await
    }

    async fn set_friend_invite_status(
        &self,
        invite_id: PrimaryKey,
        from: InviteStatus,
        to: InviteStatus,
    ) -> Result<()> {
        let result =
            sqlx::query("UPDATE friend_invites SET status = $1 WHERE id = $2 AND status = $3")
                .bind(to)
                .bind(invite_id)
                .bind(from)
                .execute(&self.pool)
                .await
                .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            let _ = self.friend_invite_by_id(invite_id).await?;

            return Err(DatabaseError::Conflict {
                resource: "friend invite",
                field: "status",
                value: "not pending".to_string(),
            });
        }

        Ok(())
    }

    async fn accept_friend_invite(
        &self,
        invite_id: PrimaryKey,
        user_a: PrimaryKey,
        user_b: PrimaryKey,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| e.any())?;

        let consumed =
            sqlx::query("UPDATE friend_invites SET status = $1 WHERE id = $2 AND status = $3")
                .bind(InviteStatus::Accepted)
                .bind(invite_id)
                .bind(InviteStatus::Pending)
                .execute(&mut *tx)
                .await
                .map_err(|e| e.any())?;

        if consumed.rows_affected() == 0 {
            return Err(DatabaseError::Conflict {
                resource: "friend invite",
                field: "status",
                value: "not pending".to_string(),
            });
        }

        // Both directions of the symmetric follow relation
        for (follower, followee) in [(user_a, user_b), (user_b, user_a)] {
            sqlx::query(
                "INSERT INTO follows (follower_id, followee_id)
                VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(follower)
            .bind(followee)
            .execute(&mut *tx)
            .await
            .map_err(map_fk_violation)?;
        }

        tx.commit().await.map_err(|e| e.any())
    }

    async fn is_following(
        &self,
        follower_id: PrimaryKey,
        followee_id: PrimaryKey,
    ) -> Result<bool> {
        let result = sqlx::query("SELECT 1 FROM follows WHERE follower_id = $1 AND followee_id = $2")
            .bind(follower_id)
            .bind(followee_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| e.any())?;

        Ok(result.is_some())
    }

    async fn create_message(&self, new_message: NewMessage) -> Result<MessageData> {
        let (message_id,): (PrimaryKey,) = sqlx::query_as(
            "INSERT INTO messages (room_id, sender_id, content) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(new_message.room_id)
        .bind(new_message.sender_id)
        .bind(&new_message.content)
        .fetch_one(&self.pool)
        .await
        .map_err(map_fk_violation)?;

        self.message_by_id(message_id).await
    }

    async fn message_by_id(&self, message_id: PrimaryKey) -> Result<MessageData> {
        let row: MessageRow = sqlx::query_as(&format!(
            "{MESSAGE_SELECT} WHERE messages.id = $1"
        ))
        .bind(message_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.not_found_or("message", "id"))?;

        Ok(row.into_data())
    }

    async fn messages_by_room(&self, room_id: PrimaryKey, limit: i64) -> Result<Vec<MessageData>> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            "{MESSAGE_SELECT}
            WHERE messages.room_id = $1
            ORDER BY messages.created_at DESC
            LIMIT $2"
        ))
        .bind(room_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())?;

        Ok(rows.into_iter().rev().map(MessageRow::into_data).collect())
    }

    async fn create_announcement(&self, new: NewAnnouncement) -> Result<AnnouncementData> {
        sqlx::query_as(
            "INSERT INTO announcements (team_id, author_id, content)
            VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(new.team_id)
        .bind(new.author_id)
        .bind(&new.content)
        .fetch_one(&self.pool)
        .await
        .map_err(map_fk_violation)
    }

    async fn announcements_of_team(&self, team_id: PrimaryKey) -> Result<Vec<AnnouncementData>> {
        sqlx::query_as(
            "SELECT * FROM announcements WHERE team_id = $1 ORDER BY created_at DESC",
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| e.any())
    }

    async fn create_project_result(&self, new: NewProjectResult) -> Result<ProjectResultData> {
        sqlx::query_as("INSERT INTO project_results (team_id, name) VALUES ($1, $2) RETURNING *")
            .bind(new.team_id)
            .bind(&new.name)
            .fetch_one(&self.pool)
            .await
            .map_err(map_fk_violation)
    }

    async fn project_results_of_team(
        &self,
        team_id: PrimaryKey,
    ) -> Result<Vec<ProjectResultData>> {
        sqlx::query_as("SELECT * FROM project_results WHERE team_id = $1")
            .bind(team_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| e.any())
    }
}

const TEAM_INVITE_SELECT: &str = "
    SELECT
        team_invites.id AS invite_id,
        team_invites.team_id,
        team_invites.target_user_id,
        team_invites.target_email,
        team_invites.message,
        team_invites.status,
        team_invites.expires_at,
        users.id AS user_id,
        users.username,
        users.email,
        users.password,
        users.display_name,
        users.superuser,
        users.team_id AS inviter_team_id
    FROM team_invites
        INNER JOIN users ON team_invites.inviter_id = users.id";

// Friend invites carry no team scope; the team_id column is faked as the
// invite id so the shared row type can be reused.
const FRIEND_INVITE_SELECT: &str = "
    SELECT
        friend_invites.id AS invite_id,
        friend_invites.id AS team_id,
        friend_invites.target_user_id,
        friend_invites.target_email,
        friend_invites.message,
        friend_invites.status,
        friend_invites.expires_at,
        users.id AS user_id,
        users.username,
        users.email,
        users.password,
        users.display_name,
        users.superuser,
        users.team_id AS inviter_team_id
    FROM friend_invites
        INNER JOIN users ON friend_invites.inviter_id = users.id";

const MESSAGE_SELECT: &str = "
    SELECT
        messages.id AS message_id,
        messages.room_id,
        messages.content,
        messages.created_at,
        users.id AS user_id,
        users.username,
        users.email,
        users.password,
        users.display_name,
        users.superuser,
        users.team_id
    FROM messages
        INNER JOIN users ON messages.sender_id = users.id";

fn friend_invite_from_row(row: TeamInviteRow) -> FriendInviteData {
    let data = row.into_data();

    FriendInviteData {
        id: data.id,
        inviter: data.inviter,
        user_id: data.user_id,
        email: data.email,
        message: data.message,
        status: data.status,
        expires_at: data.expires_at,
    }
}

/// Maps a postgres foreign key violation to a structured error naming the
/// blocking relation; everything else stays internal. Constraints follow
/// the `<table>_<column>_fkey` convention, so the constraint name doubles
/// as the relation name.
fn map_fk_violation(e: SqlxError) -> DatabaseError {
    if let Some(db_err) = e.as_database_error() {
        if db_err.code().as_deref() == Some("23503") {
            let constraint = db_err.constraint().unwrap_or("related records");
            let relation = constraint.trim_end_matches("_fkey").to_string();

            return DatabaseError::Dependency { relation };
        }
    }

    e.any()
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }
}
