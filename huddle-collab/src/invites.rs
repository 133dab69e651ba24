use std::collections::HashSet;

use chrono::{Duration, Utc};
use log::info;
use thiserror::Error;

use crate::{
    events::CollabEvent,
    rooms::require_manager,
    CollabContext, Database, DatabaseError, FriendInviteData, InviteStatus, MemberRole,
    ModerationError, NewFriendInvite, NewRoomMember, NewTeamInvite, PrimaryKey, RoomError,
    RoomMemberData, TeamInviteData, UserData,
};

pub struct InviteEngine<Db> {
    context: CollabContext<Db>,
}

#[derive(Debug, Error)]
pub enum InviteError {
    #[error("not pending")]
    NotPending,
    #[error("invitation expired")]
    Expired,
    #[error("An identical invitation is already pending")]
    Duplicate,
    #[error("User is already a member of this room")]
    AlreadyMember,
    #[error("Only the invited user can respond to this invitation")]
    NotInvitee,
    #[error("You cannot invite yourself")]
    SelfInvite,
    #[error(transparent)]
    Moderation(#[from] ModerationError),
    #[error(transparent)]
    Room(#[from] RoomError),
    #[error(transparent)]
    Db(#[from] DatabaseError),
}

/// Who an invitation is addressed to: an existing account, or an email
/// address that may not have one yet.
#[derive(Debug, Clone)]
pub enum InviteTarget {
    User(PrimaryKey),
    Email(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteAction {
    Accept,
    Reject,
}

/// The entry point a team invitation response arrives through. Room
/// managers may resolve an invitation on the invitee's behalf, but only
/// through the room-scoped surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespondOrigin {
    Invitee,
    RoomAdmin,
}

const INVITE_LIFETIME_DAYS: i64 = 7;

impl<Db> InviteEngine<Db>
where
    Db: Database,
{
    pub fn new(context: &CollabContext<Db>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Invites a user into a team. The inviter must manage the team's room,
    /// and an identical live invitation counts as a duplicate.
    pub async fn invite_to_team(
        &self,
        inviter: &UserData,
        team_id: PrimaryKey,
        target: InviteTarget,
        message: Option<String>,
    ) -> Result<TeamInviteData, InviteError> {
        if let Some(message) = &message {
            self.context.moderation.ensure_clean(message)?;
        }

        let team = self.context.database.team_by_id(team_id).await?;
        let room = self.context.database.room_of_team(team.id).await?;

        require_manager(&self.context.database, room.id, inviter.id).await?;

        let (user_id, email) = self.resolve_target(inviter, &target).await?;

        // Duplicate detection keys strictly on (team, inviter, target).
        // An invitation that turns out to be past its expiry is lazily
        // reclassified and doesn't block a fresh one.
        match self
            .context
            .database
            .live_team_invite(team.id, inviter.id, user_id, email.as_deref())
            .await
        {
            Ok(existing) if existing.expires_at < Utc::now() => {
                self.context
                    .database
                    .set_team_invite_status(existing.id, InviteStatus::Pending, InviteStatus::Expired)
                    .await?;
            }
            Ok(_) => return Err(InviteError::Duplicate),
            Err(DatabaseError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        let invite = self
            .context
            .database
            .create_team_invite(NewTeamInvite {
                team_id: team.id,
                inviter_id: inviter.id,
                user_id,
                email,
                message,
                expires_at: Utc::now() + Duration::days(INVITE_LIFETIME_DAYS),
            })
            .await?;

        info!(
            "User {} invited {:?} to team {}",
            inviter.username, target, team.name
        );

        Ok(invite)
    }

    /// Invites another user to become mutual friends.
    pub async fn invite_friend(
        &self,
        inviter: &UserData,
        target: InviteTarget,
        message: Option<String>,
    ) -> Result<FriendInviteData, InviteError> {
        if let Some(message) = &message {
            self.context.moderation.ensure_clean(message)?;
        }

        let (user_id, email) = self.resolve_target(inviter, &target).await?;

        match self
            .context
            .database
            .live_friend_invite(inviter.id, user_id, email.as_deref())
            .await
        {
            Ok(existing) if existing.expires_at < Utc::now() => {
                self.context
                    .database
                    .set_friend_invite_status(
                        existing.id,
                        InviteStatus::Pending,
                        InviteStatus::Expired,
                    )
                    .await?;
            }
            Ok(_) => return Err(InviteError::Duplicate),
            Err(DatabaseError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        Ok(self
            .context
            .database
            .create_friend_invite(NewFriendInvite {
                inviter_id: inviter.id,
                user_id,
                email,
                message,
                expires_at: Utc::now() + Duration::days(INVITE_LIFETIME_DAYS),
            })
            .await?)
    }

    /// Invitations sent to a team, visible to the room's managers.
    pub async fn team_invites_for_room(
        &self,
        room_id: PrimaryKey,
        actor_id: PrimaryKey,
    ) -> Result<Vec<TeamInviteData>, InviteError> {
        let room = self.context.database.room_by_id(room_id).await?;

        let team_id = match room.team_id {
            Some(team_id) => team_id,
            None => {
                return Err(DatabaseError::NotFound {
                    resource: "team",
                    identifier: "room_id",
                }
                .into())
            }
        };

        require_manager(&self.context.database, room.id, actor_id).await?;

        let mut invites = self.context.database.team_invites_for_team(team_id).await?;

        for invite in invites.iter_mut() {
            self.lazily_expire_team(invite).await?;
        }

        Ok(invites)
    }

    /// Team invitations addressed to the given user.
    pub async fn team_invites_for_user(
        &self,
        user: &UserData,
    ) -> Result<Vec<TeamInviteData>, InviteError> {
        let mut invites = self
            .context
            .database
            .team_invites_for_user(user.id, &user.email)
            .await?;

        for invite in invites.iter_mut() {
            self.lazily_expire_team(invite).await?;
        }

        Ok(invites)
    }

    /// Friend invitations addressed to the given user.
    pub async fn friend_invites_for_user(
        &self,
        user: &UserData,
    ) -> Result<Vec<FriendInviteData>, InviteError> {
        let mut invites = self
            .context
            .database
            .friend_invites_for_user(user.id, &user.email)
            .await?;

        for invite in invites.iter_mut() {
            if invite.status == InviteStatus::Pending && invite.expires_at < Utc::now() {
                self.context
                    .database
                    .set_friend_invite_status(invite.id, InviteStatus::Pending, InviteStatus::Expired)
                    .await?;

                invite.status = InviteStatus::Expired;
            }
        }

        Ok(invites)
    }

    /// Responds to a team invitation. Accepting consumes the invitation and
    /// creates the membership in one transaction.
    pub async fn respond_team(
        &self,
        invite_id: PrimaryKey,
        responder: &UserData,
        action: InviteAction,
        origin: RespondOrigin,
    ) -> Result<Option<RoomMemberData>, InviteError> {
        let invite = self.context.database.team_invite_by_id(invite_id).await?;

        self.check_live(invite.status, invite.expires_at, || {
            self.context.database.set_team_invite_status(
                invite.id,
                InviteStatus::Pending,
                InviteStatus::Expired,
            )
        })
        .await?;

        let invitee = match invite.user_id {
            Some(user_id) => self.context.database.user_by_id(user_id).await?,
            None => {
                let email = invite.email.as_deref().unwrap_or_default();
                self.context.database.user_by_email(email).await?
            }
        };

        let room = self.context.database.room_of_team(invite.team_id).await?;

        let is_invitee = responder.id == invitee.id;

        match origin {
            RespondOrigin::Invitee if !is_invitee => return Err(InviteError::NotInvitee),
            RespondOrigin::RoomAdmin if !is_invitee => {
                require_manager(&self.context.database, room.id, responder.id).await?;
            }
            _ => {}
        }

        match action {
            InviteAction::Accept => {
                if self
                    .context
                    .database
                    .member(room.id, invitee.id)
                    .await
                    .is_ok()
                {
                    return Err(InviteError::AlreadyMember);
                }

                // Joining any team in the tree points the user at the
                // top-level team; an existing pointer is left untouched
                let top_level = self.top_level_of(invite.team_id).await?;

                let member = self
                    .context
                    .database
                    .accept_team_invite(
                        invite.id,
                        NewRoomMember {
                            room_id: room.id,
                            user_id: invitee.id,
                            role: MemberRole::Member,
                        },
                        Some(top_level),
                    )
                    .await
                    .map_err(map_consume_error)?;

                info!(
                    "User {} joined room {} through an invitation",
                    invitee.username, room.id
                );

                self.context.emit(CollabEvent::MemberJoined {
                    room_id: room.id,
                    new_member: member.clone(),
                });

                Ok(Some(member))
            }
            InviteAction::Reject => {
                self.context
                    .database
                    .set_team_invite_status(invite.id, InviteStatus::Pending, InviteStatus::Rejected)
                    .await
                    .map_err(map_consume_error)?;

                Ok(None)
            }
        }
    }

    /// Responds to a friend invitation. Only the designated invitee may do
    /// this. Accepting creates both directions of the follow relation.
    pub async fn respond_friend(
        &self,
        invite_id: PrimaryKey,
        responder: &UserData,
        action: InviteAction,
    ) -> Result<(), InviteError> {
        let invite = self.context.database.friend_invite_by_id(invite_id).await?;

        self.check_live(invite.status, invite.expires_at, || {
            self.context.database.set_friend_invite_status(
                invite.id,
                InviteStatus::Pending,
                InviteStatus::Expired,
            )
        })
        .await?;

        let is_invitee = invite.user_id == Some(responder.id)
            || invite.email.as_deref() == Some(responder.email.as_str());

        if !is_invitee {
            return Err(InviteError::NotInvitee);
        }

        match action {
            InviteAction::Accept => {
                self.context
                    .database
                    .accept_friend_invite(invite.id, invite.inviter.id, responder.id)
                    .await
                    .map_err(map_consume_error)?;

                info!(
                    "Users {} and {} are now mutual friends",
                    invite.inviter.username, responder.username
                );

                Ok(())
            }
            InviteAction::Reject => self
                .context
                .database
                .set_friend_invite_status(invite.id, InviteStatus::Pending, InviteStatus::Rejected)
                .await
                .map_err(map_consume_error),
        }
    }

    /// Validates a target and splits it into the storage shape. Exactly one
    /// of the returned pair is set.
    async fn resolve_target(
        &self,
        inviter: &UserData,
        target: &InviteTarget,
    ) -> Result<(Option<PrimaryKey>, Option<String>), InviteError> {
        match target {
            InviteTarget::User(user_id) => {
                if *user_id == inviter.id {
                    return Err(InviteError::SelfInvite);
                }

                let user = self.context.database.user_by_id(*user_id).await?;
                Ok((Some(user.id), None))
            }
            InviteTarget::Email(email) => {
                if email.eq_ignore_ascii_case(&inviter.email) {
                    return Err(InviteError::SelfInvite);
                }

                Ok((None, Some(email.clone())))
            }
        }
    }

    /// Fails unless the invitation is still live, lazily reclassifying a
    /// stale pending row to expired first.
    async fn check_live<F, Fut>(
        &self,
        status: InviteStatus,
        expires_at: chrono::DateTime<Utc>,
        expire: F,
    ) -> Result<(), InviteError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = crate::db::Result<()>>,
    {
        if status == InviteStatus::Pending && expires_at < Utc::now() {
            expire().await?;
            return Err(InviteError::Expired);
        }

        if status.is_terminal() {
            return Err(InviteError::NotPending);
        }

        Ok(())
    }

    async fn lazily_expire_team(&self, invite: &mut TeamInviteData) -> Result<(), InviteError> {
        if invite.status == InviteStatus::Pending && invite.expires_at < Utc::now() {
            self.context
                .database
                .set_team_invite_status(invite.id, InviteStatus::Pending, InviteStatus::Expired)
                .await?;

            invite.status = InviteStatus::Expired;
        }

        Ok(())
    }

    /// Walks the parent chain up to the top-level team, guarded against
    /// malformed cycles.
    async fn top_level_of(&self, team_id: PrimaryKey) -> Result<PrimaryKey, InviteError> {
        let mut visited = HashSet::new();
        let mut current = self.context.database.team_by_id(team_id).await?;

        while let Some(parent_id) = current.parent_team_id {
            if !visited.insert(current.id) {
                break;
            }

            current = self.context.database.team_by_id(parent_id).await?;
        }

        Ok(current.id)
    }
}

/// A failed conditional consume means someone else already resolved the
/// invitation, or the invitee raced into the room.
fn map_consume_error(e: DatabaseError) -> InviteError {
    match e {
        DatabaseError::Conflict { field: "status", .. } => InviteError::NotPending,
        DatabaseError::Conflict {
            resource: "room member",
            ..
        } => InviteError::AlreadyMember,
        e => InviteError::Db(e),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        teams::{NewTeamInput, TeamManager},
        MemoryDatabase, NewUser, TeamData,
    };

    struct Fixture {
        context: CollabContext<MemoryDatabase>,
        engine: InviteEngine<MemoryDatabase>,
        teams: TeamManager<MemoryDatabase>,
    }

    fn fixture() -> Fixture {
        let (context, _events) = CollabContext::test();

        Fixture {
            engine: InviteEngine::new(&context),
            teams: TeamManager::new(&context),
            context,
        }
    }

    async fn user(fixture: &Fixture, name: &str) -> UserData {
        fixture
            .context
            .database
            .create_user(NewUser {
                username: name.to_string(),
                email: format!("{name}@example.com"),
                password: "secret".to_string(),
                display_name: name.to_string(),
                superuser: false,
            })
            .await
            .unwrap()
    }

    async fn team(fixture: &Fixture, owner: &UserData, name: &str) -> TeamData {
        fixture
            .teams
            .create_team(
                owner,
                NewTeamInput {
                    name: name.to_string(),
                    description: None,
                    grade: 1,
                    is_public: true,
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_invite_requires_room_manager() {
        let fx = fixture();

        let alice = user(&fx, "alice").await;
        let bob = user(&fx, "bob").await;
        let carol = user(&fx, "carol").await;
        let team = team(&fx, &alice, "Alpha").await;

        let result = fx
            .engine
            .invite_to_team(&bob, team.id, InviteTarget::User(carol.id), None)
            .await;

        assert!(matches!(
            result,
            Err(InviteError::Room(RoomError::UserNotInRoom))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_live_invite_is_rejected() {
        let fx = fixture();

        let alice = user(&fx, "alice").await;
        let bob = user(&fx, "bob").await;
        let team = team(&fx, &alice, "Alpha").await;

        fx.engine
            .invite_to_team(&alice, team.id, InviteTarget::User(bob.id), None)
            .await
            .unwrap();

        let result = fx
            .engine
            .invite_to_team(&alice, team.id, InviteTarget::User(bob.id), None)
            .await;

        assert!(matches!(result, Err(InviteError::Duplicate)));

        // Inviting the same person by email is not detected as a duplicate
        let by_email = fx
            .engine
            .invite_to_team(
                &alice,
                team.id,
                InviteTarget::Email("bob@example.com".to_string()),
                None,
            )
            .await;

        assert!(by_email.is_ok());
    }

    #[tokio::test]
    async fn test_accept_is_single_use() {
        let fx = fixture();

        let alice = user(&fx, "alice").await;
        let bob = user(&fx, "bob").await;
        let team = team(&fx, &alice, "Alpha").await;
        let room = fx.context.database.room_of_team(team.id).await.unwrap();

        let invite = fx
            .engine
            .invite_to_team(&alice, team.id, InviteTarget::User(bob.id), None)
            .await
            .unwrap();

        let member = fx
            .engine
            .respond_team(invite.id, &bob, InviteAction::Accept, RespondOrigin::Invitee)
            .await
            .unwrap()
            .expect("accept returns the new member");

        assert_eq!(member.role, MemberRole::Member);

        // Accepting again must fail without creating a second membership
        let result = fx
            .engine
            .respond_team(invite.id, &bob, InviteAction::Accept, RespondOrigin::Invitee)
            .await;
        assert!(matches!(result, Err(InviteError::NotPending)));

        let room = fx.context.database.room_by_id(room.id).await.unwrap();
        let bob_memberships = room.members.iter().filter(|m| m.user.id == bob.id).count();
        assert_eq!(bob_memberships, 1);

        // The pointer now names the team
        let bob = fx.context.database.user_by_id(bob.id).await.unwrap();
        assert_eq!(bob.team_id, Some(team.id));
    }

    #[tokio::test]
    async fn test_rejected_invite_stays_rejected() {
        let fx = fixture();

        let alice = user(&fx, "alice").await;
        let bob = user(&fx, "bob").await;
        let team = team(&fx, &alice, "Alpha").await;

        let invite = fx
            .engine
            .invite_to_team(&alice, team.id, InviteTarget::User(bob.id), None)
            .await
            .unwrap();

        fx.engine
            .respond_team(invite.id, &bob, InviteAction::Reject, RespondOrigin::Invitee)
            .await
            .unwrap();

        let result = fx
            .engine
            .respond_team(invite.id, &bob, InviteAction::Accept, RespondOrigin::Invitee)
            .await;
        assert!(matches!(result, Err(InviteError::NotPending)));

        // Rejecting never creates a membership
        let room = fx.context.database.room_of_team(team.id).await.unwrap();
        assert_eq!(room.members.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_invite_expires_on_respond() {
        let fx = fixture();

        let alice = user(&fx, "alice").await;
        let bob = user(&fx, "bob").await;
        let team = team(&fx, &alice, "Alpha").await;

        let invite = fx
            .context
            .database
            .create_team_invite(crate::NewTeamInvite {
                team_id: team.id,
                inviter_id: alice.id,
                user_id: Some(bob.id),
                email: None,
                message: None,
                expires_at: Utc::now() - Duration::hours(1),
            })
            .await
            .unwrap();

        let result = fx
            .engine
            .respond_team(invite.id, &bob, InviteAction::Accept, RespondOrigin::Invitee)
            .await;
        assert!(matches!(result, Err(InviteError::Expired)));

        let invite = fx.context.database.team_invite_by_id(invite.id).await.unwrap();
        assert_eq!(invite.status, InviteStatus::Expired);

        // Once expired, further responses see a terminal state
        let result = fx
            .engine
            .respond_team(invite.id, &bob, InviteAction::Accept, RespondOrigin::Invitee)
            .await;
        assert!(matches!(result, Err(InviteError::NotPending)));
    }

    #[tokio::test]
    async fn test_only_the_invitee_can_respond() {
        let fx = fixture();

        let alice = user(&fx, "alice").await;
        let bob = user(&fx, "bob").await;
        let carol = user(&fx, "carol").await;
        let team = team(&fx, &alice, "Alpha").await;

        let invite = fx
            .engine
            .invite_to_team(&alice, team.id, InviteTarget::User(bob.id), None)
            .await
            .unwrap();

        let result = fx
            .engine
            .respond_team(invite.id, &carol, InviteAction::Accept, RespondOrigin::Invitee)
            .await;
        assert!(matches!(result, Err(InviteError::NotInvitee)));

        // A room manager can resolve it administratively on bob's behalf
        let member = fx
            .engine
            .respond_team(invite.id, &alice, InviteAction::Accept, RespondOrigin::RoomAdmin)
            .await
            .unwrap()
            .expect("administrative accept returns the new member");

        assert_eq!(member.user.id, bob.id);
    }

    #[tokio::test]
    async fn test_sub_team_invite_points_at_top_level() {
        let fx = fixture();

        let alice = user(&fx, "alice").await;
        let bob = user(&fx, "bob").await;
        let root = team(&fx, &alice, "Alpha").await;
        let sub_team = fx
            .teams
            .create_sub_team(
                &alice,
                root.id,
                NewTeamInput {
                    name: "Juniors".to_string(),
                    description: None,
                    grade: 1,
                    is_public: true,
                },
            )
            .await
            .unwrap();

        let invite = fx
            .engine
            .invite_to_team(&alice, sub_team.id, InviteTarget::User(bob.id), None)
            .await
            .unwrap();

        fx.engine
            .respond_team(invite.id, &bob, InviteAction::Accept, RespondOrigin::Invitee)
            .await
            .unwrap();

        let bob = fx.context.database.user_by_id(bob.id).await.unwrap();
        assert_eq!(bob.team_id, Some(root.id));
    }

    #[tokio::test]
    async fn test_friend_invite_creates_symmetric_follows() {
        let fx = fixture();

        let alice = user(&fx, "alice").await;
        let bob = user(&fx, "bob").await;

        let invite = fx
            .engine
            .invite_friend(&alice, InviteTarget::User(bob.id), None)
            .await
            .unwrap();

        // Someone else cannot resolve it
        let carol = user(&fx, "carol").await;
        let result = fx
            .engine
            .respond_friend(invite.id, &carol, InviteAction::Accept)
            .await;
        assert!(matches!(result, Err(InviteError::NotInvitee)));

        fx.engine
            .respond_friend(invite.id, &bob, InviteAction::Accept)
            .await
            .unwrap();

        let db = &fx.context.database;
        assert!(db.is_following(alice.id, bob.id).await.unwrap());
        assert!(db.is_following(bob.id, alice.id).await.unwrap());

        let result = fx
            .engine
            .respond_friend(invite.id, &bob, InviteAction::Accept)
            .await;
        assert!(matches!(result, Err(InviteError::NotPending)));
    }

    #[tokio::test]
    async fn test_email_invite_resolves_account_at_accept() {
        let fx = fixture();

        let alice = user(&fx, "alice").await;
        let bob = user(&fx, "bob").await;
        let team = team(&fx, &alice, "Alpha").await;

        let invite = fx
            .engine
            .invite_to_team(
                &alice,
                team.id,
                InviteTarget::Email("bob@example.com".to_string()),
                None,
            )
            .await
            .unwrap();

        let member = fx
            .engine
            .respond_team(invite.id, &bob, InviteAction::Accept, RespondOrigin::Invitee)
            .await
            .unwrap()
            .expect("accept returns the new member");

        assert_eq!(member.user.id, bob.id);
    }

    #[tokio::test]
    async fn test_self_invite_is_rejected() {
        let fx = fixture();

        let alice = user(&fx, "alice").await;
        let team = team(&fx, &alice, "Alpha").await;

        let result = fx
            .engine
            .invite_to_team(&alice, team.id, InviteTarget::User(alice.id), None)
            .await;
        assert!(matches!(result, Err(InviteError::SelfInvite)));

        let result = fx
            .engine
            .invite_friend(
                &alice,
                InviteTarget::Email("ALICE@example.com".to_string()),
                None,
            )
            .await;
        assert!(matches!(result, Err(InviteError::SelfInvite)));
    }

    #[tokio::test]
    async fn test_flagged_invite_message_is_rejected() {
        let fx = fixture();

        let alice = user(&fx, "alice").await;
        let bob = user(&fx, "bob").await;
        let team = team(&fx, &alice, "Alpha").await;

        let result = fx
            .engine
            .invite_to_team(
                &alice,
                team.id,
                InviteTarget::User(bob.id),
                Some("join us, you moron".to_string()),
            )
            .await;

        assert!(matches!(result, Err(InviteError::Moderation(_))));

        let invites = fx
            .context
            .database
            .team_invites_for_team(team.id)
            .await
            .unwrap();
        assert!(invites.is_empty());
    }
}
