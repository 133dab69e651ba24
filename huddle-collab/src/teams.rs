use std::collections::HashSet;

use log::info;
use thiserror::Error;

use crate::{
    rooms::{require_member, require_owner},
    AnnouncementData, CollabContext, Database, DatabaseError, ModerationError, NewAnnouncement,
    NewTeam, PrimaryKey, RoomError, TeamData, UserData,
};

pub struct TeamManager<Db> {
    context: CollabContext<Db>,
}

#[derive(Debug, Error)]
pub enum TeamError {
    #[error("User already belongs to a team")]
    AlreadyInTeam,
    #[error("Team is not a sub-team of the given parent")]
    NotSubTeam,
    #[error("Reparenting would make the team tree cyclic")]
    CycleDetected,
    #[error(transparent)]
    Moderation(#[from] ModerationError),
    #[error(transparent)]
    Room(#[from] RoomError),
    #[error(transparent)]
    Db(#[from] DatabaseError),
}

/// What a caller supplies when creating a team or sub-team
#[derive(Debug)]
pub struct NewTeamInput {
    pub name: String,
    pub description: Option<String>,
    pub grade: i32,
    pub is_public: bool,
}

impl<Db> TeamManager<Db>
where
    Db: Database,
{
    pub fn new(context: &CollabContext<Db>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    pub async fn team_by_id(&self, team_id: PrimaryKey) -> Result<TeamData, TeamError> {
        Ok(self.context.database.team_by_id(team_id).await?)
    }

    /// Creates a top-level team with its room, owned by the actor. A user
    /// that already belongs to a team cannot create another one.
    pub async fn create_team(
        &self,
        actor: &UserData,
        input: NewTeamInput,
    ) -> Result<TeamData, TeamError> {
        self.context.moderation.ensure_clean(&input.name)?;

        if let Some(description) = &input.description {
            self.context.moderation.ensure_clean(description)?;
        }

        if actor.team_id.is_some() {
            return Err(TeamError::AlreadyInTeam);
        }

        let team = self
            .context
            .database
            .create_team(NewTeam {
                name: input.name,
                description: input.description,
                grade: input.grade,
                is_public: input.is_public,
                parent_team_id: None,
                user_id: actor.id,
                assign_pointer: true,
            })
            .await?;

        info!("User {} created team {}", actor.username, team.name);

        Ok(team)
    }

    /// Creates a sub-team under a parent. Only the owner of the parent's
    /// room may do this. The actor's top-level `team_id` pointer is left
    /// untouched; sub-team access lives in the room membership.
    pub async fn create_sub_team(
        &self,
        actor: &UserData,
        parent_team_id: PrimaryKey,
        input: NewTeamInput,
    ) -> Result<TeamData, TeamError> {
        self.context.moderation.ensure_clean(&input.name)?;

        if let Some(description) = &input.description {
            self.context.moderation.ensure_clean(description)?;
        }

        let parent = self.context.database.team_by_id(parent_team_id).await?;
        let parent_room = self.context.database.room_of_team(parent.id).await?;

        require_owner(&self.context.database, parent_room.id, actor.id).await?;

        let team = self
            .context
            .database
            .create_team(NewTeam {
                name: input.name,
                description: input.description,
                grade: input.grade,
                is_public: input.is_public,
                parent_team_id: Some(parent.id),
                user_id: actor.id,
                assign_pointer: false,
            })
            .await?;

        info!(
            "User {} created sub-team {} under {}",
            actor.username, team.name, parent.name
        );

        Ok(team)
    }

    /// Moves a team under a new parent. Rejected at write time if the new
    /// parent chain would loop back through this team.
    pub async fn set_parent(
        &self,
        team_id: PrimaryKey,
        actor_id: PrimaryKey,
        new_parent_id: Option<PrimaryKey>,
    ) -> Result<TeamData, TeamError> {
        let team = self.context.database.team_by_id(team_id).await?;
        let room = self.context.database.room_of_team(team.id).await?;

        require_owner(&self.context.database, room.id, actor_id).await?;

        if let Some(parent_id) = new_parent_id {
            let mut visited = HashSet::new();
            let mut cursor = Some(parent_id);

            while let Some(current) = cursor {
                if current == team_id || !visited.insert(current) {
                    return Err(TeamError::CycleDetected);
                }

                cursor = self.context.database.team_by_id(current).await?.parent_team_id;
            }
        }

        Ok(self
            .context
            .database
            .set_team_parent(team_id, new_parent_id)
            .await?)
    }

    /// Deletes a team together with its entire sub-team tree and every
    /// dependent record, in one transaction. Only the owner of the team's
    /// room may do this.
    pub async fn delete_team(
        &self,
        team_id: PrimaryKey,
        actor_id: PrimaryKey,
    ) -> Result<(), TeamError> {
        let team = self.context.database.team_by_id(team_id).await?;
        let room = self.context.database.room_of_team(team.id).await?;

        require_owner(&self.context.database, room.id, actor_id).await?;

        self.cascade(team).await
    }

    /// The single-node variant: removes one sub-team (and anything below
    /// it), authorized by the owner of the *parent* team's room.
    pub async fn delete_sub_team(
        &self,
        parent_team_id: PrimaryKey,
        sub_team_id: PrimaryKey,
        actor_id: PrimaryKey,
    ) -> Result<(), TeamError> {
        let parent = self.context.database.team_by_id(parent_team_id).await?;
        let sub_team = self.context.database.team_by_id(sub_team_id).await?;

        if sub_team.parent_team_id != Some(parent.id) {
            return Err(TeamError::NotSubTeam);
        }

        let parent_room = self.context.database.room_of_team(parent.id).await?;
        require_owner(&self.context.database, parent_room.id, actor_id).await?;

        self.cascade(sub_team).await
    }

    /// Posts a team announcement. The author must be a member of the
    /// team's room and the content passes the moderation gate.
    pub async fn post_announcement(
        &self,
        team_id: PrimaryKey,
        actor: &UserData,
        content: &str,
    ) -> Result<AnnouncementData, TeamError> {
        self.context.moderation.ensure_clean(content)?;

        let room = self.context.database.room_of_team(team_id).await?;
        require_member(&self.context.database, room.id, actor.id).await?;

        Ok(self
            .context
            .database
            .create_announcement(NewAnnouncement {
                team_id,
                author_id: actor.id,
                content: content.to_string(),
            })
            .await?)
    }

    pub async fn announcements(
        &self,
        team_id: PrimaryKey,
        actor_id: PrimaryKey,
    ) -> Result<Vec<AnnouncementData>, TeamError> {
        let room = self.context.database.room_of_team(team_id).await?;
        require_member(&self.context.database, room.id, actor_id).await?;

        Ok(self.context.database.announcements_of_team(team_id).await?)
    }

    /// Collects the full sub-team tree and removes everything it owns.
    async fn cascade(&self, root: TeamData) -> Result<(), TeamError> {
        let root_name = root.name.clone();

        // Breadth-first walk with a visited set, so a malformed parent
        // chain can never loop the traversal
        let mut visited: HashSet<PrimaryKey> = HashSet::new();
        let mut order: Vec<PrimaryKey> = Vec::new();
        let mut frontier = vec![root.id];

        while let Some(team_id) = frontier.pop() {
            if !visited.insert(team_id) {
                continue;
            }

            order.push(team_id);

            for sub_team in self.context.database.sub_teams_of(team_id).await? {
                frontier.push(sub_team.id);
            }
        }

        let mut room_ids = Vec::with_capacity(order.len());

        for team_id in &order {
            match self.context.database.room_of_team(*team_id).await {
                Ok(room) => room_ids.push(room.id),
                Err(DatabaseError::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }

        // Leaves first, so the self-referential parent chain never blocks
        order.reverse();

        self.context
            .database
            .delete_team_tree(&order, &room_ids)
            .await?;

        info!(
            "Deleted team {} ({} team(s), {} room(s))",
            root_name,
            order.len(),
            room_ids.len()
        );

        Ok(())
    }
}
