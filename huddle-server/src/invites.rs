use axum::{
    extract::{Path, State},
    routing::{get, patch, post},
    Json,
};
use huddle_collab::{InviteAction, RespondOrigin};

use crate::{
    auth::Session,
    context::ServerContext,
    errors::ServerResult,
    schemas::{InviteTargetSchema, NewTeamInviteSchema, ValidatedJson},
    serialized::{FriendInvite, TeamInvite, ToSerialized},
    Router,
};

#[utoipa::path(
    get,
    path = "/invite/team",
    tag = "invites",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<TeamInvite>)
    )
)]
pub(crate) async fn my_team_invites(
    session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Vec<TeamInvite>>> {
    let invites = context
        .collab
        .invites
        .team_invites_for_user(&session.user())
        .await?;

    Ok(Json(invites.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/invite/friend",
    tag = "invites",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<FriendInvite>)
    )
)]
pub(crate) async fn my_friend_invites(
    session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Vec<FriendInvite>>> {
    let invites = context
        .collab
        .invites
        .friend_invites_for_user(&session.user())
        .await?;

    Ok(Json(invites.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/invite/team",
    tag = "invites",
    request_body = NewTeamInviteSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = TeamInvite)
    )
)]
pub(crate) async fn create_team_invite(
    session: Session,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<NewTeamInviteSchema>,
) -> ServerResult<Json<TeamInvite>> {
    let (team_id, target, message) = body.into_target()?;

    let invite = context
        .collab
        .invites
        .invite_to_team(&session.user(), team_id, target, message)
        .await?;

    Ok(Json(invite.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/invite/friend",
    tag = "invites",
    request_body = InviteTargetSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = FriendInvite)
    )
)]
pub(crate) async fn create_friend_invite(
    session: Session,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<InviteTargetSchema>,
) -> ServerResult<Json<FriendInvite>> {
    let (target, message) = body.into_target()?;

    let invite = context
        .collab
        .invites
        .invite_friend(&session.user(), target, message)
        .await?;

    Ok(Json(invite.to_serialized()))
}

#[utoipa::path(
    patch,
    path = "/invite/team/{invite_id}/accept",
    tag = "invites",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "Invitation accepted, membership created")
    )
)]
pub(crate) async fn accept_team_invite(
    session: Session,
    State(context): State<ServerContext>,
    Path(invite_id): Path<i32>,
) -> ServerResult<()> {
    context
        .collab
        .invites
        .respond_team(
            invite_id,
            &session.user(),
            InviteAction::Accept,
            RespondOrigin::Invitee,
        )
        .await?;

    Ok(())
}

#[utoipa::path(
    patch,
    path = "/invite/team/{invite_id}/reject",
    tag = "invites",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "Invitation rejected")
    )
)]
pub(crate) async fn reject_team_invite(
    session: Session,
    State(context): State<ServerContext>,
    Path(invite_id): Path<i32>,
) -> ServerResult<()> {
    context
        .collab
        .invites
        .respond_team(
            invite_id,
            &session.user(),
            InviteAction::Reject,
            RespondOrigin::Invitee,
        )
        .await?;

    Ok(())
}

#[utoipa::path(
    patch,
    path = "/invite/friend/{invite_id}/accept",
    tag = "invites",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "Invitation accepted, follow pair created")
    )
)]
pub(crate) async fn accept_friend_invite(
    session: Session,
    State(context): State<ServerContext>,
    Path(invite_id): Path<i32>,
) -> ServerResult<()> {
    context
        .collab
        .invites
        .respond_friend(invite_id, &session.user(), InviteAction::Accept)
        .await?;

    Ok(())
}

#[utoipa::path(
    patch,
    path = "/invite/friend/{invite_id}/reject",
    tag = "invites",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "Invitation rejected")
    )
)]
pub(crate) async fn reject_friend_invite(
    session: Session,
    State(context): State<ServerContext>,
    Path(invite_id): Path<i32>,
) -> ServerResult<()> {
    context
        .collab
        .invites
        .respond_friend(invite_id, &session.user(), InviteAction::Reject)
        .await?;

    Ok(())
}

pub fn router() -> Router {
    Router::new()
        .route("/team", get(my_team_invites))
        .route("/team", post(create_team_invite))
        .route("/team/:invite_id/accept", patch(accept_team_invite))
        .route("/team/:invite_id/reject", patch(reject_team_invite))
        .route("/friend", get(my_friend_invites))
        .route("/friend", post(create_friend_invite))
        .route("/friend/:invite_id/accept", patch(accept_friend_invite))
        .route("/friend/:invite_id/reject", patch(reject_friend_invite))
}
