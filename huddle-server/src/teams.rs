use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json,
};
use huddle_collab::NewTeamInput;

use crate::{
    auth::Session,
    context::ServerContext,
    errors::ServerResult,
    schemas::{NewAnnouncementSchema, NewTeamSchema, ValidatedJson},
    serialized::{Announcement, Team, ToSerialized},
    Router,
};

#[utoipa::path(
    post,
    path = "/teams",
    tag = "teams",
    request_body = NewTeamSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Team)
    )
)]
pub(crate) async fn create_team(
    session: Session,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<NewTeamSchema>,
) -> ServerResult<Json<Team>> {
    let team = context
        .collab
        .teams
        .create_team(
            &session.user(),
            NewTeamInput {
                name: body.name,
                description: body.description,
                grade: body.grade,
                is_public: body.is_public,
            },
        )
        .await?;

    Ok(Json(team.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/teams/{team_id}",
    tag = "teams",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Team)
    )
)]
pub(crate) async fn team(
    _session: Session,
    State(context): State<ServerContext>,
    Path(team_id): Path<i32>,
) -> ServerResult<Json<Team>> {
    let team = context.collab.teams.team_by_id(team_id).await?;

    Ok(Json(team.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/teams/{team_id}",
    tag = "teams",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "Team and its sub-teams were deleted")
    )
)]
pub(crate) async fn delete_team(
    session: Session,
    State(context): State<ServerContext>,
    Path(team_id): Path<i32>,
) -> ServerResult<()> {
    context
        .collab
        .teams
        .delete_team(team_id, session.user().id)
        .await?;

    Ok(())
}

#[utoipa::path(
    post,
    path = "/teams/{team_id}/subteam",
    tag = "teams",
    request_body = NewTeamSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Team)
    )
)]
pub(crate) async fn create_sub_team(
    session: Session,
    State(context): State<ServerContext>,
    Path(team_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<NewTeamSchema>,
) -> ServerResult<Json<Team>> {
    let team = context
        .collab
        .teams
        .create_sub_team(
            &session.user(),
            team_id,
            NewTeamInput {
                name: body.name,
                description: body.description,
                grade: body.grade,
                is_public: body.is_public,
            },
        )
        .await?;

    Ok(Json(team.to_serialized()))
}

#[utoipa::path(
    delete,
    path = "/teams/{team_id}/subteam/{sub_team_id}",
    tag = "teams",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "Sub-team was deleted")
    )
)]
pub(crate) async fn delete_sub_team(
    session: Session,
    State(context): State<ServerContext>,
    Path((team_id, sub_team_id)): Path<(i32, i32)>,
) -> ServerResult<()> {
    context
        .collab
        .teams
        .delete_sub_team(team_id, sub_team_id, session.user().id)
        .await?;

    Ok(())
}

#[utoipa::path(
    post,
    path = "/teams/{team_id}/announcements",
    tag = "teams",
    request_body = NewAnnouncementSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Announcement)
    )
)]
pub(crate) async fn post_announcement(
    session: Session,
    State(context): State<ServerContext>,
    Path(team_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<NewAnnouncementSchema>,
) -> ServerResult<Json<Announcement>> {
    let announcement = context
        .collab
        .teams
        .post_announcement(team_id, &session.user(), &body.content)
        .await?;

    Ok(Json(announcement.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/teams/{team_id}/announcements",
    tag = "teams",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<Announcement>)
    )
)]
pub(crate) async fn list_announcements(
    session: Session,
    State(context): State<ServerContext>,
    Path(team_id): Path<i32>,
) -> ServerResult<Json<Vec<Announcement>>> {
    let announcements = context
        .collab
        .teams
        .announcements(team_id, session.user().id)
        .await?;

    Ok(Json(announcements.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_team))
        .route("/:team_id", get(team))
        .route("/:team_id", delete(delete_team))
        .route("/:team_id/subteam", post(create_sub_team))
        .route("/:team_id/subteam/:sub_team_id", delete(delete_sub_team))
        .route("/:team_id/announcements", post(post_announcement))
        .route("/:team_id/announcements", get(list_announcements))
}
