use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post, put},
    Json,
};

use crate::{
    auth::Session,
    context::ServerContext,
    errors::{ServerError, ServerResult},
    schemas::{
        InviteTargetSchema, MessageHistoryQuery, NewPrivateRoomSchema, RenameRoomSchema,
        RespondInviteSchema, SetRoleSchema, TransferOwnerSchema, ValidatedJson,
    },
    serialized::{Message, Room, RoomMember, TeamInvite, ToSerialized},
    Router,
};
use huddle_collab::RespondOrigin;

const DEFAULT_HISTORY_LIMIT: i64 = 50;

#[utoipa::path(
    get,
    path = "/chatrooms/{room_id}",
    tag = "chatrooms",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Room)
    )
)]
pub(crate) async fn room(
    session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<i32>,
) -> ServerResult<Json<Room>> {
    let room = context.collab.rooms.room_by_id(room_id).await?;
    context
        .collab
        .rooms
        .require_member(room.id, session.user().id)
        .await?;

    Ok(Json(room.to_serialized()))
}

#[utoipa::path(
    put,
    path = "/chatrooms/{room_id}/update",
    tag = "chatrooms",
    request_body = RenameRoomSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Room)
    )
)]
pub(crate) async fn rename_room(
    session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<RenameRoomSchema>,
) -> ServerResult<Json<Room>> {
    let room = context
        .collab
        .rooms
        .rename_room(room_id, session.user().id, &body.name)
        .await?;

    Ok(Json(room.to_serialized()))
}

#[utoipa::path(
    put,
    path = "/chatrooms/{room_id}/members/{user_id}/role",
    tag = "chatrooms",
    request_body = SetRoleSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = RoomMember)
    )
)]
pub(crate) async fn set_member_role(
    session: Session,
    State(context): State<ServerContext>,
    Path((room_id, user_id)): Path<(i32, i32)>,
    ValidatedJson(body): ValidatedJson<SetRoleSchema>,
) -> ServerResult<Json<RoomMember>> {
    let member = context
        .collab
        .rooms
        .set_role(room_id, session.user().id, user_id, body.role.into())
        .await?;

    Ok(Json(member.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/chatrooms/{room_id}/transfer-owner",
    tag = "chatrooms",
    request_body = TransferOwnerSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "Ownership was transferred")
    )
)]
pub(crate) async fn transfer_owner(
    session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<TransferOwnerSchema>,
) -> ServerResult<()> {
    context
        .collab
        .rooms
        .transfer_owner(room_id, session.user().id, body.target_user_id)
        .await?;

    Ok(())
}

#[utoipa::path(
    delete,
    path = "/chatrooms/{room_id}/members/{user_id}",
    tag = "chatrooms",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "Member was removed")
    )
)]
pub(crate) async fn remove_member(
    session: Session,
    State(context): State<ServerContext>,
    Path((room_id, user_id)): Path<(i32, i32)>,
) -> ServerResult<()> {
    context
        .collab
        .rooms
        .remove_member(room_id, session.user().id, user_id)
        .await?;

    Ok(())
}

#[utoipa::path(
    post,
    path = "/chatrooms/private",
    tag = "chatrooms",
    request_body = NewPrivateRoomSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Room)
    )
)]
pub(crate) async fn create_private_room(
    session: Session,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<NewPrivateRoomSchema>,
) -> ServerResult<Json<Room>> {
    let room = context
        .collab
        .rooms
        .create_private_room(&session.user(), body.target_user_id)
        .await?;

    Ok(Json(room.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/chatrooms/private",
    tag = "chatrooms",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<Room>)
    )
)]
pub(crate) async fn list_private_rooms(
    session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Vec<Room>>> {
    let rooms = context
        .collab
        .rooms
        .private_rooms(session.user().id)
        .await?;

    Ok(Json(rooms.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/chatrooms/private/{target_user_id}",
    tag = "chatrooms",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Room)
    )
)]
pub(crate) async fn private_room_with(
    session: Session,
    State(context): State<ServerContext>,
    Path(target_user_id): Path<i32>,
) -> ServerResult<Json<Room>> {
    let room = context
        .collab
        .rooms
        .private_room_with(session.user().id, target_user_id)
        .await?;

    Ok(Json(room.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/chatrooms/{room_id}/messages",
    tag = "chatrooms",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<Message>)
    )
)]
pub(crate) async fn messages(
    session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<i32>,
    Query(query): Query<MessageHistoryQuery>,
) -> ServerResult<Json<Vec<Message>>> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, 500);

    let messages = context
        .collab
        .rooms
        .messages(room_id, session.user().id, limit)
        .await?;

    Ok(Json(messages.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/chatrooms/{room_id}/invitations",
    tag = "chatrooms",
    request_body = InviteTargetSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = TeamInvite)
    )
)]
pub(crate) async fn create_invitation(
    session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<InviteTargetSchema>,
) -> ServerResult<Json<TeamInvite>> {
    let room = context.collab.rooms.room_by_id(room_id).await?;

    let team_id = room.team_id.ok_or(ServerError::BadRequest(
        "Only team rooms can be invited into".to_string(),
    ))?;

    let (target, message) = body.into_target()?;

    let invite = context
        .collab
        .invites
        .invite_to_team(&session.user(), team_id, target, message)
        .await?;

    Ok(Json(invite.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/chatrooms/{room_id}/invitations",
    tag = "chatrooms",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<TeamInvite>)
    )
)]
pub(crate) async fn list_invitations(
    session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<i32>,
) -> ServerResult<Json<Vec<TeamInvite>>> {
    let invites = context
        .collab
        .invites
        .team_invites_for_room(room_id, session.user().id)
        .await?;

    Ok(Json(invites.to_serialized()))
}

#[utoipa::path(
    put,
    path = "/chatrooms/{room_id}/invitations/{invite_id}/respond",
    tag = "chatrooms",
    request_body = RespondInviteSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, description = "Invitation was resolved")
    )
)]
pub(crate) async fn respond_invitation(
    session: Session,
    State(context): State<ServerContext>,
    Path((_room_id, invite_id)): Path<(i32, i32)>,
    ValidatedJson(body): ValidatedJson<RespondInviteSchema>,
) -> ServerResult<()> {
    context
        .collab
        .invites
        .respond_team(
            invite_id,
            &session.user(),
            body.action.into(),
            RespondOrigin::RoomAdmin,
        )
        .await?;

    Ok(())
}

pub fn router() -> Router {
    Router::new()
        .route("/private", post(create_private_room))
        .route("/private", get(list_private_rooms))
        .route("/private/:target_user_id", get(private_room_with))
        .route("/:room_id", get(room))
        .route("/:room_id/update", put(rename_room))
        .route("/:room_id/members/:user_id/role", put(set_member_role))
        .route("/:room_id/members/:user_id", delete(remove_member))
        .route("/:room_id/transfer-owner", post(transfer_owner))
        .route("/:room_id/messages", get(messages))
        .route("/:room_id/invitations", post(create_invitation))
        .route("/:room_id/invitations", get(list_invitations))
        .route(
            "/:room_id/invitations/:invite_id/respond",
            put(respond_invitation),
        )
}
