use std::borrow::BorrowMut;

use axum::{response::IntoResponse, Json};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::{schemas, serialized};

#[derive(OpenApi)]
#[openapi(
    modifiers(&Security),
    info(
        description = "huddle-server exposes endpoints to interact with this huddle instance"
    ),
    paths(
        crate::auth::register,
        crate::auth::login,
        crate::auth::logout,
        crate::auth::user,
        crate::rooms::room,
        crate::rooms::rename_room,
        crate::rooms::set_member_role,
        crate::rooms::transfer_owner,
        crate::rooms::remove_member,
        crate::rooms::create_private_room,
        crate::rooms::list_private_rooms,
        crate::rooms::private_room_with,
        crate::rooms::messages,
        crate::rooms::create_invitation,
        crate::rooms::list_invitations,
        crate::rooms::respond_invitation,
        crate::teams::create_team,
        crate::teams::team,
        crate::teams::delete_team,
        crate::teams::create_sub_team,
        crate::teams::delete_sub_team,
        crate::teams::post_announcement,
        crate::teams::list_announcements,
        crate::invites::my_team_invites,
        crate::invites::my_friend_invites,
        crate::invites::create_team_invite,
        crate::invites::create_friend_invite,
        crate::invites::accept_team_invite,
        crate::invites::reject_team_invite,
        crate::invites::accept_friend_invite,
        crate::invites::reject_friend_invite,
        crate::gateway::gateway_handshake,
    ),
    components(schemas(
        schemas::LoginSchema,
        schemas::RegisterSchema,
        schemas::RenameRoomSchema,
        schemas::RoleSchema,
        schemas::SetRoleSchema,
        schemas::TransferOwnerSchema,
        schemas::NewPrivateRoomSchema,
        schemas::NewTeamSchema,
        schemas::InviteTargetSchema,
        schemas::NewTeamInviteSchema,
        schemas::InviteActionSchema,
        schemas::RespondInviteSchema,
        schemas::NewAnnouncementSchema,
        serialized::User,
        serialized::LoginResult,
        serialized::Room,
        serialized::RoomMember,
        serialized::Team,
        serialized::TeamInvite,
        serialized::FriendInvite,
        serialized::Message,
        serialized::Announcement,
    ))
)]
pub struct ApiDoc;

struct Security;

impl Modify for Security {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.borrow_mut() {
            let scheme = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .bearer_format("Bearer <token>")
                .build();

            components.add_security_scheme("BearerAuth", SecurityScheme::Http(scheme))
        }
    }
}

pub async fn docs() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
