use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use huddle_collab::{InviteAction, InviteTarget, MemberRole};
use serde::{de::DeserializeOwned, Deserialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::ServerError;

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoginSchema {
    #[validate(length(max = 128))]
    pub username: String,
    #[validate(length(max = 64))]
    pub password: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RegisterSchema {
    #[validate(length(min = 2, max = 128))]
    pub display_name: String,
    #[validate(length(min = 2, max = 128))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 64))]
    pub password: String,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RenameRoomSchema {
    #[validate(length(min = 1, max = 128))]
    pub name: String,
}

#[derive(Debug, Clone, Copy, ToSchema, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleSchema {
    Owner,
    CoOwner,
    Member,
}

impl From<RoleSchema> for MemberRole {
    fn from(value: RoleSchema) -> Self {
        match value {
            RoleSchema::Owner => Self::Owner,
            RoleSchema::CoOwner => Self::CoOwner,
            RoleSchema::Member => Self::Member,
        }
    }
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SetRoleSchema {
    pub role: RoleSchema,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TransferOwnerSchema {
    pub target_user_id: i32,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewPrivateRoomSchema {
    pub target_user_id: i32,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewTeamSchema {
    #[validate(length(min = 2, max = 128))]
    pub name: String,
    #[validate(length(max = 512))]
    pub description: Option<String>,
    pub grade: i32,
    pub is_public: bool,
}

/// Shared target shape for team and friend invitations. Exactly one of
/// `user_id` and `email` must be supplied.
#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InviteTargetSchema {
    pub user_id: Option<i32>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 256))]
    pub message: Option<String>,
}

impl InviteTargetSchema {
    pub fn into_target(self) -> Result<(InviteTarget, Option<String>), ServerError> {
        let target = match (self.user_id, self.email) {
            (Some(user_id), None) => InviteTarget::User(user_id),
            (None, Some(email)) => InviteTarget::Email(email),
            _ => {
                return Err(ServerError::BadRequest(
                    "Exactly one of userId and email is required".to_string(),
                ))
            }
        };

        Ok((target, self.message))
    }
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewTeamInviteSchema {
    pub team_id: i32,
    pub user_id: Option<i32>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 256))]
    pub message: Option<String>,
}

impl NewTeamInviteSchema {
    pub fn into_target(self) -> Result<(i32, InviteTarget, Option<String>), ServerError> {
        let team_id = self.team_id;
        let (target, message) = InviteTargetSchema {
            user_id: self.user_id,
            email: self.email,
            message: self.message,
        }
        .into_target()?;

        Ok((team_id, target, message))
    }
}

#[derive(Debug, Clone, Copy, ToSchema, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteActionSchema {
    Accept,
    Reject,
}

impl From<InviteActionSchema> for InviteAction {
    fn from(value: InviteActionSchema) -> Self {
        match value {
            InviteActionSchema::Accept => Self::Accept,
            InviteActionSchema::Reject => Self::Reject,
        }
    }
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RespondInviteSchema {
    pub action: InviteActionSchema,
}

#[derive(Debug, ToSchema, Validate, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewAnnouncementSchema {
    #[validate(length(min = 1, max = 2048))]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageHistoryQuery {
    pub limit: Option<i64>,
}

pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let extracted_json: Json<T> = Json::from_request(req, state)
            .await
            .map_err(|_| ServerError::BadRequest("JSON parse failed".to_string()))?;

        extracted_json
            .0
            .validate()
            .map_err(|_| ServerError::BadRequest("Request body is invalid".to_string()))?;

        Ok(Self(extracted_json.0))
    }
}
