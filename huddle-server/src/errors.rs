use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use huddle_collab::{
    AuthError, ChatError, DatabaseError, InviteError, ModerationError, RoomError, TeamError,
};
use serde::Serialize;
use thiserror::Error;

pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    AuthFailed(&'static str),
    #[error("{0}")]
    Forbidden(String),
    #[error("{resource}:{identifier} not found")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unprocessable(String),
    #[error("Unknown internal error: {0}")]
    Unknown(String),
}

/// All error responses share one body shape
#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

impl ServerError {
    pub fn as_status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::AuthFailed(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            message: self.to_string(),
        };

        (self.as_status_code(), Json(body)).into_response()
    }
}

impl From<DatabaseError> for ServerError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound {
                resource,
                identifier,
            } => Self::NotFound {
                resource,
                identifier,
            },
            e @ DatabaseError::Conflict { .. } => Self::Conflict(e.to_string()),
            e @ DatabaseError::Dependency { .. } => Self::Conflict(e.to_string()),
            e => Self::Unknown(e.to_string()),
        }
    }
}

impl From<AuthError> for ServerError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::InvalidCredentials => Self::BadRequest(value.to_string()),
            AuthError::InvalidSession => Self::AuthFailed("Invalid or expired session"),
            AuthError::Db(e) => e.into(),
            e => Self::Unknown(e.to_string()),
        }
    }
}

impl From<ModerationError> for ServerError {
    fn from(value: ModerationError) -> Self {
        Self::Unprocessable(value.to_string())
    }
}

impl From<RoomError> for ServerError {
    fn from(value: RoomError) -> Self {
        match value {
            RoomError::UserNotInRoom | RoomError::NotManager | RoomError::NotOwner => {
                Self::Forbidden(value.to_string())
            }
            RoomError::OwnerExists | RoomError::SoleOwner => Self::Conflict(value.to_string()),
            RoomError::OwnerImmovable | RoomError::SelfTarget | RoomError::SelfPairing => {
                Self::BadRequest(value.to_string())
            }
            RoomError::Moderation(e) => e.into(),
            RoomError::Db(e) => e.into(),
        }
    }
}

impl From<TeamError> for ServerError {
    fn from(value: TeamError) -> Self {
        match value {
            TeamError::AlreadyInTeam | TeamError::CycleDetected => Self::Conflict(value.to_string()),
            TeamError::NotSubTeam => Self::BadRequest(value.to_string()),
            TeamError::Moderation(e) => e.into(),
            TeamError::Room(e) => e.into(),
            TeamError::Db(e) => e.into(),
        }
    }
}

impl From<InviteError> for ServerError {
    fn from(value: InviteError) -> Self {
        match value {
            InviteError::NotPending | InviteError::Expired | InviteError::SelfInvite => {
                Self::BadRequest(value.to_string())
            }
            InviteError::Duplicate | InviteError::AlreadyMember => Self::Conflict(value.to_string()),
            InviteError::NotInvitee => Self::Forbidden(value.to_string()),
            InviteError::Moderation(e) => e.into(),
            InviteError::Room(e) => e.into(),
            InviteError::Db(e) => e.into(),
        }
    }
}

impl From<ChatError> for ServerError {
    fn from(value: ChatError) -> Self {
        match value {
            ChatError::Flagged(e) => e.into(),
            ChatError::Room(e) => e.into(),
            ChatError::Db(e) => e.into(),
        }
    }
}
