use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use echo_types::api::ErrorBody;
use echo_types::room::DirectoryError;

use crate::orchestrator::ChatError;

/// Handler error. Renders as `{"message": ...}` with the mapped status.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Internal(e) => {
                error!("Request failed: {:#}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ErrorBody { message })).into_response()
    }
}

impl From<DirectoryError> for ApiError {
    fn from(e: DirectoryError) -> Self {
        match e {
            DirectoryError::AlreadyMember(_) => Self::Conflict(e.to_string()),
            DirectoryError::OwnerCannotLeave => Self::Forbidden(
                "Room owner cannot leave while others are present".to_string(),
            ),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::EmptyContent => Self::BadRequest(e.to_string()),
            ChatError::RoomNotFound | ChatError::UnknownUser => Self::NotFound(e.to_string()),
            ChatError::NotAParticipant => Self::Forbidden(e.to_string()),
            ChatError::Storage(inner) => Self::Internal(inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_errors_map_to_statuses() {
        assert_eq!(
            ApiError::from(DirectoryError::OwnerCannotLeave).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(ChatError::NotAParticipant).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(ChatError::RoomNotFound).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn internal_errors_hide_details() {
        let res = ApiError::from(anyhow::anyhow!("disk on fire")).into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
