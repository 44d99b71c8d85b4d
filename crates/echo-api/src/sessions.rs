use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use echo_chat::session;
use echo_db::Conversation;
use echo_types::api::{
    Claims, DeleteSessionQuery, DeleteSessionResponse, SessionSummary, SessionsResponse,
};

use crate::auth::AppState;
use crate::error::ApiError;

enum DeleteOutcome {
    Missing,
    Moved,
    Deleted(usize),
}

/// The caller's private sessions, newest first.
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = claims.sub;
    let messages = state
        .db
        .call(move |db| db.get_conversation(&Conversation::Private(owner)))
        .await?;

    let sessions = session::sessions(&messages)
        .into_iter()
        .filter_map(|s| {
            Some(SessionSummary {
                id: s.id(),
                index: s.index,
                title: s.title(),
                message_count: s.message_count(),
                started_at: s.started_at()?,
                first_message_id: s.first_message_id()?,
            })
        })
        .collect();

    Ok(Json(SessionsResponse {
        message: "Sessions retrieved successfully".into(),
        sessions,
    }))
}

/// Delete one private session by its position. Sessions are recomputed here,
/// so `firstMessageId` can pin the delete to the session the client saw.
pub async fn delete_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<String>,
    Query(query): Query<DeleteSessionQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let index = session::parse_session_id(&chat_id)
        .ok_or_else(|| ApiError::BadRequest("Invalid chat id".into()))?;
    let owner = claims.sub;
    let expected = query.first_message_id;

    let outcome = state
        .db
        .call(move |db| {
            let messages = db.get_conversation(&Conversation::Private(owner))?;
            let Some(found) = session::find_session(&messages, index) else {
                return Ok(DeleteOutcome::Missing);
            };
            if expected.is_some_and(|id| found.first_message_id() != Some(id)) {
                return Ok(DeleteOutcome::Moved);
            }
            let ids: Vec<Uuid> = found.message_ids();
            Ok(DeleteOutcome::Deleted(db.delete_private_messages(owner, &ids)?))
        })
        .await?;

    match outcome {
        DeleteOutcome::Missing => Err(ApiError::NotFound("Chat session not found".into())),
        DeleteOutcome::Moved => Err(ApiError::Conflict(
            "Chat sessions changed, reload and try again".into(),
        )),
        DeleteOutcome::Deleted(deleted_count) => {
            info!("User {} deleted session {} ({} messages)", owner, index, deleted_count);
            Ok(Json(DeleteSessionResponse {
                message: "Chat session deleted successfully".into(),
                deleted_count,
            }))
        }
    }
}
