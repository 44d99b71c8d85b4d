use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};

use echo_db::Conversation;
use echo_types::api::{
    Claims, MessagesQuery, MessagesResponse, RoomMessagesResponse, SubmitRequest,
};

use crate::auth::AppState;
use crate::error::ApiError;

pub async fn submit_prompt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SubmitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let room_id = req.room_id.filter(|id| !id.trim().is_empty());
    let res = state
        .orchestrator
        .submit(claims.sub, req.content, room_id)
        .await?;
    Ok(Json(res))
}

/// The caller's own messages: private chat, or their turns in one room.
pub async fn get_all_prompts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<MessagesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = claims.sub;
    let room_id = query.room_id.filter(|id| !id.is_empty());
    let is_room_chat = room_id.is_some();

    let prompts = state
        .db
        .call(move |db| match room_id {
            Some(room_id) => db.get_owner_room_messages(owner, &room_id),
            None => db.get_conversation(&Conversation::Private(owner)),
        })
        .await?;

    Ok(Json(MessagesResponse {
        message: "Prompts retrieved successfully".into(),
        prompts,
        is_room_chat,
    }))
}

/// Every message of a room, for its participants.
pub async fn get_room_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(room_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let lookup = room_id.clone();
    let room = state
        .db
        .call(move |db| db.get_room(&lookup))
        .await?
        .ok_or_else(|| ApiError::NotFound("Room not found".into()))?;

    if !room.is_participant(claims.sub) {
        return Err(ApiError::Forbidden("Not a participant of this room".into()));
    }

    let prompts = state
        .db
        .call(move |db| db.get_conversation(&Conversation::Room(room_id)))
        .await?;

    Ok(Json(RoomMessagesResponse {
        message: "Room messages retrieved".into(),
        prompts,
        room_name: room.name.clone(),
        participants: room.participant_list(),
    }))
}
