use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ConversationType, Message};
use crate::room::Participant;

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the gateway upgrade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub name: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SignupRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupResponse {
    pub message: String,
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub message: String,
    pub user_id: Uuid,
    pub name: String,
    pub token: String,
}

// -- Prompts --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub content: String,
    pub room_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomContext {
    pub room_id: String,
    pub room_name: String,
    pub participants: Vec<Participant>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub message: String,
    pub ai_response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_prompt_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_type: Option<ConversationType>,
    pub room_context: Option<RoomContext>,
    pub is_greeting: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesQuery {
    pub room_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesResponse {
    pub message: String,
    pub prompts: Vec<Message>,
    pub is_room_chat: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMessagesResponse {
    pub message: String,
    pub prompts: Vec<Message>,
    pub room_name: String,
    pub participants: Vec<Participant>,
}

// -- Sessions --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Positional id, `session-<index>`; most recent session is `session-0`.
    pub id: String,
    pub index: usize,
    pub title: String,
    pub message_count: usize,
    pub started_at: DateTime<Utc>,
    pub first_message_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub message: String,
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSessionQuery {
    /// When set, the delete only goes through if the session at the index
    /// still starts with this message.
    pub first_message_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSessionResponse {
    pub message: String,
    pub deleted_count: usize,
}

// -- Rooms --

#[derive(Debug, Default, Deserialize)]
pub struct CreateRoomRequest {
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomView {
    pub id: String,
    pub name: String,
    pub owner: Uuid,
    pub participants: Vec<Participant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_color: Option<String>,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub is_owner: bool,
    pub participant_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_link: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RoomResponse {
    pub message: String,
    pub room: RoomView,
}

#[derive(Debug, Serialize)]
pub struct RoomsResponse {
    pub message: String,
    pub rooms: Vec<RoomView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRoomResponse {
    pub message: String,
    pub room_deactivated: bool,
}

/// Error body returned by every failing handler.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}
