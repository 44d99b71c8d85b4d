use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use echo_types::api::{
    Claims, CreateRoomRequest, LeaveRoomResponse, RoomResponse, RoomView, RoomsResponse,
};
use echo_types::models::User;
use echo_types::room::Room;

use crate::auth::AppState;
use crate::error::ApiError;

const ROOM_ID_LEN: usize = 8;

fn room_view(room: &Room, viewer: Uuid, share_link: Option<String>) -> RoomView {
    RoomView {
        id: room.room_id.clone(),
        name: room.name.clone(),
        owner: room.owner_id,
        participants: room.participant_list(),
        user_color: room.find_participant(viewer).map(|p| p.color.clone()),
        last_activity: room.last_activity,
        created_at: room.created_at,
        is_owner: room.is_owner(viewer),
        participant_count: room.participant_count(),
        share_link,
    }
}

fn share_link(frontend_url: &str, room_id: &str) -> String {
    format!("{}/room/{}", frontend_url.trim_end_matches('/'), room_id)
}

/// Short shareable id: the first characters of a fresh UUID.
fn new_room_id() -> String {
    Uuid::new_v4().simple().to_string()[..ROOM_ID_LEN].to_string()
}

async fn current_user(state: &AppState, user_id: Uuid) -> Result<User, ApiError> {
    state
        .db
        .call(move |db| db.get_user(user_id))
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))
}

async fn active_room(state: &AppState, room_id: String) -> Result<Room, ApiError> {
    state
        .db
        .call(move |db| db.get_active_room(&room_id))
        .await?
        .ok_or_else(|| ApiError::NotFound("Room not found or inactive".into()))
}

async fn save(state: &AppState, room: Room) -> Result<Room, ApiError> {
    let room = state
        .db
        .call(move |db| {
            db.save_room(&room)?;
            Ok(room)
        })
        .await?;
    Ok(room)
}

pub async fn create_room(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateRoomRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = current_user(&state, claims.sub).await?;

    let name = req
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| format!("{}'s Room", user.first_name));

    let owner_name = user.display_name();
    let room = state
        .db
        .call(move |db| {
            let mut room_id = new_room_id();
            while db.room_exists(&room_id)? {
                room_id = new_room_id();
            }
            let room = Room::new(room_id, name, user.id, owner_name, Utc::now());
            db.create_room(&room)?;
            Ok(room)
        })
        .await?;

    info!("Room {} created by {}", room.room_id, claims.sub);

    let link = share_link(&state.frontend_url, &room.room_id);
    Ok((
        StatusCode::CREATED,
        Json(RoomResponse {
            message: "Room created successfully".into(),
            room: room_view(&room, claims.sub, Some(link)),
        }),
    ))
}

/// Joining twice is harmless: the existing participant is returned as is.
pub async fn join_room(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(room_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let mut room = active_room(&state, room_id).await?;

    if room.is_participant(claims.sub) {
        return Ok(Json(RoomResponse {
            message: "Already a participant".into(),
            room: room_view(&room, claims.sub, None),
        }));
    }

    let user = current_user(&state, claims.sub).await?;
    let now = Utc::now();
    room.add_participant(user.id, user.display_name(), user.id, now)?;
    room.touch(now);
    let room = save(&state, room).await?;

    info!("User {} joined room {}", claims.sub, room.room_id);

    Ok(Json(RoomResponse {
        message: "Joined room successfully".into(),
        room: room_view(&room, claims.sub, None),
    }))
}

pub async fn get_room_details(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(room_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let room = active_room(&state, room_id).await?;
    if !room.is_participant(claims.sub) {
        return Err(ApiError::Forbidden("Not a participant of this room".into()));
    }

    let link = share_link(&state.frontend_url, &room.room_id);
    Ok(Json(RoomResponse {
        message: "Room details retrieved".into(),
        room: room_view(&room, claims.sub, Some(link)),
    }))
}

/// Active rooms the caller is in, most recently active first.
pub async fn list_rooms(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    let rooms = state
        .db
        .call(move |db| db.get_rooms_for_user(user_id))
        .await?;

    Ok(Json(RoomsResponse {
        message: "User rooms retrieved".into(),
        rooms: rooms.iter().map(|r| room_view(r, user_id, None)).collect(),
    }))
}

pub async fn leave_room(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(room_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let lookup = room_id.clone();
    let mut room = state
        .db
        .call(move |db| db.get_room(&lookup))
        .await?
        .ok_or_else(|| ApiError::NotFound("Room not found".into()))?;

    // Leaving a room you are not in changes nothing.
    if !room.remove_participant(claims.sub)? {
        return Ok(Json(LeaveRoomResponse {
            message: "Left room successfully".into(),
            room_deactivated: !room.is_active,
        }));
    }
    room.touch(Utc::now());
    let room = save(&state, room).await?;

    let evicted = state.coordinator.evict(claims.sub, &room_id).await;
    info!(
        "User {} left room {} (deactivated: {}, connections evicted: {})",
        claims.sub, room_id, !room.is_active, evicted
    );

    Ok(Json(LeaveRoomResponse {
        message: "Left room successfully".into(),
        room_deactivated: !room.is_active,
    }))
}
