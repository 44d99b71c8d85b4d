pub mod auth;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod orchestrator;
pub mod rooms;
pub mod sessions;

use axum::{
    Json, Router,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{delete, get, post},
};
use serde_json::json;

use crate::auth::AppState;
use crate::middleware::require_auth;

/// REST routes under `/api/v1`. The gateway upgrade is mounted by the server.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/v1/test", get(health))
        .route("/api/v1/user/signup", post(auth::signup))
        .route("/api/v1/user/login", post(auth::login))
        .route("/api/v1/user/logout", get(auth::logout))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/v1/prompt", post(messages::submit_prompt))
        .route("/api/v1/prompt/all", get(messages::get_all_prompts))
        .route("/api/v1/prompt/room/{room_id}", get(messages::get_room_messages))
        .route("/api/v1/prompt/sessions", get(sessions::list_sessions))
        .route("/api/v1/prompt/chat/{chat_id}", delete(sessions::delete_session))
        .route("/api/v1/room", get(rooms::list_rooms))
        .route("/api/v1/room/create", post(rooms::create_room))
        .route("/api/v1/room/join/{room_id}", post(rooms::join_room))
        .route("/api/v1/room/{room_id}", get(rooms::get_room_details))
        .route("/api/v1/room/{room_id}/leave", delete(rooms::leave_room))
        .layer(from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "message": "WALL-Echo backend is running" }))
}
