use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use echo_db::Database;
use echo_gateway::RoomCoordinator;
use echo_types::api::{Claims, LoginRequest, LoginResponse, SignupRequest, SignupResponse};
use echo_types::models::User;

use crate::error::ApiError;
use crate::orchestrator::ChatOrchestrator;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub coordinator: RoomCoordinator,
    pub orchestrator: ChatOrchestrator,
    /// Base URL used for room share links.
    pub frontend_url: String,
}

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let first_name = req.first_name.trim().to_string();
    let last_name = req.last_name.trim().to_string();
    let email = req.email.trim().to_lowercase();

    // Validate input
    if first_name.is_empty() || last_name.is_empty() {
        return Err(ApiError::BadRequest("First and last name are required".into()));
    }
    if !email.contains('@') {
        return Err(ApiError::BadRequest("A valid email is required".into()));
    }
    if req.password.len() < 8 {
        return Err(ApiError::BadRequest(
            "Password must be at least 8 characters".into(),
        ));
    }

    let lookup = email.clone();
    if state
        .db
        .call(move |db| db.get_user_by_email(&lookup))
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict("User already exists".into()));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();

    let user_id = Uuid::new_v4();
    state
        .db
        .call(move |db| {
            db.create_user(
                &user_id.to_string(),
                &first_name,
                &last_name,
                &email,
                &password_hash,
            )
        })
        .await?;

    info!("User {} signed up", user_id);

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            message: "User signup succeeded".into(),
            user_id,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let invalid = || ApiError::Unauthorized("Invalid credentials".into());

    let email = req.email.trim().to_lowercase();
    let row = state
        .db
        .call(move |db| db.get_user_by_email(&email))
        .await?
        .ok_or_else(invalid)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&row.password)
        .map_err(|e| anyhow::anyhow!("stored password hash is malformed: {}", e))?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| invalid())?;

    let user = row.into_user()?;
    let token = create_token(&state.jwt_secret, state.jwt_ttl_hours, &user)?;

    Ok(Json(LoginResponse {
        message: "User login succeeded".into(),
        user_id: user.id,
        name: user.display_name(),
        token,
    }))
}

/// Tokens are stateless; the client discards its copy.
pub async fn logout() -> impl IntoResponse {
    Json(json!({ "message": "User logged out successfully" }))
}

pub fn create_token(secret: &str, ttl_hours: i64, user: &User) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        name: user.display_name(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(ttl_hours)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}
