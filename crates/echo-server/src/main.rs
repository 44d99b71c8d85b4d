mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use echo_api::auth::{AppState, AppStateInner};
use echo_api::middleware::decode_token;
use echo_api::orchestrator::ChatOrchestrator;
use echo_chat::completion::GeminiClient;
use echo_db::Database;
use echo_gateway::RoomCoordinator;
use echo_gateway::connection;

use crate::config::Config;

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "wall_echo=debug,echo_api=debug,echo_gateway=debug,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);

    if config.gemini_api_key.is_none() {
        warn!("GEMINI_API_KEY is not set, every reply will be a fallback");
    }
    let completion = GeminiClient::new(
        config.gemini_api_key.clone(),
        config.gemini_model.clone(),
        config.gemini_base_url.clone(),
        config.completion_timeout,
    )?;

    // Shared state
    let coordinator = RoomCoordinator::new(db.clone());
    let orchestrator = ChatOrchestrator::new(
        db.clone(),
        coordinator.clone(),
        Arc::new(completion),
        config.completion_timeout,
    );
    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        jwt_ttl_hours: config.jwt_ttl_hours,
        coordinator,
        orchestrator,
        frontend_url: config.frontend_url.clone(),
    });

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state.clone());

    let app = echo_api::router(state)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("WALL-Echo server listening on {}", config.addr);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// The token is validated here, so the socket starts out authenticated.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let claims = query
        .token
        .as_deref()
        .and_then(|token| decode_token(&state.jwt_secret, token));

    let Some(claims) = claims else {
        return (StatusCode::UNAUTHORIZED, "Invalid or missing token").into_response();
    };

    let coordinator = state.coordinator.clone();
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, coordinator, claims.sub, claims.name)
    })
}
