use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use chrono::{Duration as ChronoDuration, Utc};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use echo_api::auth::{AppState, AppStateInner};
use echo_api::orchestrator::ChatOrchestrator;
use echo_chat::completion::{CompletionClient, CompletionError};
use echo_db::Database;
use echo_gateway::RoomCoordinator;
use echo_types::events::RoomEvent;
use echo_types::models::{ConversationType, Message, MessageMetadata, Role, Scores};

struct Offline;

#[async_trait]
impl CompletionClient for Offline {
    async fn complete(&self, _prompt: &str) -> Result<String, CompletionError> {
        Err(CompletionError::Status {
            status: 429,
            body: "quota exceeded".into(),
        })
    }
}

struct Scripted;

#[async_trait]
impl CompletionClient for Scripted {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        if prompt.contains("COLLABORATIVE CONTEXT") {
            Ok("[beep] Hello team ta-da!".into())
        } else {
            Ok("[whirr] Hello ta-da!".into())
        }
    }
}

struct TestApp {
    router: Router,
    state: AppState,
}

fn app(completion: Arc<dyn CompletionClient>) -> TestApp {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let coordinator = RoomCoordinator::new(db.clone());
    let orchestrator = ChatOrchestrator::new(
        db.clone(),
        coordinator.clone(),
        completion,
        Duration::from_secs(1),
    );
    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: "test-secret".into(),
        jwt_ttl_hours: 1,
        coordinator,
        orchestrator,
        frontend_url: "http://localhost:3000".into(),
    });
    TestApp {
        router: echo_api::router(state.clone()),
        state,
    }
}

impl TestApp {
    async fn send(&self, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let res = self.router.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    /// Sign up and log in. Returns (user id, token).
    async fn user(&self, first: &str, email: &str) -> (Uuid, String) {
        let (status, _) = self
            .send(
                "POST",
                "/api/v1/user/signup",
                None,
                Some(json!({
                    "firstName": first,
                    "lastName": "Tester",
                    "email": email,
                    "password": "correct horse"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = self
            .send(
                "POST",
                "/api/v1/user/login",
                None,
                Some(json!({ "email": email, "password": "correct horse" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let id = body["userId"].as_str().unwrap().parse().unwrap();
        (id, body["token"].as_str().unwrap().to_string())
    }
}

#[tokio::test]
async fn health_is_public() {
    let app = app(Arc::new(Offline));
    let (status, body) = app.send("GET", "/api/v1/test", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn protected_routes_need_a_valid_token() {
    let app = app(Arc::new(Offline));
    let (status, body) = app.send("GET", "/api/v1/prompt/all", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["message"].is_string());

    let (status, _) = app.send("GET", "/api/v1/room", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn signup_rejects_duplicates_and_bad_passwords() {
    let app = app(Arc::new(Offline));
    app.user("Ada", "ada@example.com").await;

    let (status, _) = app
        .send(
            "POST",
            "/api/v1/user/signup",
            None,
            Some(json!({ "firstName": "Ada", "lastName": "Again", "email": "ADA@example.com", "password": "whatever123" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .send(
            "POST",
            "/api/v1/user/signup",
            None,
            Some(json!({ "firstName": "Bob", "lastName": "Short", "email": "bob@example.com", "password": "short" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            "POST",
            "/api/v1/user/login",
            None,
            Some(json!({ "email": "ada@example.com", "password": "wrong password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn offline_backend_still_produces_a_technical_turn() {
    let app = app(Arc::new(Offline));
    let (_, token) = app.user("Ada", "ada@example.com").await;

    let (status, body) = app
        .send(
            "POST",
            "/api/v1/prompt",
            Some(&token),
            Some(json!({ "content": "explain how TCP works" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["conversationType"], "technical");
    assert!(!body["aiResponse"].as_str().unwrap().is_empty());
    assert!(body["roomContext"].is_null());

    let (status, body) = app.send("GET", "/api/v1/prompt/all", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isRoomChat"], false);
    let prompts = body["prompts"].as_array().unwrap();
    assert_eq!(prompts.len(), 2);
    assert_eq!(prompts[0]["role"], "user");
    assert_eq!(prompts[1]["role"], "assistant");
    assert_eq!(prompts[1]["userName"], "WALL-Echo");
    assert_eq!(prompts[1]["metadata"]["conversationType"], "technical");
}

#[tokio::test]
async fn room_lifecycle_and_live_fan_out() {
    let app = app(Arc::new(Scripted));
    let (owner, owner_token) = app.user("Ada", "ada@example.com").await;
    let (guest, guest_token) = app.user("Bob", "bob@example.com").await;
    let (_, outsider_token) = app.user("Eve", "eve@example.com").await;

    let (status, body) = app
        .send("POST", "/api/v1/room/create", Some(&owner_token), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["room"]["name"], "Ada's Room");
    let room_id = body["room"]["id"].as_str().unwrap().to_string();
    assert!(body["room"]["shareLink"].as_str().unwrap().ends_with(&room_id));

    let join_uri = format!("/api/v1/room/join/{room_id}");
    let (status, first) = app.send("POST", &join_uri, Some(&guest_token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, second) = app.send("POST", &join_uri, Some(&guest_token), None).await;
    assert_eq!(second["message"], "Already a participant");
    assert_eq!(first["room"]["userColor"], second["room"]["userColor"]);
    assert_eq!(second["room"]["participantCount"], 2);

    // Owner is live on the gateway; guest posts over HTTP.
    let (conn, mut rx) = app.state.coordinator.register(owner).await;
    app.state.coordinator.join(conn, &room_id).await.unwrap();
    while rx.try_recv().is_ok() {}

    let (status, body) = app
        .send(
            "POST",
            "/api/v1/prompt",
            Some(&guest_token),
            Some(json!({ "content": "hello everyone!", "roomId": room_id })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["aiResponse"], "[beep] Hello team ta-da!");
    assert_eq!(body["roomContext"]["participants"].as_array().unwrap().len(), 2);

    let mut relayed = Vec::new();
    while let Ok(RoomEvent::NewRoomMessage(b)) = rx.try_recv() {
        relayed.push(b);
    }
    assert_eq!(relayed.len(), 2);
    assert_eq!(relayed[0].role, Role::User);
    assert_eq!(relayed[0].user_id, Some(guest));
    assert_eq!(relayed[1].role, Role::Assistant);
    assert_eq!(relayed[1].user_id, None);

    let (status, _) = app
        .send(
            "POST",
            "/api/v1/prompt",
            Some(&outsider_token),
            Some(json!({ "content": "let me in", "roomId": room_id })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send("GET", &format!("/api/v1/prompt/room/{room_id}"), Some(&owner_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prompts"].as_array().unwrap().len(), 2);

    let (_, rooms) = app.send("GET", "/api/v1/room", Some(&guest_token), None).await;
    assert_eq!(rooms["rooms"][0]["isOwner"], false);

    let leave_uri = format!("/api/v1/room/{room_id}/leave");
    let (status, _) = app.send("DELETE", &leave_uri, Some(&owner_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.send("DELETE", &leave_uri, Some(&guest_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["roomDeactivated"], false);

    let (_, body) = app.send("DELETE", &leave_uri, Some(&owner_token), None).await;
    assert_eq!(body["roomDeactivated"], true);

    let (status, _) = app
        .send("GET", &format!("/api/v1/room/{room_id}"), Some(&owner_token), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn leaving_over_http_drops_live_subscriptions() {
    let app = app(Arc::new(Scripted));
    let (owner, owner_token) = app.user("Ada", "ada@example.com").await;
    let (guest, guest_token) = app.user("Bob", "bob@example.com").await;
    let (_, outsider_token) = app.user("Eve", "eve@example.com").await;

    let (_, body) = app
        .send("POST", "/api/v1/room/create", Some(&owner_token), Some(json!({})))
        .await;
    let room_id = body["room"]["id"].as_str().unwrap().to_string();
    app.send("POST", &format!("/api/v1/room/join/{room_id}"), Some(&guest_token), None)
        .await;

    let coordinator = &app.state.coordinator;
    let (owner_conn, mut owner_rx) = coordinator.register(owner).await;
    let (guest_conn, mut guest_rx) = coordinator.register(guest).await;
    coordinator.join(owner_conn, &room_id).await.unwrap();
    coordinator.join(guest_conn, &room_id).await.unwrap();
    while owner_rx.try_recv().is_ok() {}
    while guest_rx.try_recv().is_ok() {}

    let leave_uri = format!("/api/v1/room/{room_id}/leave");

    // Not a participant: nothing changes.
    let (status, body) = app.send("DELETE", &leave_uri, Some(&outsider_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["roomDeactivated"], false);
    assert!(owner_rx.try_recv().is_err());

    let (status, _) = app.send("DELETE", &leave_uri, Some(&guest_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(matches!(
        owner_rx.try_recv(),
        Ok(RoomEvent::UserLeft { user_id, .. }) if user_id == guest
    ));

    let relayed = coordinator
        .relay_typing(guest_conn, &room_id, "Bob".into(), true)
        .await;
    assert!(relayed.is_err());
    let event = RoomEvent::Error { message: "ping".into() };
    assert_eq!(coordinator.broadcast_to_room(&room_id, event, Some(owner)).await, 0);
    assert!(guest_rx.try_recv().is_err());
}

fn stored(owner: Uuid, minutes: i64, role: Role, content: &str) -> Message {
    Message {
        id: Uuid::new_v4(),
        owner_id: owner,
        author_id: (role == Role::User).then_some(owner),
        room_id: None,
        user_name: None,
        user_color: None,
        role,
        content: content.into(),
        created_at: Utc::now() - ChronoDuration::hours(10) + ChronoDuration::minutes(minutes),
        metadata: MessageMetadata {
            conversation_type: ConversationType::Mixed,
            confidence: 0.5,
            scores: Scores::default(),
            is_shared: false,
        },
    }
}

#[tokio::test]
async fn sessions_list_and_guarded_delete() {
    let app = app(Arc::new(Offline));
    let (user, token) = app.user("Ada", "ada@example.com").await;

    // Two bursts two hours apart, plus a lone message in between.
    let log = [
        stored(user, 0, Role::User, "first question"),
        stored(user, 1, Role::Assistant, "first answer"),
        stored(user, 70, Role::User, "lonely"),
        stored(user, 190, Role::User, "second question"),
        stored(user, 191, Role::Assistant, "second answer"),
    ];
    for m in &log {
        app.state.db.insert_message(m).unwrap();
    }

    let (status, body) = app.send("GET", "/api/v1/prompt/sessions", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let sessions = body["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0]["id"], "session-0");
    assert_eq!(sessions[0]["title"], "second question");
    assert_eq!(sessions[1]["firstMessageId"], log[0].id.to_string());

    let stale = format!("/api/v1/prompt/chat/session-0?firstMessageId={}", log[0].id);
    let (status, _) = app.send("DELETE", &stale, Some(&token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let guarded = format!("/api/v1/prompt/chat/session-0?firstMessageId={}", log[3].id);
    let (status, body) = app.send("DELETE", &guarded, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deletedCount"], 2);

    let (status, _) = app.send("DELETE", "/api/v1/prompt/chat/5", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.send("DELETE", "/api/v1/prompt/chat/latest", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = app.send("GET", "/api/v1/prompt/all", Some(&token), None).await;
    assert_eq!(body["prompts"].as_array().unwrap().len(), 3);
}
