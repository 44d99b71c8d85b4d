//! One user turn end to end: classify, store, complete, store, fan out.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use echo_chat::classifier;
use echo_chat::completion::CompletionClient;
use echo_chat::fallback::fallback_reply;
use echo_chat::prompt::{self, ASSISTANT_COLOR, ASSISTANT_NAME, CONTEXT_WINDOW, RoomPromptContext};
use echo_db::{Conversation, Database};
use echo_gateway::RoomCoordinator;
use echo_types::api::{RoomContext, SubmitResponse};
use echo_types::events::{RoomEvent, RoomMessageBroadcast};
use echo_types::models::{Message, Role};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Message content is required")]
    EmptyContent,

    #[error("Room not found")]
    RoomNotFound,

    #[error("You are not a participant of this room")]
    NotAParticipant,

    #[error("User not found")]
    UnknownUser,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub struct ChatOrchestrator {
    db: Arc<Database>,
    coordinator: RoomCoordinator,
    completion: Arc<dyn CompletionClient>,
    timeout: Duration,
}

/// Who is speaking, resolved from the room directory or the user record.
struct Speaker {
    name: String,
    color: Option<String>,
}

impl ChatOrchestrator {
    pub fn new(
        db: Arc<Database>,
        coordinator: RoomCoordinator,
        completion: Arc<dyn CompletionClient>,
        timeout: Duration,
    ) -> Self {
        Self {
            db,
            coordinator,
            completion,
            timeout,
        }
    }

    pub async fn submit(
        &self,
        user_id: Uuid,
        content: String,
        room_id: Option<String>,
    ) -> Result<SubmitResponse, ChatError> {
        if content.trim().is_empty() {
            return Err(ChatError::EmptyContent);
        }

        if prompt::is_greeting_request(&content) {
            return self.greet(user_id, room_id).await;
        }

        let (speaker, room_context) = match &room_id {
            Some(room_id) => {
                let (speaker, context) = self.enter_room(user_id, room_id).await?;
                (speaker, Some(context))
            }
            None => {
                let user = self
                    .db
                    .call(move |db| db.get_user(user_id))
                    .await?
                    .ok_or(ChatError::UnknownUser)?;
                let speaker = Speaker {
                    name: user.display_name(),
                    color: None,
                };
                (speaker, None)
            }
        };

        let classification = classifier::classify(&content);
        let metadata = classification.metadata(room_id.is_some());
        debug!(
            kind = classification.kind.as_str(),
            technical = classification.technical_score,
            casual = classification.casual_score,
            "Classified message"
        );

        let user_message = Message {
            id: Uuid::new_v4(),
            owner_id: user_id,
            author_id: Some(user_id),
            room_id: room_id.clone(),
            user_name: Some(speaker.name),
            user_color: speaker.color,
            role: Role::User,
            content: content.clone(),
            created_at: Utc::now(),
            metadata: metadata.clone(),
        };
        self.store(user_message.clone()).await?;

        let conversation = match &room_id {
            Some(room_id) => Conversation::Room(room_id.clone()),
            None => Conversation::Private(user_id),
        };
        let history = self
            .db
            .call(move |db| db.get_recent_messages(&conversation, CONTEXT_WINDOW))
            .await?;

        let prompt_room = room_context.as_ref().map(|ctx| RoomPromptContext {
            room_name: ctx.room_name.clone(),
            participant_names: ctx.participants.iter().map(|p| p.name.clone()).collect(),
        });
        let full_prompt = prompt::build_prompt(
            classification.kind,
            &content,
            &prompt::transcript(&history),
            prompt_room.as_ref(),
        );

        let reply = self.complete(&full_prompt, &content).await;

        let assistant_message = Message {
            id: Uuid::new_v4(),
            owner_id: user_id,
            author_id: None,
            room_id: room_id.clone(),
            user_name: Some(ASSISTANT_NAME.to_string()),
            user_color: Some(ASSISTANT_COLOR.to_string()),
            role: Role::Assistant,
            content: reply.clone(),
            created_at: Utc::now().max(user_message.created_at),
            metadata,
        };
        self.store(assistant_message.clone()).await?;

        if let Some(room_id) = &room_id {
            for message in [&user_message, &assistant_message] {
                let reached = self
                    .coordinator
                    .broadcast_to_room(room_id, room_broadcast(message, room_id), Some(user_id))
                    .await;
                debug!("Broadcast {} turn to {} connections", message.role.as_str(), reached);
            }
        }

        Ok(SubmitResponse {
            message: "Prompt submitted successfully".into(),
            ai_response: reply,
            prompt_id: Some(user_message.id),
            ai_prompt_id: Some(assistant_message.id),
            conversation_type: Some(classification.kind),
            room_context,
            is_greeting: false,
        })
    }

    async fn greet(&self, user_id: Uuid, room_id: Option<String>) -> Result<SubmitResponse, ChatError> {
        let ai_response = match room_id {
            Some(room_id) => {
                match self.db.call(move |db| db.get_active_room(&room_id)).await? {
                    Some(room) => {
                        let names: Vec<String> =
                            room.participants().map(|p| p.name.clone()).collect();
                        prompt::room_greeting(&room.name, &names)
                    }
                    None => prompt::missing_room_greeting(),
                }
            }
            None => {
                let previous = self
                    .db
                    .call(move |db| db.count_private_messages(user_id))
                    .await?;
                prompt::private_greeting(previous == 0)
            }
        };

        Ok(SubmitResponse {
            message: "Greeting generated".into(),
            ai_response,
            prompt_id: None,
            ai_prompt_id: None,
            conversation_type: None,
            room_context: None,
            is_greeting: true,
        })
    }

    /// Check membership and bump the room's activity.
    async fn enter_room(&self, user_id: Uuid, room_id: &str) -> Result<(Speaker, RoomContext), ChatError> {
        let lookup = room_id.to_string();
        let room = self
            .db
            .call(move |db| db.get_active_room(&lookup))
            .await?
            .ok_or(ChatError::RoomNotFound)?;
        let participant = room
            .find_participant(user_id)
            .ok_or(ChatError::NotAParticipant)?;

        let speaker = Speaker {
            name: participant.name.clone(),
            color: Some(participant.color.clone()),
        };
        let context = RoomContext {
            room_id: room.room_id.clone(),
            room_name: room.name.clone(),
            participants: room.participant_list(),
        };

        let touched = room_id.to_string();
        let now = Utc::now();
        self.db.call(move |db| db.touch_room(&touched, now)).await?;

        Ok((speaker, context))
    }

    async fn store(&self, message: Message) -> Result<(), ChatError> {
        self.db.call(move |db| db.insert_message(&message)).await?;
        Ok(())
    }

    /// Ask the backend, or fall back to a canned reply. Never fails.
    async fn complete(&self, full_prompt: &str, content: &str) -> String {
        match tokio::time::timeout(self.timeout, self.completion.complete(full_prompt)).await {
            Ok(Ok(text)) => {
                info!("Generated response ({} chars)", text.len());
                text
            }
            Ok(Err(e)) => {
                warn!("Completion failed, using fallback reply: {}", e);
                fallback_reply(content)
            }
            Err(_) => {
                warn!("Completion timed out after {:?}, using fallback reply", self.timeout);
                fallback_reply(content)
            }
        }
    }
}

fn room_broadcast(message: &Message, room_id: &str) -> RoomEvent {
    let fields = match serde_json::to_value(message) {
        Ok(Value::Object(fields)) => fields,
        _ => Map::new(),
    };
    RoomEvent::NewRoomMessage(RoomMessageBroadcast::new(
        fields,
        room_id.to_string(),
        message.author_id,
        message.user_name.clone(),
        message.user_color.clone(),
        message.role,
        message.created_at,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use echo_chat::completion::CompletionError;
    use echo_chat::fallback::{categorize, pool};
    use echo_types::models::ConversationType;
    use echo_types::room::Room;

    struct Offline;

    #[async_trait]
    impl CompletionClient for Offline {
        async fn complete(&self, _prompt: &str) -> Result<String, CompletionError> {
            Err(CompletionError::NotConfigured)
        }
    }

    struct Slow;

    #[async_trait]
    impl CompletionClient for Slow {
        async fn complete(&self, _prompt: &str) -> Result<String, CompletionError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("too late".into())
        }
    }

    fn orchestrator(completion: Arc<dyn CompletionClient>) -> (ChatOrchestrator, Arc<Database>, Uuid) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let user = Uuid::new_v4();
        db.create_user(&user.to_string(), "Ada", "Lovelace", "ada@example.com", "hash")
            .unwrap();
        let coordinator = RoomCoordinator::new(db.clone());
        let orchestrator =
            ChatOrchestrator::new(db.clone(), coordinator, completion, Duration::from_millis(50));
        (orchestrator, db, user)
    }

    #[tokio::test]
    async fn failing_backend_still_answers_and_stores_both_turns() {
        let (orchestrator, db, user) = orchestrator(Arc::new(Offline));
        let content = "explain how TCP works";

        let res = orchestrator.submit(user, content.into(), None).await.unwrap();

        assert_eq!(res.conversation_type, Some(ConversationType::Technical));
        assert!(pool(categorize(content), content).contains(&res.ai_response));

        let stored = db.get_conversation(&Conversation::Private(user)).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].role, Role::User);
        assert_eq!(stored[0].user_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(stored[1].role, Role::Assistant);
        assert_eq!(stored[1].author_id, None);
        assert_eq!(stored[1].user_color.as_deref(), Some(ASSISTANT_COLOR));
        assert_eq!(stored[1].metadata, stored[0].metadata);
        assert_eq!(Some(stored[0].id), res.prompt_id);
        assert_eq!(Some(stored[1].id), res.ai_prompt_id);
    }

    #[tokio::test]
    async fn slow_backend_times_out_into_fallback() {
        let (orchestrator, _db, user) = orchestrator(Arc::new(Slow));
        let res = orchestrator.submit(user, "hello there".into(), None).await.unwrap();
        assert_ne!(res.ai_response, "too late");
        assert!(!res.ai_response.is_empty());
    }

    #[tokio::test]
    async fn greeting_is_not_persisted_and_tracks_first_visit() {
        let (orchestrator, db, user) = orchestrator(Arc::new(Offline));

        let first = orchestrator.submit(user, "GREETING_REQUEST".into(), None).await.unwrap();
        assert!(first.is_greeting);
        assert!(first.ai_response.contains("Directive?"));
        assert_eq!(db.count_private_messages(user).unwrap(), 0);

        orchestrator.submit(user, "hi".into(), None).await.unwrap();
        let again = orchestrator.submit(user, "__GREETING__".into(), None).await.unwrap();
        assert!(again.ai_response.starts_with("Welcome back"));
    }

    #[tokio::test]
    async fn room_turns_require_membership() {
        let (orchestrator, db, user) = orchestrator(Arc::new(Offline));
        let owner = Uuid::new_v4();
        let room = Room::new("ab12cd34".into(), "R1".into(), owner, "Bob".into(), Utc::now());
        db.create_room(&room).unwrap();

        assert!(matches!(
            orchestrator.submit(user, "hi".into(), Some("ab12cd34".into())).await,
            Err(ChatError::NotAParticipant)
        ));
        assert!(matches!(
            orchestrator.submit(user, "hi".into(), Some("nope0000".into())).await,
            Err(ChatError::RoomNotFound)
        ));
        assert!(db.get_conversation(&Conversation::Room("ab12cd34".into())).unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_content_is_rejected() {
        let (orchestrator, _db, user) = orchestrator(Arc::new(Offline));
        assert!(matches!(
            orchestrator.submit(user, "   ".into(), None).await,
            Err(ChatError::EmptyContent)
        ));
    }
}
