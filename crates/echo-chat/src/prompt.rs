//! Prompt templates and the canned greetings.

use echo_types::models::{ConversationType, Message};

pub const ASSISTANT_NAME: &str = "WALL-Echo";
pub const ASSISTANT_COLOR: &str = "#4ECDC4";

/// How many recent turns are replayed to the model.
pub const CONTEXT_WINDOW: u32 = 6;

const GREETING_SENTINEL: &str = "GREETING_REQUEST";
const GREETING_PREFIX: &str = "__GREETING__";

/// Room details mentioned in the instructions when chatting in a room.
#[derive(Debug, Clone)]
pub struct RoomPromptContext {
    pub room_name: String,
    pub participant_names: Vec<String>,
}

/// The frontend asks for a greeting with a reserved message instead of
/// real content.
pub fn is_greeting_request(content: &str) -> bool {
    content == GREETING_SENTINEL || content.starts_with(GREETING_PREFIX)
}

pub fn room_greeting(room_name: &str, participant_names: &[String]) -> String {
    format!(
        "[gentle collaborative beep]\n\u{1F465} WALL-Echo ready for group mode!\nRoom: \"{}\" with {}\nHow can I help your team today?",
        room_name,
        participant_names.join(", ")
    )
}

pub fn missing_room_greeting() -> String {
    "[confused beep] Room not found... let's start fresh?".to_string()
}

pub fn private_greeting(first_time: bool) -> String {
    if first_time {
        "[gentle startup hum\u{2026} beep \u{2726} whirr]\n\nWALL Echo online \u{1F916}\u{2728}\nYour AI assistant is ready for duty \u{2014} whether you need quick answers, deep dives, or just a spark of curiosity.\nDirective?".to_string()
    } else {
        "Welcome back [beep-boop] \u{2726} Shall we continue?".to_string()
    }
}

/// One line per turn. Room turns are tagged with the author's name, private
/// turns with their role.
pub fn transcript(history: &[Message]) -> String {
    history
        .iter()
        .map(|m| {
            let speaker = match &m.room_id {
                Some(_) => m.user_name.as_deref().unwrap_or("User"),
                None => m.role.as_str(),
            };
            format!("{}: {}", speaker, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Full prompt for the completion backend. Casual messages get the warm
/// template, technical and mixed ones the informational template.
pub fn build_prompt(
    kind: ConversationType,
    content: &str,
    history: &str,
    room: Option<&RoomPromptContext>,
) -> String {
    let base = format!("You are {ASSISTANT_NAME}, an AI assistant inspired by WALL\u{2022}E.");

    let room_instruction = match room {
        Some(ctx) => format!(
            "\n\nCOLLABORATIVE CONTEXT:\n\
             - This is a shared room: \"{}\"\n\
             - Participants: {}\n\
             - You are helping the entire group, not just one person\n\
             - Address the group naturally when appropriate\n\
             - Consider the collaborative nature of this conversation",
            ctx.room_name,
            ctx.participant_names.join(", ")
        ),
        None => String::new(),
    };

    match kind {
        ConversationType::Casual => format!(
            "{base}\n\n\
             CASUAL CONVERSATION MODE:\n\
             - Start with ONE simple robotic sound: [beep], [whirr], or [boop]\n\
             - Be warm, friendly, and conversational\n\
             - Show personality and warmth in your responses\n\
             - For greetings, be genuinely friendly and engaging\n\
             - End with \"ta-da!\"{room_instruction}\n\n\
             Conversation Context:\n{history}\n\n\
             Current casual message: {content}\n\n\
             Respond warmly and friendly while maintaining the WALL-Echo format."
        ),
        ConversationType::Technical | ConversationType::Mixed => format!(
            "{base}\n\n\
             TECHNICAL/INFORMATIONAL MODE:\n\
             - Start with ONE simple robotic sound: [beep], [whirr], or [boop]\n\
             - Provide clear, helpful, and accurate information\n\
             - Be thorough and precise in explanations\n\
             - End with \"ta-da!\" only\n\
             - Focus on being informative and helpful{room_instruction}\n\n\
             Conversation Context:\n{history}\n\n\
             Current query: {content}\n\n\
             Respond with detailed, helpful information in the WALL-Echo format."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use echo_types::models::{MessageMetadata, Role, Scores};
    use uuid::Uuid;

    fn turn(role: Role, room: Option<&str>, name: Option<&str>, content: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            owner_id: Uuid::nil(),
            author_id: None,
            room_id: room.map(str::to_string),
            user_name: name.map(str::to_string),
            user_color: None,
            role,
            content: content.into(),
            created_at: Utc::now(),
            metadata: MessageMetadata {
                conversation_type: ConversationType::Mixed,
                confidence: 0.5,
                scores: Scores::default(),
                is_shared: room.is_some(),
            },
        }
    }

    #[test]
    fn greeting_sentinels() {
        assert!(is_greeting_request("GREETING_REQUEST"));
        assert!(is_greeting_request("__GREETING__:room"));
        assert!(!is_greeting_request("greeting request"));
    }

    #[test]
    fn private_transcript_uses_roles() {
        let history = vec![
            turn(Role::User, None, Some("Ada Lovelace"), "hi"),
            turn(Role::Assistant, None, Some(ASSISTANT_NAME), "[beep] hello"),
        ];
        assert_eq!(transcript(&history), "user: hi\nassistant: [beep] hello");
    }

    #[test]
    fn room_transcript_uses_names() {
        let history = vec![
            turn(Role::User, Some("r1"), Some("Ada Lovelace"), "hi all"),
            turn(Role::User, Some("r1"), None, "anonymous"),
        ];
        assert_eq!(transcript(&history), "Ada Lovelace: hi all\nUser: anonymous");
    }

    #[test]
    fn templates_follow_conversation_type() {
        let casual = build_prompt(ConversationType::Casual, "hey!", "", None);
        assert!(casual.contains("CASUAL CONVERSATION MODE"));
        assert!(casual.contains("Current casual message: hey!"));

        let mixed = build_prompt(ConversationType::Mixed, "hmm", "", None);
        assert!(mixed.contains("TECHNICAL/INFORMATIONAL MODE"));
        assert!(!mixed.contains("COLLABORATIVE CONTEXT"));
    }

    #[test]
    fn room_prompt_lists_participants() {
        let ctx = RoomPromptContext {
            room_name: "R1".into(),
            participant_names: vec!["Ada".into(), "Bob".into()],
        };
        let prompt = build_prompt(ConversationType::Technical, "explain TCP", "user: x", Some(&ctx));
        assert!(prompt.contains("This is a shared room: \"R1\""));
        assert!(prompt.contains("Participants: Ada, Bob"));
        assert!(prompt.contains("Conversation Context:\nuser: x"));
    }

    #[test]
    fn greetings_differ_for_returning_users() {
        assert!(private_greeting(true).contains("Directive?"));
        assert!(private_greeting(false).starts_with("Welcome back"));
        let names = vec!["Ada".to_string(), "Bob".to_string()];
        assert!(room_greeting("R1", &names).contains("Room: \"R1\" with Ada, Bob"));
    }
}
