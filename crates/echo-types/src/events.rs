use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::models::Role;
use crate::room::Participant;

/// Commands sent FROM client TO server over the room socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum RoomCommand {
    /// Subscribe this connection to a room's broadcasts
    JoinRoom { room_id: String, user_id: Uuid },

    /// Unsubscribe from a room
    LeaveRoom { room_id: String, user_id: Uuid },

    /// Relay a message the client already holds locally
    RoomMessage {
        room_id: String,
        message: Map<String, Value>,
        user_id: Uuid,
        user_name: Option<String>,
        user_color: Option<String>,
        role: Role,
    },

    /// Typing indicator on/off
    RoomTyping {
        room_id: String,
        user_id: Uuid,
        user_name: String,
        is_typing: bool,
    },
}

/// Events sent over the room socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum RoomEvent {
    /// Server accepted the socket
    Ready { user_id: Uuid, name: String },

    /// Join confirmation, sent to the joining connection only
    RoomJoined {
        room_id: String,
        participants: Vec<Participant>,
        message: String,
    },

    /// Someone else subscribed to the room
    UserJoined {
        user_id: Uuid,
        name: String,
        color: String,
        joined_at: DateTime<Utc>,
    },

    /// Someone left the room
    UserLeft { user_id: Uuid, left_at: DateTime<Utc> },

    NewRoomMessage(RoomMessageBroadcast),

    /// Typing indicator. Nothing is stored.
    UserTyping {
        user_id: Uuid,
        user_name: String,
        is_typing: bool,
        timestamp: DateTime<Utc>,
    },

    Error { message: String },
}

/// A relayed room message: the client's message object plus sender fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMessageBroadcast {
    #[serde(flatten)]
    pub message: Map<String, Value>,
    pub room_id: String,
    pub user_id: Option<Uuid>,
    pub user_name: Option<String>,
    pub user_color: Option<String>,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
}

const RESERVED_FIELDS: [&str; 6] = ["roomId", "userId", "userName", "userColor", "role", "timestamp"];

impl RoomMessageBroadcast {
    /// Sender fields always win over keys of the same name in `message`.
    pub fn new(
        mut message: Map<String, Value>,
        room_id: String,
        user_id: Option<Uuid>,
        user_name: Option<String>,
        user_color: Option<String>,
        role: Role,
        timestamp: DateTime<Utc>,
    ) -> Self {
        for key in RESERVED_FIELDS {
            message.remove(key);
        }
        Self {
            message,
            room_id,
            user_id,
            user_name,
            user_color,
            role,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn commands_use_kebab_case_tags_and_camel_case_fields() {
        let raw = json!({
            "type": "room-typing",
            "data": {
                "roomId": "ab12cd34",
                "userId": "6f1c1c55-4bd6-4a64-8c54-6d5e2b6f0b11",
                "userName": "Ada",
                "isTyping": true
            }
        });
        let cmd: RoomCommand = serde_json::from_value(raw).unwrap();
        match cmd {
            RoomCommand::RoomTyping { room_id, user_name, is_typing, .. } => {
                assert_eq!(room_id, "ab12cd34");
                assert_eq!(user_name, "Ada");
                assert!(is_typing);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn broadcast_flattens_message_fields_and_overrides_reserved_keys() {
        let mut message = Map::new();
        message.insert("content".into(), json!("hello room"));
        message.insert("roomId".into(), json!("spoofed"));

        let event = RoomEvent::NewRoomMessage(RoomMessageBroadcast::new(
            message,
            "ab12cd34".into(),
            None,
            Some("WALL-Echo".into()),
            Some("#4ECDC4".into()),
            Role::Assistant,
            Utc::now(),
        ));

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "new-room-message");
        assert_eq!(value["data"]["content"], "hello room");
        assert_eq!(value["data"]["roomId"], "ab12cd34");
        assert_eq!(value["data"]["role"], "assistant");
        assert!(value["data"]["userId"].is_null());
    }
}
