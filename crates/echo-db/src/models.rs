//! Database row types. These map directly to SQLite rows and are converted
//! into echo-types models at the edge of the DB layer.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use echo_types::models::{ConversationType, Message, MessageMetadata, Role, Scores, User};
use echo_types::room::{Participant, Room};

pub struct UserRow {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub created_at: i64,
}

impl UserRow {
    pub fn into_user(self) -> Result<User> {
        Ok(User {
            id: parse_uuid(&self.id, "users.id")?,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            created_at: from_millis(self.created_at)?,
        })
    }
}

pub struct MessageRow {
    pub id: String,
    pub owner_id: String,
    pub author_id: Option<String>,
    pub room_id: Option<String>,
    pub user_name: Option<String>,
    pub user_color: Option<String>,
    pub role: String,
    pub content: String,
    pub created_at: i64,
    pub conversation_type: String,
    pub confidence: f64,
    pub technical_score: i64,
    pub casual_score: i64,
    pub is_shared: bool,
}

impl MessageRow {
    pub fn into_message(self) -> Result<Message> {
        let author_id = match self.author_id.as_deref() {
            Some(id) => Some(parse_uuid(id, "messages.author_id")?),
            None => None,
        };

        Ok(Message {
            id: parse_uuid(&self.id, "messages.id")?,
            owner_id: parse_uuid(&self.owner_id, "messages.owner_id")?,
            author_id,
            room_id: self.room_id,
            user_name: self.user_name,
            user_color: self.user_color,
            role: Role::parse(&self.role)
                .ok_or_else(|| anyhow!("Corrupt role '{}' on message {}", self.role, self.id))?,
            content: self.content,
            created_at: from_millis(self.created_at)?,
            metadata: MessageMetadata {
                conversation_type: ConversationType::parse(&self.conversation_type)
                    .unwrap_or(ConversationType::Mixed),
                confidence: self.confidence,
                scores: Scores {
                    technical: self.technical_score.max(0) as u32,
                    casual: self.casual_score.max(0) as u32,
                },
                is_shared: self.is_shared,
            },
        })
    }
}

pub struct RoomRow {
    pub room_id: String,
    pub name: String,
    pub owner_id: String,
    pub is_active: bool,
    pub last_activity: i64,
    pub created_at: i64,
}

pub struct ParticipantRow {
    pub user_id: String,
    pub name: String,
    pub color: String,
    pub joined_at: i64,
    pub added_by: String,
}

impl ParticipantRow {
    pub fn into_participant(self) -> Result<Participant> {
        Ok(Participant {
            user_id: parse_uuid(&self.user_id, "room_participants.user_id")?,
            name: self.name,
            color: self.color,
            joined_at: from_millis(self.joined_at)?,
            added_by: parse_uuid(&self.added_by, "room_participants.added_by")?,
        })
    }
}

impl RoomRow {
    pub fn into_room(self, participants: Vec<ParticipantRow>) -> Result<Room> {
        let participants = participants
            .into_iter()
            .map(ParticipantRow::into_participant)
            .collect::<Result<Vec<_>>>()?;

        Ok(Room::from_parts(
            self.room_id,
            self.name,
            parse_uuid(&self.owner_id, "rooms.owner_id")?,
            self.is_active,
            from_millis(self.last_activity)?,
            from_millis(self.created_at)?,
            participants,
        ))
    }
}

fn parse_uuid(raw: &str, column: &str) -> Result<Uuid> {
    raw.parse()
        .map_err(|e| anyhow!("Corrupt {} '{}': {}", column, raw, e))
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| anyhow!("Timestamp out of range: {}", ms))
}
