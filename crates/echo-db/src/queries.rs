use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use echo_types::models::{Message, User};
use echo_types::room::Room;

use crate::Database;
use crate::models::{MessageRow, ParticipantRow, RoomRow, UserRow};

/// A message partition: one user's private chat, or a shared room.
#[derive(Debug, Clone)]
pub enum Conversation {
    Private(Uuid),
    Room(String),
}

const MESSAGE_COLUMNS: &str = "id, owner_id, author_id, room_id, user_name, user_color, role, content, \
     created_at, conversation_type, confidence, technical_score, casual_score, is_shared";

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        first_name: &str,
        last_name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, first_name, last_name, email, password, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, first_name, last_name, email, password_hash, Utc::now().timestamp_millis()],
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| query_user(conn, "id", &id.to_string()))?
            .map(UserRow::into_user)
            .transpose()
    }

    // -- Messages --

    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO messages ({MESSAGE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
                ),
                params![
                    message.id.to_string(),
                    message.owner_id.to_string(),
                    message.author_id.map(|id| id.to_string()),
                    message.room_id,
                    message.user_name,
                    message.user_color,
                    message.role.as_str(),
                    message.content,
                    message.created_at.timestamp_millis(),
                    message.metadata.conversation_type.as_str(),
                    message.metadata.confidence,
                    message.metadata.scores.technical,
                    message.metadata.scores.casual,
                    message.metadata.is_shared,
                ],
            )?;
            Ok(())
        })
    }

    /// All messages of a partition, oldest first.
    pub fn get_conversation(&self, conversation: &Conversation) -> Result<Vec<Message>> {
        self.with_conn(|conn| query_conversation(conn, conversation, None))
    }

    /// The `limit` most recent messages of a partition, oldest first.
    pub fn get_recent_messages(&self, conversation: &Conversation, limit: u32) -> Result<Vec<Message>> {
        self.with_conn(|conn| query_conversation(conn, conversation, Some(limit)))
    }

    /// Messages a user wrote or triggered inside a room, oldest first.
    pub fn get_owner_room_messages(&self, owner_id: Uuid, room_id: &str) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE owner_id = ?1 AND room_id = ?2
                 ORDER BY created_at ASC, seq ASC"
            ))?;
            let rows = stmt
                .query_map(params![owner_id.to_string(), room_id], message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(MessageRow::into_message).collect()
        })
    }

    pub fn count_private_messages(&self, owner_id: Uuid) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE owner_id = ?1 AND room_id IS NULL",
                [owner_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    /// Delete private messages by id. Rows owned by anyone else, or living in
    /// a room, are never touched. Returns the number of deleted rows.
    pub fn delete_private_messages(&self, owner_id: Uuid, ids: &[Uuid]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let mut deleted = 0;
            {
                let mut stmt = tx.prepare(
                    "DELETE FROM messages WHERE id = ?1 AND owner_id = ?2 AND room_id IS NULL",
                )?;
                let owner = owner_id.to_string();
                for id in ids {
                    deleted += stmt.execute(params![id.to_string(), owner])?;
                }
            }
            tx.commit()?;
            Ok(deleted)
        })
    }

    // -- Rooms --

    pub fn room_exists(&self, room_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row("SELECT 1 FROM rooms WHERE room_id = ?1", [room_id], |row| row.get(0))
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn create_room(&self, room: &Room) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO rooms (room_id, name, owner_id, is_active, last_activity, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    room.room_id,
                    room.name,
                    room.owner_id.to_string(),
                    room.is_active,
                    room.last_activity.timestamp_millis(),
                    room.created_at.timestamp_millis(),
                ],
            )?;
            write_participants(&tx, room)?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Load a room whether or not it is active.
    pub fn get_room(&self, room_id: &str) -> Result<Option<Room>> {
        self.with_conn(|conn| query_room(conn, room_id))
    }

    /// Load a room only if it is active.
    pub fn get_active_room(&self, room_id: &str) -> Result<Option<Room>> {
        Ok(self.get_room(room_id)?.filter(|room| room.is_active))
    }

    /// Persist a room's mutable state and replace its participant list.
    /// Last write wins.
    pub fn save_room(&self, room: &Room) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "UPDATE rooms SET name = ?2, is_active = ?3, last_activity = ?4 WHERE room_id = ?1",
                params![
                    room.room_id,
                    room.name,
                    room.is_active,
                    room.last_activity.timestamp_millis(),
                ],
            )?;
            tx.execute("DELETE FROM room_participants WHERE room_id = ?1", [&room.room_id])?;
            write_participants(&tx, room)?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Bump a room's last activity. Returns false if the room does not exist.
    pub fn touch_room(&self, room_id: &str, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE rooms SET last_activity = ?2 WHERE room_id = ?1",
                params![room_id, now.timestamp_millis()],
            )?;
            Ok(changed > 0)
        })
    }

    /// Active rooms the user participates in, most recently active first.
    pub fn get_rooms_for_user(&self, user_id: Uuid) -> Result<Vec<Room>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.room_id FROM rooms r
                 JOIN room_participants p ON p.room_id = r.room_id
                 WHERE p.user_id = ?1 AND r.is_active = 1
                 ORDER BY r.last_activity DESC",
            )?;
            let ids = stmt
                .query_map([user_id.to_string()], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut rooms = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(room) = query_room(conn, &id)? {
                    rooms.push(room);
                }
            }
            Ok(rooms)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, first_name, last_name, email, password, created_at FROM users WHERE {column} = ?1"
    ))?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                first_name: row.get(1)?,
                last_name: row.get(2)?,
                email: row.get(3)?,
                password: row.get(4)?,
                created_at: row.get(5)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn message_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        author_id: row.get(2)?,
        room_id: row.get(3)?,
        user_name: row.get(4)?,
        user_color: row.get(5)?,
        role: row.get(6)?,
        content: row.get(7)?,
        created_at: row.get(8)?,
        conversation_type: row.get(9)?,
        confidence: row.get(10)?,
        technical_score: row.get(11)?,
        casual_score: row.get(12)?,
        is_shared: row.get(13)?,
    })
}

fn query_conversation(
    conn: &Connection,
    conversation: &Conversation,
    limit: Option<u32>,
) -> Result<Vec<Message>> {
    let (filter, key) = match conversation {
        Conversation::Private(owner_id) => ("owner_id = ?1 AND room_id IS NULL", owner_id.to_string()),
        Conversation::Room(room_id) => ("room_id = ?1", room_id.clone()),
    };

    let rows = match limit {
        Some(limit) => {
            // Newest first for the LIMIT, flipped back below
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE {filter}
                 ORDER BY created_at DESC, seq DESC LIMIT ?2"
            ))?;
            let mut rows = stmt
                .query_map(params![key, limit], message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.reverse();
            rows
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE {filter}
                 ORDER BY created_at ASC, seq ASC"
            ))?;
            let rows = stmt
                .query_map([key], message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        }
    };

    rows.into_iter().map(MessageRow::into_message).collect()
}

fn query_room(conn: &Connection, room_id: &str) -> Result<Option<Room>> {
    let row = conn
        .query_row(
            "SELECT room_id, name, owner_id, is_active, last_activity, created_at
             FROM rooms WHERE room_id = ?1",
            [room_id],
            |row| {
                Ok(RoomRow {
                    room_id: row.get(0)?,
                    name: row.get(1)?,
                    owner_id: row.get(2)?,
                    is_active: row.get(3)?,
                    last_activity: row.get(4)?,
                    created_at: row.get(5)?,
                })
            },
        )
        .optional()?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT user_id, name, color, joined_at, added_by FROM room_participants
         WHERE room_id = ?1 ORDER BY seq ASC",
    )?;
    let participants = stmt
        .query_map([room_id], |row| {
            Ok(ParticipantRow {
                user_id: row.get(0)?,
                name: row.get(1)?,
                color: row.get(2)?,
                joined_at: row.get(3)?,
                added_by: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Some(row.into_room(participants)?))
}

fn write_participants(conn: &Connection, room: &Room) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO room_participants (room_id, user_id, name, color, joined_at, added_by)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for p in room.participants() {
        stmt.execute(params![
            room.room_id,
            p.user_id.to_string(),
            p.name,
            p.color,
            p.joined_at.timestamp_millis(),
            p.added_by.to_string(),
        ])?;
    }
    Ok(())
}
