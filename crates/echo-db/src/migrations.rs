use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Timestamps are stored as Unix milliseconds; `seq` breaks ties between
/// rows written in the same millisecond.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            first_name  TEXT NOT NULL,
            last_name   TEXT NOT NULL,
            email       TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS messages (
            seq                 INTEGER PRIMARY KEY AUTOINCREMENT,
            id                  TEXT NOT NULL UNIQUE,
            owner_id            TEXT NOT NULL,
            author_id           TEXT,
            room_id             TEXT,
            user_name           TEXT,
            user_color          TEXT,
            role                TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
            content             TEXT NOT NULL,
            created_at          INTEGER NOT NULL,
            conversation_type   TEXT NOT NULL,
            confidence          REAL NOT NULL,
            technical_score     INTEGER NOT NULL DEFAULT 0,
            casual_score        INTEGER NOT NULL DEFAULT 0,
            is_shared           INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_messages_room
            ON messages(room_id, created_at);

        CREATE INDEX IF NOT EXISTS idx_messages_owner_room
            ON messages(owner_id, room_id, created_at);

        CREATE TABLE IF NOT EXISTS rooms (
            room_id         TEXT PRIMARY KEY,
            name            TEXT NOT NULL,
            owner_id        TEXT NOT NULL,
            is_active       INTEGER NOT NULL DEFAULT 1,
            last_activity   INTEGER NOT NULL,
            created_at      INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS room_participants (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            room_id     TEXT NOT NULL REFERENCES rooms(room_id),
            user_id     TEXT NOT NULL,
            name        TEXT NOT NULL,
            color       TEXT NOT NULL,
            joined_at   INTEGER NOT NULL,
            added_by    TEXT NOT NULL,
            UNIQUE(room_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_participants_user
            ON room_participants(user_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
