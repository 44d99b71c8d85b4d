//! Groups a user's private message log into chat sessions.
//!
//! A session is a run of messages where no two neighbours are more than
//! [`SESSION_GAP_MS`] apart. Single-message runs (an unanswered greeting, say)
//! are not sessions. Sessions are numbered newest first, and that position is
//! the only id they have: it is recomputed on every read.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use echo_types::models::{Message, Role};

/// Inactivity gap that closes a session: one hour.
pub const SESSION_GAP_MS: i64 = 3_600_000;

pub const TITLE_MAX_CHARS: usize = 30;

/// Title of a session with no user message in it.
pub const UNTITLED: &str = "Chat Session";

#[derive(Debug, Clone, Copy)]
pub struct Session<'a> {
    pub index: usize,
    pub messages: &'a [Message],
}

impl Session<'_> {
    pub fn id(&self) -> String {
        format!("session-{}", self.index)
    }

    /// First user message of the run, truncated for display.
    pub fn title(&self) -> String {
        self.messages
            .iter()
            .find(|m| m.role == Role::User)
            .map_or_else(|| UNTITLED.to_string(), |m| truncate_title(&m.content))
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.messages.first().map(|m| m.created_at)
    }

    pub fn first_message_id(&self) -> Option<Uuid> {
        self.messages.first().map(|m| m.id)
    }

    pub fn message_ids(&self) -> Vec<Uuid> {
        self.messages.iter().map(|m| m.id).collect()
    }
}

fn truncate_title(text: &str) -> String {
    if text.chars().count() > TITLE_MAX_CHARS {
        let head: String = text.chars().take(TITLE_MAX_CHARS).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

fn gap_closes_run(prev: &Message, next: &Message) -> bool {
    (next.created_at - prev.created_at).num_milliseconds() > SESSION_GAP_MS
}

/// Split an ascending log into gap-separated runs. The runs partition the
/// input exactly, singletons included.
pub fn split_runs(messages: &[Message]) -> Vec<&[Message]> {
    let mut runs = Vec::new();
    let mut start = 0;

    for (i, current) in messages.iter().enumerate() {
        let closes = match messages.get(i + 1) {
            Some(next) => gap_closes_run(current, next),
            None => true,
        };
        if closes {
            runs.push(&messages[start..=i]);
            start = i + 1;
        }
    }

    runs
}

/// Runs of two or more messages, in chronological order.
pub fn segment(messages: &[Message]) -> Vec<&[Message]> {
    split_runs(messages)
        .into_iter()
        .filter(|run| run.len() >= 2)
        .collect()
}

/// Sessions numbered newest first.
pub fn sessions(messages: &[Message]) -> Vec<Session<'_>> {
    segment(messages)
        .into_iter()
        .rev()
        .enumerate()
        .map(|(index, messages)| Session { index, messages })
        .collect()
}

/// Recompute sessions and pick the one at `index`.
pub fn find_session(messages: &[Message], index: usize) -> Option<Session<'_>> {
    sessions(messages).into_iter().nth(index)
}

/// Accepts `session-3` or a bare `3`.
pub fn parse_session_id(raw: &str) -> Option<usize> {
    raw.strip_prefix("session-").unwrap_or(raw).parse().ok()
}
