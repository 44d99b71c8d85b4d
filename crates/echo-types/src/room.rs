use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Participant colors, handed out in order until the room runs out.
pub const PALETTE: [&str; 15] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7", "#DDA0DD", "#98D8C8", "#F7DC6F",
    "#BB8FCE", "#85C1E9", "#F8C471", "#82E0AA", "#F1948A", "#85DDFF", "#FFAB91",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("user {0} is already a participant")]
    AlreadyMember(Uuid),

    #[error("room owner cannot leave while others are present")]
    OwnerCannotLeave,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_id: Uuid,
    pub name: String,
    pub color: String,
    pub joined_at: DateTime<Utc>,
    pub added_by: Uuid,
}

/// A shared room and its participant directory.
///
/// Participants are keyed by identity for membership checks; `order` keeps
/// join order for display.
#[derive(Debug, Clone)]
pub struct Room {
    pub room_id: String,
    pub name: String,
    pub owner_id: Uuid,
    pub is_active: bool,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    participants: HashMap<Uuid, Participant>,
    order: Vec<Uuid>,
}

impl Room {
    /// Create an active room with the owner as its first participant.
    pub fn new(
        room_id: String,
        name: String,
        owner_id: Uuid,
        owner_name: String,
        now: DateTime<Utc>,
    ) -> Self {
        let owner = Participant {
            user_id: owner_id,
            name: owner_name,
            color: PALETTE[0].to_string(),
            joined_at: now,
            added_by: owner_id,
        };
        Self {
            room_id,
            name,
            owner_id,
            is_active: true,
            last_activity: now,
            created_at: now,
            participants: HashMap::from([(owner_id, owner)]),
            order: vec![owner_id],
        }
    }

    /// Rebuild a room from stored rows. Participants are expected in join order.
    pub fn from_parts(
        room_id: String,
        name: String,
        owner_id: Uuid,
        is_active: bool,
        last_activity: DateTime<Utc>,
        created_at: DateTime<Utc>,
        participants: Vec<Participant>,
    ) -> Self {
        let mut room = Self {
            room_id,
            name,
            owner_id,
            is_active,
            last_activity,
            created_at,
            participants: HashMap::with_capacity(participants.len()),
            order: Vec::with_capacity(participants.len()),
        };
        for p in participants {
            if room.participants.contains_key(&p.user_id) {
                continue;
            }
            room.order.push(p.user_id);
            room.participants.insert(p.user_id, p);
        }
        room
    }

    /// Participants in join order.
    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.order.iter().filter_map(|id| self.participants.get(id))
    }

    pub fn participant_list(&self) -> Vec<Participant> {
        self.participants().cloned().collect()
    }

    pub fn participant_count(&self) -> usize {
        self.order.len()
    }

    pub fn find_participant(&self, user_id: Uuid) -> Option<&Participant> {
        self.participants.get(&user_id)
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains_key(&user_id)
    }

    pub fn is_owner(&self, user_id: Uuid) -> bool {
        self.owner_id == user_id
    }

    /// Add a participant with the first free palette color.
    pub fn add_participant(
        &mut self,
        user_id: Uuid,
        name: String,
        added_by: Uuid,
        now: DateTime<Utc>,
    ) -> Result<&Participant, DirectoryError> {
        if self.participants.contains_key(&user_id) {
            return Err(DirectoryError::AlreadyMember(user_id));
        }

        let participant = Participant {
            user_id,
            name,
            color: self.available_color().to_string(),
            joined_at: now,
            added_by,
        };
        self.order.push(user_id);
        Ok(&*self.participants.entry(user_id).or_insert(participant))
    }

    /// Remove a participant. Returns whether anyone was removed.
    ///
    /// The owner may only leave as the last participant; an empty room is
    /// deactivated.
    pub fn remove_participant(&mut self, user_id: Uuid) -> Result<bool, DirectoryError> {
        if !self.participants.contains_key(&user_id) {
            return Ok(false);
        }
        if self.is_owner(user_id) && self.participant_count() > 1 {
            return Err(DirectoryError::OwnerCannotLeave);
        }

        self.participants.remove(&user_id);
        self.order.retain(|id| *id != user_id);
        if self.order.is_empty() {
            self.is_active = false;
        }
        Ok(true)
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
    }

    fn available_color(&self) -> &'static str {
        PALETTE
            .iter()
            .copied()
            .find(|color| !self.participants.values().any(|p| p.color == *color))
            .unwrap_or_else(|| PALETTE[rand::rng().random_range(0..PALETTE.len())])
    }
}
