use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use echo_db::Database;
use echo_types::events::{RoomEvent, RoomMessageBroadcast};
use echo_types::models::Role;
use echo_types::room::Room;

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("Room not found")]
    RoomNotFound,

    #[error("You are not a participant of this room")]
    NotAParticipant,

    #[error("Join room {0} before sending to it")]
    NotJoined(String),

    #[error("userId does not match the authenticated user")]
    IdentityMismatch,

    #[error("Unknown connection")]
    UnknownConnection,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl RoomError {
    /// Text for the `error` event. Storage details stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            Self::Storage(_) => "Room service unavailable, try again".to_string(),
            other => other.to_string(),
        }
    }
}

struct ConnectionEntry {
    user_id: Uuid,
    tx: mpsc::UnboundedSender<RoomEvent>,
    room: Option<String>,
}

/// Live room fan-out. Each socket registers a connection; a connection is
/// subscribed to at most one room at a time.
#[derive(Clone)]
pub struct RoomCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    db: Arc<Database>,

    /// room_id -> subscribed connection ids
    rooms: RwLock<HashMap<String, HashSet<Uuid>>>,

    /// conn_id -> identity, send channel and joined room
    connections: RwLock<HashMap<Uuid, ConnectionEntry>>,
}

impl RoomCoordinator {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                db,
                rooms: RwLock::new(HashMap::new()),
                connections: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a socket for `user_id`. Returns (conn_id, receiver).
    pub async fn register(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<RoomEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.connections.write().await.insert(
            conn_id,
            ConnectionEntry {
                user_id,
                tx,
                room: None,
            },
        );
        (conn_id, rx)
    }

    /// Drop a connection and its subscription. Nobody is notified.
    pub async fn unregister(&self, conn_id: Uuid) {
        let entry = self.inner.connections.write().await.remove(&conn_id);
        if let Some(room_id) = entry.and_then(|e| e.room) {
            self.unsubscribe(&room_id, conn_id).await;
        }
    }

    /// The identity a connection was registered with.
    pub async fn identity(&self, conn_id: Uuid) -> Option<Uuid> {
        self.inner
            .connections
            .read()
            .await
            .get(&conn_id)
            .map(|e| e.user_id)
    }

    #[cfg(test)]
    pub async fn joined_room(&self, conn_id: Uuid) -> Option<String> {
        self.inner
            .connections
            .read()
            .await
            .get(&conn_id)
            .and_then(|e| e.room.clone())
    }

    /// Number of live connections subscribed to a room.
    #[cfg(test)]
    pub async fn room_size(&self, room_id: &str) -> usize {
        self.inner
            .rooms
            .read()
            .await
            .get(room_id)
            .map_or(0, HashSet::len)
    }

    /// Subscribe a connection to a room its identity participates in.
    ///
    /// The joiner gets `room-joined`, other members get `user-joined`. A
    /// connection already in another room leaves it first.
    pub async fn join(&self, conn_id: Uuid, room_id: &str) -> Result<Room, RoomError> {
        let user_id = self.identity(conn_id).await.ok_or(RoomError::UnknownConnection)?;

        let lookup = room_id.to_string();
        let room = self
            .inner
            .db
            .call(move |db| db.get_active_room(&lookup))
            .await?
            .ok_or(RoomError::RoomNotFound)?;
        let participant = room
            .find_participant(user_id)
            .cloned()
            .ok_or(RoomError::NotAParticipant)?;

        let previous = {
            let mut connections = self.inner.connections.write().await;
            let entry = connections
                .get_mut(&conn_id)
                .ok_or(RoomError::UnknownConnection)?;
            entry.room.replace(room_id.to_string())
        };

        match previous.as_deref() {
            Some(prev) if prev == room_id => {}
            Some(prev) => {
                self.unsubscribe(prev, conn_id).await;
                self.announce_left(prev, conn_id, user_id).await;
            }
            None => {}
        }
        let newly_joined = self
            .inner
            .rooms
            .write()
            .await
            .entry(room_id.to_string())
            .or_default()
            .insert(conn_id);

        self.send_to_connection(
            conn_id,
            RoomEvent::RoomJoined {
                room_id: room_id.to_string(),
                participants: room.participant_list(),
                message: format!("Joined room \"{}\"", room.name),
            },
        )
        .await;

        if newly_joined {
            self.fan_out(
                room_id,
                RoomEvent::UserJoined {
                    user_id,
                    name: participant.name,
                    color: participant.color,
                    joined_at: Utc::now(),
                },
                |id, _| id == conn_id,
            )
            .await;
        }

        info!("Connection {} ({}) joined room {}", conn_id, user_id, room_id);
        Ok(room)
    }

    /// Unsubscribe from a room. `user-left` is sent to the remaining members
    /// whether or not the connection was subscribed.
    pub async fn leave(&self, conn_id: Uuid, room_id: &str) -> Result<(), RoomError> {
        let user_id = {
            let mut connections = self.inner.connections.write().await;
            let entry = connections
                .get_mut(&conn_id)
                .ok_or(RoomError::UnknownConnection)?;
            if entry.room.as_deref() == Some(room_id) {
                entry.room = None;
            }
            entry.user_id
        };

        self.unsubscribe(room_id, conn_id).await;
        self.announce_left(room_id, conn_id, user_id).await;
        info!("Connection {} ({}) left room {}", conn_id, user_id, room_id);
        Ok(())
    }

    /// Unsubscribe every connection `user_id` holds in a room, after they
    /// stopped being a participant. Remaining members get one `user-left`.
    /// Returns how many connections were evicted.
    pub async fn evict(&self, user_id: Uuid, room_id: &str) -> usize {
        let evicted: Vec<Uuid> = {
            let mut connections = self.inner.connections.write().await;
            connections
                .iter_mut()
                .filter(|(_, e)| e.user_id == user_id && e.room.as_deref() == Some(room_id))
                .map(|(conn_id, e)| {
                    e.room = None;
                    *conn_id
                })
                .collect()
        };
        if evicted.is_empty() {
            return 0;
        }

        for conn_id in &evicted {
            self.unsubscribe(room_id, *conn_id).await;
        }
        self.fan_out(
            room_id,
            RoomEvent::UserLeft {
                user_id,
                left_at: Utc::now(),
            },
            |_, _| false,
        )
        .await;
        info!("Evicted {} connection(s) of {} from room {}", evicted.len(), user_id, room_id);
        evicted.len()
    }

    /// Touch the room and forward the client's message to the other members.
    pub async fn relay_message(
        &self,
        conn_id: Uuid,
        room_id: &str,
        message: Map<String, Value>,
        user_name: Option<String>,
        user_color: Option<String>,
        role: Role,
    ) -> Result<usize, RoomError> {
        let user_id = self.require_joined(conn_id, room_id).await?;

        let now = Utc::now();
        let touched_id = room_id.to_string();
        let touched = self
            .inner
            .db
            .call(move |db| db.touch_room(&touched_id, now))
            .await?;
        if !touched {
            warn!("Relay into room {} which no longer exists", room_id);
        }

        let event = RoomEvent::NewRoomMessage(RoomMessageBroadcast::new(
            message,
            room_id.to_string(),
            Some(user_id),
            user_name,
            user_color,
            role,
            now,
        ));
        Ok(self.fan_out(room_id, event, |id, _| id == conn_id).await)
    }

    /// Forward a typing indicator to the other members. Nothing is stored.
    pub async fn relay_typing(
        &self,
        conn_id: Uuid,
        room_id: &str,
        user_name: String,
        is_typing: bool,
    ) -> Result<usize, RoomError> {
        let user_id = self.require_joined(conn_id, room_id).await?;
        let event = RoomEvent::UserTyping {
            user_id,
            user_name,
            is_typing,
            timestamp: Utc::now(),
        };
        Ok(self.fan_out(room_id, event, |id, _| id == conn_id).await)
    }

    /// Send to every connection in the room, skipping all connections of
    /// `except_user`. Returns how many connections were reached.
    pub async fn broadcast_to_room(
        &self,
        room_id: &str,
        event: RoomEvent,
        except_user: Option<Uuid>,
    ) -> usize {
        self.fan_out(room_id, event, |_, user_id| Some(user_id) == except_user)
            .await
    }

    /// Send a targeted event to one connection.
    pub async fn send_to_connection(&self, conn_id: Uuid, event: RoomEvent) {
        let connections = self.inner.connections.read().await;
        if let Some(entry) = connections.get(&conn_id) {
            let _ = entry.tx.send(event);
        }
    }

    async fn require_joined(&self, conn_id: Uuid, room_id: &str) -> Result<Uuid, RoomError> {
        let connections = self.inner.connections.read().await;
        let entry = connections
            .get(&conn_id)
            .ok_or(RoomError::UnknownConnection)?;
        if entry.room.as_deref() != Some(room_id) {
            return Err(RoomError::NotJoined(room_id.to_string()));
        }
        Ok(entry.user_id)
    }

    async fn unsubscribe(&self, room_id: &str, conn_id: Uuid) {
        let mut rooms = self.inner.rooms.write().await;
        if let Some(members) = rooms.get_mut(room_id) {
            members.remove(&conn_id);
            if members.is_empty() {
                rooms.remove(room_id);
            }
        }
    }

    async fn announce_left(&self, room_id: &str, conn_id: Uuid, user_id: Uuid) {
        self.fan_out(
            room_id,
            RoomEvent::UserLeft {
                user_id,
                left_at: Utc::now(),
            },
            |id, _| id == conn_id,
        )
        .await;
    }

    async fn fan_out<F>(&self, room_id: &str, event: RoomEvent, skip: F) -> usize
    where
        F: Fn(Uuid, Uuid) -> bool,
    {
        let members: Vec<Uuid> = match self.inner.rooms.read().await.get(room_id) {
            Some(members) => members.iter().copied().collect(),
            None => return 0,
        };

        let connections = self.inner.connections.read().await;
        let mut sent = 0;
        for conn_id in members {
            let Some(entry) = connections.get(&conn_id) else {
                continue;
            };
            if skip(conn_id, entry.user_id) {
                continue;
            }
            if entry.tx.send(event.clone()).is_ok() {
                sent += 1;
            } else {
                debug!("Connection {} closed before delivery", conn_id);
            }
        }
        sent
    }
}

impl std::fmt::Debug for RoomCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomCoordinator").finish_non_exhaustive()
    }
}

/// Log and convert a failed operation into an `error` event for its connection.
pub(crate) async fn report(coordinator: &RoomCoordinator, conn_id: Uuid, err: RoomError) {
    match &err {
        RoomError::Storage(e) => error!("Room operation failed for {}: {:#}", conn_id, e),
        other => warn!("Rejected room command from {}: {}", conn_id, other),
    }
    coordinator
        .send_to_connection(
            conn_id,
            RoomEvent::Error {
                message: err.client_message(),
            },
        )
        .await;
}
