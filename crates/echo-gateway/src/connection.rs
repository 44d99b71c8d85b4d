use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use echo_types::events::{RoomCommand, RoomEvent};

use crate::coordinator::{RoomCoordinator, RoomError, report};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a WebSocket whose token was validated at the upgrade layer.
pub async fn handle_connection(
    socket: WebSocket,
    coordinator: RoomCoordinator,
    user_id: Uuid,
    name: String,
) {
    let (mut sender, receiver) = socket.split();

    info!("{} ({}) connected to gateway", name, user_id);

    let ready = RoomEvent::Ready {
        user_id,
        name: name.clone(),
    };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    run_connection_loop(sender, receiver, coordinator, user_id, name).await;
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    coordinator: RoomCoordinator,
    user_id: Uuid,
    name: String,
) {
    let (conn_id, mut events_rx) = coordinator.register(user_id).await;
    let coordinator_recv = coordinator.clone();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward room events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = events_rx.recv() => {
                    let Some(event) = event else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let name_recv = name.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<RoomCommand>(&text) {
                    Ok(cmd) => handle_command(&coordinator_recv, conn_id, user_id, cmd).await,
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            name_recv,
                            user_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    coordinator.unregister(conn_id).await;
    info!("{} ({}) disconnected from gateway", name, user_id);
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &RoomEvent,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to encode room event: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await
}

/// Apply one client command. Failures go back to this connection as an
/// `error` event; the socket stays open.
pub async fn handle_command(
    coordinator: &RoomCoordinator,
    conn_id: Uuid,
    user_id: Uuid,
    cmd: RoomCommand,
) {
    let result = match cmd {
        RoomCommand::JoinRoom {
            room_id,
            user_id: claimed,
        } => match check_identity(user_id, claimed) {
            Ok(()) => coordinator.join(conn_id, &room_id).await.map(|_| ()),
            Err(e) => Err(e),
        },

        RoomCommand::LeaveRoom {
            room_id,
            user_id: claimed,
        } => match check_identity(user_id, claimed) {
            Ok(()) => coordinator.leave(conn_id, &room_id).await,
            Err(e) => Err(e),
        },

        RoomCommand::RoomMessage {
            room_id,
            message,
            user_id: claimed,
            user_name,
            user_color,
            role,
        } => match check_identity(user_id, claimed) {
            Ok(()) => coordinator
                .relay_message(conn_id, &room_id, message, user_name, user_color, role)
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        },

        RoomCommand::RoomTyping {
            room_id,
            user_id: claimed,
            user_name,
            is_typing,
        } => match check_identity(user_id, claimed) {
            Ok(()) => coordinator
                .relay_typing(conn_id, &room_id, user_name, is_typing)
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        report(coordinator, conn_id, e).await;
    }
}

fn check_identity(authenticated: Uuid, claimed: Uuid) -> Result<(), RoomError> {
    if authenticated == claimed {
        Ok(())
    } else {
        Err(RoomError::IdentityMismatch)
    }
}
