//! WebSocket endpoint - the duplex signaling channel.
//!
//! One task per socket owns both halves of the connection. Outbound traffic
//! from the room actor arrives through the `ConnectionHandle` queue; inbound
//! frames are parsed into the closed `ClientMessage` enum and dispatched
//! exhaustively. Malformed input earns the sender an `error` envelope and
//! mutates nothing.
//!
//! Liveness: the server pings on a fixed interval. A socket that has not
//! answered the previous ping is force-closed, which funnels into the same
//! departure path as an explicit leave.

use crate::actors::{ConnectionHandle, RelayKind, RoomActorHandle};
use crate::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use common::protocol::{ClientMessage, ServerMessage};
use common::types::{ParticipantId, RoomId};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, instrument};

/// Routes served by this module.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/ws", get(ws_handler))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// The participant's binding to a room, established by a successful join.
type Session = (RoomActorHandle, ParticipantId);

#[instrument(skip_all, name = "signal.ws", fields(connection_id = tracing::field::Empty))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    // Child of the controller token: process shutdown and room teardown both
    // force-close this socket.
    let cancel_token = state.controller.child_token();
    let (handle, mut outbound) = ConnectionHandle::new(cancel_token.clone());
    tracing::Span::current().record("connection_id", tracing::field::display(handle.connection_id()));

    debug!(target: "signal.ws", "Connection opened");

    let (mut sink, mut stream) = socket.split();
    let mut session: Option<Session> = None;

    let mut ping_ticker = tokio::time::interval(state.heartbeat_interval);
    ping_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; consume it so the first real
    // ping happens one full interval in.
    ping_ticker.tick().await;
    let mut pong_seen = true;

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                // Room teardown or process shutdown: say goodbye and stop.
                let _ = sink.send(Message::Close(None)).await;
                break;
            }

            Some(message) = outbound.recv() => {
                match serde_json::to_string(&message) {
                    Ok(json) => {
                        if sink.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(target: "signal.ws", error = %e, "Failed to encode envelope");
                    }
                }
            }

            _ = ping_ticker.tick() => {
                if !pong_seen {
                    debug!(target: "signal.ws", "Heartbeat missed, closing channel");
                    break;
                }
                pong_seen = false;
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }

            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(&text, &state, &handle, &mut session).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        pong_seen = true;
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // The websocket layer answers pings itself.
                    }
                    Some(Ok(Message::Binary(_))) => {
                        handle.send(ServerMessage::Error {
                            message: "Invalid message format".to_string(),
                        });
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                }
            }
        }
    }

    // Every exit - explicit close, socket error, missed heartbeat, forced
    // teardown - funnels into the same departure path.
    if let Some((room, participant_id)) = session.take() {
        room.leave(participant_id).await;
    }

    debug!(target: "signal.ws", "Connection closed");
}

/// Parse and dispatch one inbound frame.
async fn handle_frame(
    text: &str,
    state: &Arc<AppState>,
    handle: &ConnectionHandle,
    session: &mut Option<Session>,
) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            debug!(target: "signal.ws", error = %e, "Unparseable envelope");
            handle.send(ServerMessage::Error {
                message: "Invalid message format".to_string(),
            });
            return;
        }
    };

    match message {
        ClientMessage::JoinRoom { room_id } => {
            handle_join(&room_id, state, handle, session).await;
        }

        ClientMessage::LeaveRoom => {
            if let Some((room, participant_id)) = session.take() {
                room.leave(participant_id).await;
            }
        }

        ClientMessage::Offer { target_id, data } => {
            relay_payload(RelayKind::Offer, target_id, data, handle, session).await;
        }
        ClientMessage::Answer { target_id, data } => {
            relay_payload(RelayKind::Answer, target_id, data, handle, session).await;
        }
        ClientMessage::IceCandidate { target_id, data } => {
            relay_payload(RelayKind::IceCandidate, target_id, data, handle, session).await;
        }
    }
}

async fn handle_join(
    raw_room_id: &str,
    state: &Arc<AppState>,
    handle: &ConnectionHandle,
    session: &mut Option<Session>,
) {
    if session.is_some() {
        handle.send(ServerMessage::Error {
            message: "Already in a room".to_string(),
        });
        return;
    }

    let room_id = match RoomId::parse(raw_room_id) {
        Ok(id) => id,
        Err(e) => {
            handle.send(ServerMessage::Error {
                message: e.to_string(),
            });
            return;
        }
    };

    match state.controller.join_room(&room_id, handle.clone()).await {
        Ok((room, accepted)) => {
            // The room actor already queued `room-joined` on this channel.
            *session = Some((room, accepted.participant_id));
        }
        Err(e) => {
            handle.send(ServerMessage::Error {
                message: e.client_message(),
            });
        }
    }
}

async fn relay_payload(
    kind: RelayKind,
    target_id: Option<ParticipantId>,
    data: Value,
    handle: &ConnectionHandle,
    session: &Option<Session>,
) {
    match session {
        Some((room, participant_id)) => {
            room.relay(*participant_id, kind, target_id, data).await;
        }
        None => {
            handle.send(ServerMessage::Error {
                message: "Not in a room".to_string(),
            });
        }
    }
}
