//! `RoomActor` - per-room actor that owns the membership record.
//!
//! Each `RoomActor`:
//! - Owns all live state for one room (participants, host assignment)
//! - Serializes every mutation through its mailbox, so joins and leaves for
//!   one room are observed in a single consistent order by every member
//! - Relays negotiation payloads between members (fire-and-forget)
//! - Elects a replacement host inside the same turn that removes the old one
//!
//! The actor exists only while the room has members: it is spawned lazily on
//! first join and exits once the last participant leaves. The persisted Room
//! row is unaffected by this cycle.

use super::connection::ConnectionHandle;
use super::messages::{JoinAccepted, RelayKind, RoomMessage, RoomRoster};
use super::metrics::SessionMetrics;
use crate::errors::SignalError;
use common::protocol::{RelayServer, ServerMessage};
use common::types::{ParticipantId, RoomId};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the room mailbox.
const ROOM_CHANNEL_BUFFER: usize = 256;

/// Handle to a `RoomActor`.
#[derive(Debug, Clone)]
pub struct RoomActorHandle {
    sender: mpsc::Sender<RoomMessage>,
    cancel_token: CancellationToken,
    room_id: RoomId,
}

impl RoomActorHandle {
    /// Get the room ID.
    #[must_use]
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Admit a participant to the room.
    ///
    /// The actor pushes the `room-joined` envelope down the connection and
    /// broadcasts `participant-joined` to everyone else before replying, so
    /// the joiner's channel sees `room-joined` ahead of any relayed traffic.
    pub async fn join(&self, connection: ConnectionHandle) -> Result<JoinAccepted, SignalError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RoomMessage::Join {
                connection,
                respond_to: tx,
            })
            .await
            .map_err(|_| SignalError::Internal("room session closed".to_string()))?;

        rx.await
            .map_err(|_| SignalError::Internal("room session closed".to_string()))
    }

    /// Remove a participant (explicit leave and channel failure share this).
    ///
    /// Fire-and-forget: a leave racing the room's own shutdown is harmless.
    pub async fn leave(&self, participant_id: ParticipantId) {
        let _ = self
            .sender
            .send(RoomMessage::Leave { participant_id })
            .await;
    }

    /// Relay a negotiation payload to one member, or to all other members
    /// when no target is given.
    pub async fn relay(
        &self,
        from: ParticipantId,
        kind: RelayKind,
        target: Option<ParticipantId>,
        data: Value,
    ) {
        let _ = self
            .sender
            .send(RoomMessage::Relay {
                from,
                kind,
                target,
                data,
            })
            .await;
    }

    /// Notify every member the room was deleted and disconnect them.
    ///
    /// Resolves once the actor has processed the teardown.
    pub async fn teardown(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(RoomMessage::Teardown { respond_to: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    /// Read the current roster.
    pub async fn roster(&self) -> Result<RoomRoster, SignalError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RoomMessage::Roster { respond_to: tx })
            .await
            .map_err(|_| SignalError::Internal("room session closed".to_string()))?;

        rx.await
            .map_err(|_| SignalError::Internal("room session closed".to_string()))
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// One connected participant.
#[derive(Debug)]
struct Participant {
    id: ParticipantId,
    connection: ConnectionHandle,
    is_host: bool,
}

/// The `RoomActor` implementation.
pub struct RoomActor {
    /// Room ID.
    room_id: RoomId,
    /// Persisted room name, echoed in `room-joined`.
    room_name: String,
    /// Relay-assist servers handed to joiners.
    relay_config: Vec<RelayServer>,
    /// Message receiver.
    receiver: mpsc::Receiver<RoomMessage>,
    /// Cancellation token (child of the controller's token).
    cancel_token: CancellationToken,
    /// Membership record, in insertion order. Order matters: host election
    /// picks the earliest-joined survivor.
    participants: Vec<Participant>,
    /// Current host. Invariant: either `None` or present in `participants`.
    host_id: Option<ParticipantId>,
    /// Shared session counters.
    metrics: Arc<SessionMetrics>,
}

impl RoomActor {
    /// Spawn a new room actor.
    ///
    /// Returns a handle and the task join handle (the controller watches the
    /// latter to reap emptied rooms).
    pub fn spawn(
        room_id: RoomId,
        room_name: String,
        relay_config: Vec<RelayServer>,
        cancel_token: CancellationToken,
        metrics: Arc<SessionMetrics>,
    ) -> (RoomActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(ROOM_CHANNEL_BUFFER);

        let actor = Self {
            room_id: room_id.clone(),
            room_name,
            relay_config,
            receiver,
            cancel_token: cancel_token.clone(),
            participants: Vec::new(),
            host_id: None,
            metrics,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = RoomActorHandle {
            sender,
            cancel_token,
            room_id,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "signal.actor.room", fields(room_id = %self.room_id))]
    async fn run(mut self) {
        debug!(target: "signal.actor.room", room_id = %self.room_id, "RoomActor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "signal.actor.room",
                        room_id = %self.room_id,
                        "RoomActor received cancellation signal"
                    );
                    self.disconnect_all();
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            if self.handle_message(message) {
                                break;
                            }
                        }
                        None => {
                            debug!(
                                target: "signal.actor.room",
                                room_id = %self.room_id,
                                "RoomActor channel closed, exiting"
                            );
                            self.disconnect_all();
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "signal.actor.room",
            room_id = %self.room_id,
            "Room session ended"
        );
    }

    /// Handle a single message. Returns true if the actor should exit.
    fn handle_message(&mut self, message: RoomMessage) -> bool {
        match message {
            RoomMessage::Join {
                connection,
                respond_to,
            } => {
                self.handle_join(connection, respond_to);
                false
            }

            RoomMessage::Leave { participant_id } => {
                self.handle_leave(participant_id);
                // Last departure drops the membership record; the Room row
                // in the registry persists.
                self.participants.is_empty()
            }

            RoomMessage::Relay {
                from,
                kind,
                target,
                data,
            } => {
                self.handle_relay(from, kind, target, data);
                false
            }

            RoomMessage::Teardown { respond_to } => {
                self.handle_teardown();
                let _ = respond_to.send(());
                true
            }

            RoomMessage::Roster { respond_to } => {
                let _ = respond_to.send(RoomRoster {
                    participants: self.participants.iter().map(|p| p.id).collect(),
                    host_id: self.host_id,
                });
                false
            }
        }
    }

    /// Admit a participant: allocate an id, assign host on first arrival,
    /// reply with the roster, announce the arrival to everyone else.
    fn handle_join(
        &mut self,
        connection: ConnectionHandle,
        respond_to: oneshot::Sender<JoinAccepted>,
    ) {
        let participant_id = ParticipantId::new();
        let is_host = self.participants.is_empty();
        let existing: Vec<ParticipantId> = self.participants.iter().map(|p| p.id).collect();

        if is_host {
            self.host_id = Some(participant_id);
        }

        connection.send(ServerMessage::RoomJoined {
            participant_id,
            is_host,
            room_name: self.room_name.clone(),
            existing_participants: existing,
            relay_config: self.relay_config.clone(),
        });

        self.participants.push(Participant {
            id: participant_id,
            connection,
            is_host,
        });
        self.metrics.increment_participants();

        self.broadcast_except(
            participant_id,
            &ServerMessage::ParticipantJoined { participant_id },
        );

        info!(
            target: "signal.actor.room",
            room_id = %self.room_id,
            participant_id = %participant_id,
            is_host,
            total_participants = self.participants.len(),
            "Participant joined"
        );

        let _ = respond_to.send(JoinAccepted {
            participant_id,
            is_host,
        });
    }

    /// Remove a participant and, when the host departed, elect a successor
    /// before this turn ends.
    fn handle_leave(&mut self, participant_id: ParticipantId) {
        let Some(index) = self
            .participants
            .iter()
            .position(|p| p.id == participant_id)
        else {
            debug!(
                target: "signal.actor.room",
                room_id = %self.room_id,
                participant_id = %participant_id,
                "Leave for unknown participant, ignored"
            );
            return;
        };

        let departed = self.participants.remove(index);
        self.metrics.decrement_participants();

        self.broadcast_except(
            participant_id,
            &ServerMessage::ParticipantLeft { participant_id },
        );

        if self.host_id == Some(departed.id) {
            self.elect_host();
        }

        info!(
            target: "signal.actor.room",
            room_id = %self.room_id,
            participant_id = %participant_id,
            remaining_participants = self.participants.len(),
            "Participant left"
        );
    }

    /// Host failover: the earliest-joined survivor becomes host.
    ///
    /// Runs inside the departure turn, so no message processed after the
    /// departure can observe a stale host id.
    fn elect_host(&mut self) {
        match self.participants.first_mut() {
            Some(successor) => {
                successor.is_host = true;
                let host_id = successor.id;
                self.host_id = Some(host_id);

                successor.connection.send(ServerMessage::YouAreHost);
                for other in self.participants.iter().skip(1) {
                    other.connection.send(ServerMessage::NewHost { host_id });
                }

                info!(
                    target: "signal.actor.room",
                    room_id = %self.room_id,
                    host_id = %host_id,
                    "New host elected"
                );
            }
            None => {
                // Empty record: host is reassigned lazily on the next join.
                self.host_id = None;
            }
        }
    }

    /// Forward a negotiation payload.
    ///
    /// A targeted relay to an absent or closed participant is dropped
    /// silently: stale signaling is expected and harmless.
    fn handle_relay(
        &mut self,
        from: ParticipantId,
        kind: RelayKind,
        target: Option<ParticipantId>,
        data: Value,
    ) {
        if !self.participants.iter().any(|p| p.id == from) {
            warn!(
                target: "signal.actor.room",
                room_id = %self.room_id,
                from = %from,
                "Relay from non-member dropped"
            );
            return;
        }

        let message = match kind {
            RelayKind::Offer => ServerMessage::Offer { data, from_id: from },
            RelayKind::Answer => ServerMessage::Answer { data, from_id: from },
            RelayKind::IceCandidate => ServerMessage::IceCandidate { data, from_id: from },
        };

        match target {
            Some(target_id) => match self.participants.iter().find(|p| p.id == target_id) {
                Some(member) if member.connection.is_open() => member.connection.send(message),
                _ => {
                    debug!(
                        target: "signal.actor.room",
                        room_id = %self.room_id,
                        target_id = %target_id,
                        "Relay target absent or closed, dropped"
                    );
                }
            },
            // Compatibility fallback for clients that broadcast.
            None => self.broadcast_except(from, &message),
        }
    }

    /// Administrative deletion: tell everyone, then force-close every
    /// channel. Join attempts racing this land on the registry lookup, which
    /// already misses.
    fn handle_teardown(&mut self) {
        info!(
            target: "signal.actor.room",
            room_id = %self.room_id,
            participants = self.participants.len(),
            "Tearing down room session"
        );

        for participant in &self.participants {
            participant.connection.send(ServerMessage::RoomDeleted);
            participant.connection.close();
            self.metrics.decrement_participants();
        }
        self.participants.clear();
        self.host_id = None;
    }

    /// Process-shutdown path: close channels without a `room-deleted` notice.
    fn disconnect_all(&mut self) {
        for participant in &self.participants {
            participant.connection.close();
            self.metrics.decrement_participants();
        }
        self.participants.clear();
        self.host_id = None;
    }

    fn broadcast_except(&self, excluded: ParticipantId, message: &ServerMessage) {
        for participant in self.participants.iter().filter(|p| p.id != excluded) {
            participant.connection.send(message.clone());
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout;

    fn test_room() -> (RoomActorHandle, JoinHandle<()>) {
        RoomActor::spawn(
            RoomId::parse("abcd-1234-wxyz").unwrap(),
            "Family".to_string(),
            vec![common::protocol::RelayServer::stun(
                "stun:stun.l.google.com:19302",
            )],
            CancellationToken::new(),
            SessionMetrics::new(),
        )
    }

    async fn recv(rx: &mut UnboundedReceiver<ServerMessage>) -> ServerMessage {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for message")
            .expect("channel closed")
    }

    struct Member {
        id: ParticipantId,
        rx: UnboundedReceiver<ServerMessage>,
        token: CancellationToken,
    }

    async fn join(room: &RoomActorHandle) -> Member {
        let token = CancellationToken::new();
        let (connection, mut rx) = ConnectionHandle::new(token.clone());
        let accepted = room.join(connection).await.unwrap();

        // First envelope on a fresh channel is always room-joined.
        match recv(&mut rx).await {
            ServerMessage::RoomJoined {
                participant_id, ..
            } => assert_eq!(participant_id, accepted.participant_id),
            other => panic!("expected room-joined, got {other:?}"),
        }

        Member {
            id: accepted.participant_id,
            rx,
            token,
        }
    }

    #[tokio::test]
    async fn first_joiner_becomes_host() {
        let (room, _task) = test_room();
        let token = CancellationToken::new();
        let (connection, mut rx) = ConnectionHandle::new(token);

        let accepted = room.join(connection).await.unwrap();
        assert!(accepted.is_host);

        match recv(&mut rx).await {
            ServerMessage::RoomJoined {
                is_host,
                room_name,
                existing_participants,
                relay_config,
                ..
            } => {
                assert!(is_host);
                assert_eq!(room_name, "Family");
                assert!(existing_participants.is_empty());
                assert_eq!(relay_config.len(), 1);
            }
            other => panic!("expected room-joined, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn second_joiner_sees_roster_and_first_is_notified() {
        let (room, _task) = test_room();
        let mut a = join(&room).await;

        let token = CancellationToken::new();
        let (connection, mut rx) = ConnectionHandle::new(token);
        let accepted = room.join(connection).await.unwrap();
        assert!(!accepted.is_host);

        match recv(&mut rx).await {
            ServerMessage::RoomJoined {
                is_host,
                existing_participants,
                ..
            } => {
                assert!(!is_host);
                assert_eq!(existing_participants, vec![a.id]);
            }
            other => panic!("expected room-joined, got {other:?}"),
        }

        match recv(&mut a.rx).await {
            ServerMessage::ParticipantJoined { participant_id } => {
                assert_eq!(participant_id, accepted.participant_id);
            }
            other => panic!("expected participant-joined, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn targeted_relay_reaches_only_the_target() {
        let (room, _task) = test_room();
        let mut a = join(&room).await;
        let mut b = join(&room).await;
        let mut c = join(&room).await;

        // Drain the join notifications a and b saw for later joiners.
        let _ = recv(&mut a.rx).await;
        let _ = recv(&mut a.rx).await;
        let _ = recv(&mut b.rx).await;

        let payload = serde_json::json!({"sdp": "v=0"});
        room.relay(a.id, RelayKind::Offer, Some(b.id), payload.clone())
            .await;

        match recv(&mut b.rx).await {
            ServerMessage::Offer { data, from_id } => {
                assert_eq!(data, payload);
                assert_eq!(from_id, a.id);
            }
            other => panic!("expected offer, got {other:?}"),
        }

        // c must see nothing.
        assert!(
            timeout(Duration::from_millis(50), c.rx.recv()).await.is_err(),
            "untargeted member received a targeted relay"
        );
    }

    #[tokio::test]
    async fn untargeted_relay_broadcasts_to_all_others() {
        let (room, _task) = test_room();
        let mut a = join(&room).await;
        let mut b = join(&room).await;
        let mut c = join(&room).await;

        let _ = recv(&mut a.rx).await;
        let _ = recv(&mut a.rx).await;
        let _ = recv(&mut b.rx).await;

        room.relay(
            a.id,
            RelayKind::IceCandidate,
            None,
            serde_json::json!({"candidate": "x"}),
        )
        .await;

        assert!(matches!(
            recv(&mut b.rx).await,
            ServerMessage::IceCandidate { from_id, .. } if from_id == a.id
        ));
        assert!(matches!(
            recv(&mut c.rx).await,
            ServerMessage::IceCandidate { from_id, .. } if from_id == a.id
        ));
        assert!(timeout(Duration::from_millis(50), a.rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn relay_to_departed_target_is_dropped_silently() {
        let (room, _task) = test_room();
        let mut a = join(&room).await;
        let b = join(&room).await;
        let _ = recv(&mut a.rx).await; // participant-joined {b}

        let departed = b.id;
        room.leave(departed).await;
        let _ = recv(&mut a.rx).await; // participant-left {b}

        room.relay(
            a.id,
            RelayKind::Offer,
            Some(departed),
            serde_json::json!({}),
        )
        .await;

        // Nothing comes back to a; the room stays functional.
        assert!(timeout(Duration::from_millis(50), a.rx.recv()).await.is_err());
        let roster = room.roster().await.unwrap();
        assert_eq!(roster.participants, vec![a.id]);
    }

    #[tokio::test]
    async fn host_departure_elects_earliest_survivor() {
        let (room, _task) = test_room();
        let mut a = join(&room).await;
        let mut b = join(&room).await;
        let mut c = join(&room).await;

        let _ = recv(&mut a.rx).await;
        let _ = recv(&mut a.rx).await;
        let _ = recv(&mut b.rx).await;

        room.leave(a.id).await;

        // Both survivors see the departure.
        assert!(matches!(
            recv(&mut b.rx).await,
            ServerMessage::ParticipantLeft { participant_id } if participant_id == a.id
        ));
        assert!(matches!(
            recv(&mut c.rx).await,
            ServerMessage::ParticipantLeft { participant_id } if participant_id == a.id
        ));

        // b joined before c: exactly one you-are-host to b, one new-host to c.
        assert!(matches!(recv(&mut b.rx).await, ServerMessage::YouAreHost));
        assert!(matches!(
            recv(&mut c.rx).await,
            ServerMessage::NewHost { host_id } if host_id == b.id
        ));
        assert!(timeout(Duration::from_millis(50), b.rx.recv()).await.is_err());
        assert!(timeout(Duration::from_millis(50), c.rx.recv()).await.is_err());

        let roster = room.roster().await.unwrap();
        assert_eq!(roster.host_id, Some(b.id));
    }

    #[tokio::test]
    async fn non_host_departure_keeps_the_host() {
        let (room, _task) = test_room();
        let mut a = join(&room).await;
        let b = join(&room).await;
        let _ = recv(&mut a.rx).await;

        room.leave(b.id).await;
        let _ = recv(&mut a.rx).await; // participant-left

        let roster = room.roster().await.unwrap();
        assert_eq!(roster.host_id, Some(a.id));
        assert!(timeout(Duration::from_millis(50), a.rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn host_id_always_names_a_present_participant() {
        let (room, _task) = test_room();
        let a = join(&room).await;
        let b = join(&room).await;
        let c = join(&room).await;

        for departing in [a.id, b.id] {
            room.leave(departing).await;
            let roster = room.roster().await.unwrap();
            match roster.host_id {
                Some(host) => assert!(roster.participants.contains(&host)),
                None => assert!(roster.participants.is_empty()),
            }
        }

        let roster = room.roster().await.unwrap();
        assert_eq!(roster.host_id, Some(c.id));
    }

    #[tokio::test]
    async fn actor_exits_when_last_participant_leaves() {
        let (room, task) = test_room();
        let a = join(&room).await;

        room.leave(a.id).await;

        timeout(Duration::from_secs(1), task)
            .await
            .expect("room actor should exit when emptied")
            .unwrap();
    }

    #[tokio::test]
    async fn teardown_notifies_and_disconnects_everyone() {
        let (room, task) = test_room();
        let mut a = join(&room).await;
        let mut b = join(&room).await;
        let _ = recv(&mut a.rx).await;

        room.teardown().await;

        assert!(matches!(recv(&mut a.rx).await, ServerMessage::RoomDeleted));
        assert!(matches!(recv(&mut b.rx).await, ServerMessage::RoomDeleted));
        assert!(a.token.is_cancelled());
        assert!(b.token.is_cancelled());

        timeout(Duration::from_secs(1), task)
            .await
            .expect("room actor should exit after teardown")
            .unwrap();
    }

    #[tokio::test]
    async fn metrics_follow_membership() {
        let metrics = SessionMetrics::new();
        let (room, _task) = RoomActor::spawn(
            RoomId::parse("abcd-1234-wxyz").unwrap(),
            "Family".to_string(),
            vec![],
            CancellationToken::new(),
            Arc::clone(&metrics),
        );

        let a = join(&room).await;
        let _b = join(&room).await;
        assert_eq!(metrics.snapshot().participants, 2);

        room.leave(a.id).await;
        let _ = room.roster().await.unwrap();
        assert_eq!(metrics.snapshot().participants, 1);
    }
}
