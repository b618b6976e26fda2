//! `SessionControllerActor` - singleton supervisor for room sessions.
//!
//! The controller is the explicit owner of all live-session state (no
//! ambient globals):
//!
//! - Validates joins against the room registry before any session state is
//!   touched
//! - Spawns room actors lazily on first join and reaps them once they empty
//! - Exposes the teardown hook the admin surface calls on room deletion
//! - Owns the root `CancellationToken` for graceful shutdown

use super::connection::ConnectionHandle;
use super::messages::{ControllerMessage, ControllerStatus, JoinAccepted};
use super::metrics::SessionMetrics;
use super::room::{RoomActor, RoomActorHandle};
use crate::errors::SignalError;
use crate::registry::RoomRegistry;
use common::protocol::RelayServer;
use common::types::RoomId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Default channel buffer size for the controller mailbox.
const CONTROLLER_CHANNEL_BUFFER: usize = 512;

/// Handle to the `SessionControllerActor`.
///
/// This is the public interface to the live-session layer: the WebSocket
/// boundary joins through it, the admin surface tears down through it.
#[derive(Clone)]
pub struct SessionControllerHandle {
    sender: mpsc::Sender<ControllerMessage>,
    cancel_token: CancellationToken,
}

impl SessionControllerHandle {
    /// Create the controller actor and return a handle to it.
    #[must_use]
    pub fn new(
        registry: RoomRegistry,
        relay_config: Vec<RelayServer>,
        metrics: Arc<SessionMetrics>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(CONTROLLER_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let actor = SessionControllerActor {
            registry,
            relay_config,
            receiver,
            cancel_token: cancel_token.clone(),
            rooms: HashMap::new(),
            metrics,
        };

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
        }
    }

    /// Join a participant into a room.
    ///
    /// Validates the room against the registry, then admits the connection
    /// into the room's actor. If the actor emptied and exited between
    /// resolution and admission, resolution is retried once against a fresh
    /// actor.
    pub async fn join_room(
        &self,
        room_id: &RoomId,
        connection: ConnectionHandle,
    ) -> Result<(RoomActorHandle, JoinAccepted), SignalError> {
        let mut last_err = None;
        for attempt in 0..3 {
            if attempt > 0 {
                // The previous actor was mid-exit; give its task a beat to
                // finish so resolution reaps it and spawns a fresh one.
                tokio::task::yield_now().await;
            }
            let room = self.resolve_room(room_id.clone()).await?;
            match room.join(connection.clone()).await {
                Ok(accepted) => return Ok((room, accepted)),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| SignalError::Internal("join failed".to_string())))
    }

    async fn resolve_room(&self, room_id: RoomId) -> Result<RoomActorHandle, SignalError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ControllerMessage::ResolveRoom {
                room_id,
                respond_to: tx,
            })
            .await
            .map_err(|_| SignalError::ShuttingDown)?;

        rx.await.map_err(|_| SignalError::ShuttingDown)?
    }

    /// Tear down the live session for a deleted room, if any.
    ///
    /// Resolves once every member has been notified and disconnected, so the
    /// admin delete response never races its own teardown.
    pub async fn teardown_room(&self, room_id: &RoomId) {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(ControllerMessage::TeardownRoom {
                room_id: room_id.clone(),
                respond_to: tx,
            })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }

    /// Get the current controller status.
    pub async fn status(&self) -> Result<ControllerStatus, SignalError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ControllerMessage::Status { respond_to: tx })
            .await
            .map_err(|_| SignalError::ShuttingDown)?;

        rx.await.map_err(|_| SignalError::ShuttingDown)
    }

    /// Initiate shutdown: every room closes its connections and exits.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the controller has been shut down.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Get a child token (connection tokens are parented here so process
    /// shutdown force-closes every socket).
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

/// Internal state for a managed room session.
struct ManagedRoom {
    handle: RoomActorHandle,
    task_handle: JoinHandle<()>,
}

/// The `SessionControllerActor` implementation.
struct SessionControllerActor {
    /// Durable room catalog, consulted before any session state is created.
    registry: RoomRegistry,
    /// Relay-assist servers handed to each room actor.
    relay_config: Vec<RelayServer>,
    /// Message receiver.
    receiver: mpsc::Receiver<ControllerMessage>,
    /// Root cancellation token.
    cancel_token: CancellationToken,
    /// Live room sessions by id.
    rooms: HashMap<RoomId, ManagedRoom>,
    /// Shared session counters.
    metrics: Arc<SessionMetrics>,
}

impl SessionControllerActor {
    /// Run the actor message loop.
    #[instrument(skip_all, name = "signal.actor.controller")]
    async fn run(mut self) {
        info!(target: "signal.actor.controller", "SessionController started");

        loop {
            // Reap room actors that exited because they emptied.
            self.reap_finished_rooms();

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "signal.actor.controller",
                        "SessionController received cancellation signal"
                    );
                    self.graceful_shutdown().await;
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => self.handle_message(message).await,
                        None => {
                            info!(
                                target: "signal.actor.controller",
                                "SessionController channel closed, exiting"
                            );
                            self.graceful_shutdown().await;
                            break;
                        }
                    }
                }
            }
        }

        info!(target: "signal.actor.controller", "SessionController stopped");
    }

    async fn handle_message(&mut self, message: ControllerMessage) {
        match message {
            ControllerMessage::ResolveRoom {
                room_id,
                respond_to,
            } => {
                let result = self.handle_resolve(room_id).await;
                let _ = respond_to.send(result);
            }

            ControllerMessage::TeardownRoom {
                room_id,
                respond_to,
            } => {
                self.handle_teardown(&room_id).await;
                let _ = respond_to.send(());
            }

            ControllerMessage::Status { respond_to } => {
                let _ = respond_to.send(ControllerStatus {
                    active_rooms: self.rooms.len(),
                });
            }
        }
    }

    /// Validate the room and return its actor handle, spawning one lazily.
    ///
    /// A registry miss leaves no session state behind.
    async fn handle_resolve(&mut self, room_id: RoomId) -> Result<RoomActorHandle, SignalError> {
        let room = self
            .registry
            .get_room(&room_id)
            .await?
            .ok_or_else(|| SignalError::RoomNotFound(room_id.to_string()))?;

        if let Some(managed) = self.rooms.get(&room_id) {
            if !managed.task_handle.is_finished() {
                return Ok(managed.handle.clone());
            }
            self.rooms.remove(&room_id);
        }

        let (handle, task_handle) = RoomActor::spawn(
            room.id.clone(),
            room.name,
            self.relay_config.clone(),
            self.cancel_token.child_token(),
            Arc::clone(&self.metrics),
        );

        debug!(
            target: "signal.actor.controller",
            room_id = %room_id,
            "Room session spawned"
        );

        self.rooms.insert(
            room_id,
            ManagedRoom {
                handle: handle.clone(),
                task_handle,
            },
        );
        self.sync_room_count();

        Ok(handle)
    }

    async fn handle_teardown(&mut self, room_id: &RoomId) {
        if let Some(managed) = self.rooms.remove(room_id) {
            managed.handle.teardown().await;
            self.sync_room_count();
            info!(
                target: "signal.actor.controller",
                room_id = %room_id,
                "Room session torn down"
            );
        }
    }

    fn reap_finished_rooms(&mut self) {
        let before = self.rooms.len();
        self.rooms.retain(|_, managed| !managed.task_handle.is_finished());
        if self.rooms.len() != before {
            self.sync_room_count();
        }
    }

    fn sync_room_count(&self) {
        self.metrics.set_rooms(u32::try_from(self.rooms.len()).unwrap_or(u32::MAX));
    }

    /// Shutdown: cancellation has already propagated to every room's child
    /// token; wait for their tasks to finish closing connections.
    async fn graceful_shutdown(&mut self) {
        for (_, managed) in self.rooms.drain() {
            let _ = managed.task_handle.await;
        }
        self.sync_room_count();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use common::protocol::ServerMessage;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn test_controller() -> (SessionControllerHandle, RoomRegistry) {
        let registry = RoomRegistry::in_memory().await.unwrap();
        let controller = SessionControllerHandle::new(
            registry.clone(),
            vec![RelayServer::stun("stun:stun.l.google.com:19302")],
            SessionMetrics::new(),
        );
        (controller, registry)
    }

    #[tokio::test]
    async fn join_unknown_room_creates_no_session() {
        let (controller, _registry) = test_controller().await;
        let (connection, _rx) = ConnectionHandle::new(CancellationToken::new());
        let id = RoomId::parse("aaaa-bbbb-cccc").unwrap();

        let result = controller.join_room(&id, connection).await;
        assert!(matches!(result, Err(SignalError::RoomNotFound(_))));

        let status = controller.status().await.unwrap();
        assert_eq!(status.active_rooms, 0);
    }

    #[tokio::test]
    async fn join_known_room_spawns_a_session() {
        let (controller, registry) = test_controller().await;
        let room = registry.create_room("Family").await.unwrap();

        let (connection, mut rx) = ConnectionHandle::new(CancellationToken::new());
        let (handle, accepted) = controller.join_room(&room.id, connection).await.unwrap();
        assert!(accepted.is_host);
        assert_eq!(handle.room_id(), &room.id);

        assert!(matches!(
            timeout(Duration::from_secs(1), rx.recv()).await.unwrap(),
            Some(ServerMessage::RoomJoined { .. })
        ));

        let status = controller.status().await.unwrap();
        assert_eq!(status.active_rooms, 1);
    }

    #[tokio::test]
    async fn sessions_share_one_actor_per_room() {
        let (controller, registry) = test_controller().await;
        let room = registry.create_room("Family").await.unwrap();

        let (conn_a, mut rx_a) = ConnectionHandle::new(CancellationToken::new());
        let (room_a, a) = controller.join_room(&room.id, conn_a).await.unwrap();
        let _ = rx_a.recv().await;

        let (conn_b, _rx_b) = ConnectionHandle::new(CancellationToken::new());
        let (_room_b, _b) = controller.join_room(&room.id, conn_b).await.unwrap();

        // a sees b arrive: both joins landed in the same room actor.
        assert!(matches!(
            timeout(Duration::from_secs(1), rx_a.recv()).await.unwrap(),
            Some(ServerMessage::ParticipantJoined { .. })
        ));

        room_a.leave(a.participant_id).await;
        let status = controller.status().await.unwrap();
        assert_eq!(status.active_rooms, 1);
    }

    #[tokio::test]
    async fn emptied_room_is_reaped_and_respawned_on_next_join() {
        let (controller, registry) = test_controller().await;
        let room = registry.create_room("Family").await.unwrap();

        let (conn, mut rx) = ConnectionHandle::new(CancellationToken::new());
        let (handle, accepted) = controller.join_room(&room.id, conn).await.unwrap();
        let _ = rx.recv().await;

        handle.leave(accepted.participant_id).await;

        // The emptied actor exits; a later join gets a fresh host session.
        let (conn2, mut rx2) = ConnectionHandle::new(CancellationToken::new());
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            match controller.join_room(&room.id, conn2.clone()).await {
                Ok((_, accepted2)) => {
                    assert!(accepted2.is_host);
                    break;
                }
                Err(_) if tokio::time::Instant::now() < deadline => {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                Err(e) => panic!("join after empty never succeeded: {e}"),
            }
        }
        assert!(matches!(
            timeout(Duration::from_secs(1), rx2.recv()).await.unwrap(),
            Some(ServerMessage::RoomJoined { is_host: true, .. })
        ));
    }

    #[tokio::test]
    async fn teardown_hook_disconnects_members() {
        let (controller, registry) = test_controller().await;
        let room = registry.create_room("Family").await.unwrap();

        let token = CancellationToken::new();
        let (conn, mut rx) = ConnectionHandle::new(token.clone());
        let _ = controller.join_room(&room.id, conn).await.unwrap();
        let _ = rx.recv().await;

        registry.delete_room(&room.id).await.unwrap();
        controller.teardown_room(&room.id).await;

        assert!(matches!(
            timeout(Duration::from_secs(1), rx.recv()).await.unwrap(),
            Some(ServerMessage::RoomDeleted)
        ));
        assert!(token.is_cancelled());

        // The deleted room cannot be joined again.
        let (conn2, _rx2) = ConnectionHandle::new(CancellationToken::new());
        let result = controller.join_room(&room.id, conn2).await;
        assert!(matches!(result, Err(SignalError::RoomNotFound(_))));
    }

    #[tokio::test]
    async fn shutdown_closes_all_room_connections() {
        let (controller, registry) = test_controller().await;
        let room = registry.create_room("Family").await.unwrap();

        let token = CancellationToken::new();
        let (conn, mut rx) = ConnectionHandle::new(token.clone());
        let _ = controller.join_room(&room.id, conn).await.unwrap();
        let _ = rx.recv().await;

        controller.shutdown();

        timeout(Duration::from_secs(2), token.cancelled())
            .await
            .expect("connection token should be cancelled by shutdown");
    }
}
