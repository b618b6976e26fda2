//! `ConnectionHandle` - the room actor's grip on one participant's channel.
//!
//! The WebSocket task owns the socket itself; the handle carries the outbound
//! queue feeding that task plus a cancellation token that force-closes the
//! socket. Sends are fire-and-forget: a message to a closed channel is
//! dropped silently. Stale signaling is expected and harmless.

use common::protocol::ServerMessage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Handle to one participant's duplex channel.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    connection_id: Uuid,
    sender: mpsc::UnboundedSender<ServerMessage>,
    cancel_token: CancellationToken,
}

impl ConnectionHandle {
    /// Create a handle and the receiving end its socket task drains.
    #[must_use]
    pub fn new(
        cancel_token: CancellationToken,
    ) -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handle = Self {
            connection_id: Uuid::new_v4(),
            sender,
            cancel_token,
        };
        (handle, receiver)
    }

    /// Get the connection ID (for logging only).
    #[must_use]
    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// Queue a message for delivery.
    ///
    /// Fire-and-forget: if the socket task is gone the message is dropped.
    pub fn send(&self, message: ServerMessage) {
        if self.cancel_token.is_cancelled() {
            return;
        }
        if self.sender.send(message).is_err() {
            debug!(
                target: "signal.actor.connection",
                connection_id = %self.connection_id,
                "Dropped message for closed connection"
            );
        }
    }

    /// Whether the channel can still accept messages.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed() && !self.cancel_token.is_cancelled()
    }

    /// Force-close the underlying socket.
    ///
    /// The socket task observes the token, shuts the socket, and runs the
    /// standard disconnect path.
    pub fn close(&self) {
        self.cancel_token.cancel();
    }
}
