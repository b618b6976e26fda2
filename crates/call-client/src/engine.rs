//! Seam to the native media engine.
//!
//! The coordination core never implements media transport: it configures the
//! engine with relay-assist servers, drives negotiation through the
//! [`PeerTransport`] trait, and is told about connection-state transitions
//! via [`CallSession::transport_state_changed`]. Descriptions and candidates
//! are opaque JSON payloads - the engine interprets them, this crate only
//! orders and routes them.
//!
//! [`CallSession::transport_state_changed`]: crate::session::CallSession::transport_state_changed

use crate::errors::LinkError;
use async_trait::async_trait;
use common::protocol::RelayServer;
use serde_json::Value;

/// Opaque handle to a local capture source.
///
/// Produced by the capture/device layer (an external collaborator); the core
/// only passes it through to transports. The inner token means whatever the
/// engine wants it to mean.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSource(String);

impl MediaSource {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.0
    }
}

/// Connection-state transition reported by the engine for one peer link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// The direct media path is established.
    Connected,
    /// Terminal failure; the link is torn down with no automatic retry.
    Failed,
}

/// One engine-side connection to a single remote peer.
///
/// Implementations wrap the platform's native peer-connection object.
/// `create_offer`/`create_answer` both build a description *and apply it
/// locally* before returning it for relay, matching how negotiation is
/// actually sequenced.
#[async_trait]
pub trait PeerTransport: Send {
    /// Build the initiating description and apply it locally.
    async fn create_offer(&mut self) -> Result<Value, LinkError>;

    /// Build the answering description and apply it locally.
    async fn create_answer(&mut self) -> Result<Value, LinkError>;

    /// Apply the remote side's description.
    async fn set_remote_description(&mut self, description: Value) -> Result<(), LinkError>;

    /// Apply one remote connectivity candidate.
    ///
    /// Callers guarantee the remote description has been applied first; the
    /// session queues early candidates so the engine never sees one out of
    /// order.
    async fn add_remote_candidate(&mut self, candidate: Value) -> Result<(), LinkError>;

    /// Swap the outbound media source on the live sender, in place, without
    /// a new negotiation round.
    async fn set_media_source(&mut self, source: &MediaSource) -> Result<(), LinkError>;

    /// Release the underlying connection.
    fn close(&mut self);
}

/// Factory for per-peer transports.
pub trait TransportFactory: Send {
    type Transport: PeerTransport;

    /// Create a transport configured with the session's relay-assist servers
    /// and, when local media is live, attached to the local source.
    fn create(
        &self,
        relay_config: &[RelayServer],
        media: Option<&MediaSource>,
    ) -> Result<Self::Transport, LinkError>;
}
