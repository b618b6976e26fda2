//! `PeerLink` - the negotiation state machine for one remote participant.
//!
//! States: `New -> Offering | Answering -> Connected`, with terminal `Closed`
//! reachable from anywhere. The link also owns the pending-candidate queue:
//! connectivity candidates legitimately arrive before the description
//! exchange completes (independent network timing), so early arrivals are
//! buffered and replayed in order, exactly once, as soon as the remote
//! description is applied.

use crate::engine::PeerTransport;
use crate::errors::LinkError;
use common::types::ParticipantId;
use serde_json::Value;
use std::collections::VecDeque;
use tracing::debug;

/// Negotiation state of one peer link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Created, no description exchanged yet.
    New,
    /// We sent the initiating description and await the answer.
    Offering,
    /// We answered the remote side's initiating description.
    Answering,
    /// The engine reported an established media path.
    Connected,
    /// Terminal: the link has been torn down.
    Closed,
}

/// Per-remote-participant negotiation driver.
pub struct PeerLink<T: PeerTransport> {
    peer_id: ParticipantId,
    transport: T,
    state: LinkState,
    remote_description_set: bool,
    pending_candidates: VecDeque<Value>,
}

impl<T: PeerTransport> PeerLink<T> {
    pub fn new(peer_id: ParticipantId, transport: T) -> Self {
        Self {
            peer_id,
            transport,
            state: LinkState::New,
            remote_description_set: false,
            pending_candidates: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn peer_id(&self) -> ParticipantId {
        self.peer_id
    }

    #[must_use]
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Initiator path: build the local description (applied locally by the
    /// engine) and return it for relay to the peer.
    pub async fn initiate(&mut self) -> Result<Value, LinkError> {
        if self.state == LinkState::Closed {
            return Err(LinkError::Closed);
        }
        let offer = self.transport.create_offer().await?;
        self.state = LinkState::Offering;
        Ok(offer)
    }

    /// Responder path: apply the remote initiating description, drain the
    /// pending-candidate queue, and return the answering description for
    /// relay.
    pub async fn accept_offer(&mut self, offer: Value) -> Result<Value, LinkError> {
        self.apply_remote_description(offer).await?;
        let answer = self.transport.create_answer().await?;
        self.state = LinkState::Answering;
        Ok(answer)
    }

    /// Initiator completion: apply the remote answering description and
    /// drain the pending-candidate queue.
    pub async fn accept_answer(&mut self, answer: Value) -> Result<(), LinkError> {
        self.apply_remote_description(answer).await
    }

    async fn apply_remote_description(&mut self, description: Value) -> Result<(), LinkError> {
        if self.state == LinkState::Closed {
            return Err(LinkError::Closed);
        }
        self.transport.set_remote_description(description).await?;
        self.remote_description_set = true;

        // Replay in arrival order. Popping before applying keeps the
        // at-most-once guarantee even if the engine rejects one mid-drain.
        while let Some(candidate) = self.pending_candidates.pop_front() {
            self.transport.add_remote_candidate(candidate).await?;
        }
        Ok(())
    }

    /// Route one remote connectivity candidate: applied immediately once the
    /// remote description is set, queued until then.
    pub async fn add_candidate(&mut self, candidate: Value) -> Result<(), LinkError> {
        if self.state == LinkState::Closed {
            // Stale candidate for a dead link; harmless.
            debug!(target: "call.link", peer_id = %self.peer_id, "Dropping candidate for closed link");
            return Ok(());
        }
        if self.remote_description_set {
            self.transport.add_remote_candidate(candidate).await
        } else {
            self.pending_candidates.push_back(candidate);
            Ok(())
        }
    }

    /// Engine reported an established media path.
    pub fn mark_connected(&mut self) {
        if self.state != LinkState::Closed {
            self.state = LinkState::Connected;
        }
    }

    /// Swap the outbound media source on the live sender.
    pub async fn set_media_source(
        &mut self,
        source: &crate::engine::MediaSource,
    ) -> Result<(), LinkError> {
        if self.state == LinkState::Closed {
            return Err(LinkError::Closed);
        }
        self.transport.set_media_source(source).await
    }

    /// Tear the link down. Idempotent.
    pub fn close(&mut self) {
        if self.state == LinkState::Closed {
            return;
        }
        self.transport.close();
        self.pending_candidates.clear();
        self.state = LinkState::Closed;
    }
}

impl<T: PeerTransport> Drop for PeerLink<T> {
    fn drop(&mut self) {
        self.close();
    }
}
