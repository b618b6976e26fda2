//! `CallSession` - maps server events to per-pair negotiation.
//!
//! One session per joined room. The session owns every [`PeerLink`] and
//! decides who initiates:
//!
//! - A fresh joiner initiates toward every entry of the roster it was handed
//!   in `room-joined`.
//! - A pre-existing member does nothing on `participant-joined` and waits
//!   for the newcomer's initiating description.
//!
//! That split keeps exactly one initiator per pair with no tie-break state.
//!
//! Negotiation failures are local: a link that errors is torn down and
//! removed, and every other pair keeps going. Pairs never block each other -
//! a pair waiting on its answer simply has no messages to process while
//! other pairs' messages flow through.

use crate::engine::{MediaSource, TransportFactory, TransportState};
use crate::errors::LinkError;
use crate::link::{LinkState, PeerLink};
use common::protocol::{ClientMessage, RelayServer, ServerMessage};
use common::types::ParticipantId;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Client-side session state for one joined room.
pub struct CallSession<F: TransportFactory> {
    factory: F,
    outbound: mpsc::UnboundedSender<ClientMessage>,
    relay_config: Vec<RelayServer>,
    local_media: Option<MediaSource>,
    local_id: Option<ParticipantId>,
    is_host: bool,
    host_id: Option<ParticipantId>,
    room_name: Option<String>,
    links: HashMap<ParticipantId, PeerLink<F::Transport>>,
}

impl<F: TransportFactory> CallSession<F> {
    /// Create a session.
    ///
    /// `outbound` feeds the signaling channel; `local_media` is the capture
    /// handle obtained from the device layer before joining.
    pub fn new(
        factory: F,
        local_media: Option<MediaSource>,
        outbound: mpsc::UnboundedSender<ClientMessage>,
    ) -> Self {
        Self {
            factory,
            outbound,
            relay_config: Vec::new(),
            local_media,
            local_id: None,
            is_host: false,
            host_id: None,
            room_name: None,
            links: HashMap::new(),
        }
    }

    /// Ask the server to join a room.
    pub fn request_join(&self, room_id: &str) {
        self.send(ClientMessage::JoinRoom {
            room_id: room_id.to_string(),
        });
    }

    /// Our participant id, once joined.
    #[must_use]
    pub fn local_id(&self) -> Option<ParticipantId> {
        self.local_id
    }

    /// Whether we currently hold the host role.
    #[must_use]
    pub fn is_host(&self) -> bool {
        self.is_host
    }

    /// The room's current host, as far as we have been told.
    #[must_use]
    pub fn host_id(&self) -> Option<ParticipantId> {
        self.host_id
    }

    /// Name of the joined room.
    #[must_use]
    pub fn room_name(&self) -> Option<&str> {
        self.room_name.as_deref()
    }

    /// Negotiation state of the link to `peer`, if one exists.
    #[must_use]
    pub fn link_state(&self, peer: ParticipantId) -> Option<LinkState> {
        self.links.get(&peer).map(PeerLink::state)
    }

    /// Ids of peers we currently hold links to.
    #[must_use]
    pub fn peers(&self) -> Vec<ParticipantId> {
        self.links.keys().copied().collect()
    }

    /// Process one envelope from the server.
    pub async fn handle_server_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::RoomJoined {
                participant_id,
                is_host,
                room_name,
                existing_participants,
                relay_config,
            } => {
                info!(
                    target: "call.session",
                    participant_id = %participant_id,
                    is_host,
                    peers = existing_participants.len(),
                    "Joined room"
                );
                self.local_id = Some(participant_id);
                self.is_host = is_host;
                self.host_id = is_host.then_some(participant_id);
                self.room_name = Some(room_name);
                self.relay_config = relay_config;

                // Fresh joiner initiates toward everyone already present.
                for peer in existing_participants {
                    self.initiate_link(peer).await;
                }
            }

            ServerMessage::ParticipantJoined { participant_id } => {
                // The newcomer initiates; we answer when the offer arrives.
                debug!(
                    target: "call.session",
                    participant_id = %participant_id,
                    "Participant joined, awaiting their offer"
                );
            }

            ServerMessage::ParticipantLeft { participant_id } => {
                self.close_link(participant_id);
            }

            ServerMessage::Offer { data, from_id } => {
                self.handle_offer(from_id, data).await;
            }

            ServerMessage::Answer { data, from_id } => {
                self.handle_answer(from_id, data).await;
            }

            ServerMessage::IceCandidate { data, from_id } => {
                self.handle_candidate(from_id, data).await;
            }

            ServerMessage::YouAreHost => {
                self.is_host = true;
                self.host_id = self.local_id;
                info!(target: "call.session", "Elected host");
            }

            ServerMessage::NewHost { host_id } => {
                self.host_id = Some(host_id);
            }

            ServerMessage::RoomDeleted => {
                info!(target: "call.session", "Room deleted, ending session");
                self.close_all_links();
            }

            ServerMessage::Error { message } => {
                warn!(target: "call.session", message = %message, "Server error");
            }
        }
    }

    /// Forward a locally gathered connectivity candidate to one peer.
    ///
    /// Wired to the engine's candidate callback by the embedding layer.
    pub fn local_candidate(&self, peer: ParticipantId, candidate: Value) {
        self.send(ClientMessage::IceCandidate {
            target_id: Some(peer),
            data: candidate,
        });
    }

    /// React to a connection-state transition reported by the engine.
    ///
    /// A terminal failure tears the pair down with no retry; recovery takes
    /// a fresh join or a fresh initiating description from the other side.
    pub fn transport_state_changed(&mut self, peer: ParticipantId, state: TransportState) {
        match state {
            TransportState::Connected => {
                if let Some(link) = self.links.get_mut(&peer) {
                    link.mark_connected();
                    info!(target: "call.session", peer_id = %peer, "Peer connected");
                }
            }
            TransportState::Failed => {
                warn!(target: "call.session", peer_id = %peer, "Peer connection failed");
                self.close_link(peer);
            }
        }
    }

    /// Switch the outbound capture source in place on every connected pair.
    ///
    /// No new negotiation round; links that are still negotiating pick the
    /// new source up from the engine when they attach.
    pub async fn switch_media_source(&mut self, source: MediaSource) {
        self.local_media = Some(source.clone());

        let mut failed = Vec::new();
        for (peer, link) in &mut self.links {
            if link.state() != LinkState::Connected {
                continue;
            }
            if let Err(e) = link.set_media_source(&source).await {
                warn!(
                    target: "call.session",
                    peer_id = %peer,
                    error = %e,
                    "Media switch failed, tearing link down"
                );
                failed.push(*peer);
            }
        }
        for peer in failed {
            self.close_link(peer);
        }
    }

    /// Stop local media: every outstanding link closes immediately.
    pub fn stop_local_media(&mut self) {
        self.local_media = None;
        self.close_all_links();
    }

    /// Leave the room: tell the server, then close every link.
    pub fn leave(&mut self) {
        self.send(ClientMessage::LeaveRoom);
        self.close_all_links();
        self.local_id = None;
        self.is_host = false;
        self.host_id = None;
        self.room_name = None;
    }

    async fn initiate_link(&mut self, peer: ParticipantId) {
        if self.links.contains_key(&peer) {
            debug!(target: "call.session", peer_id = %peer, "Link already exists");
            return;
        }
        let Some(mut link) = self.create_link(peer) else {
            return;
        };

        match link.initiate().await {
            Ok(offer) => {
                self.send(ClientMessage::Offer {
                    target_id: Some(peer),
                    data: offer,
                });
                self.links.insert(peer, link);
            }
            Err(e) => {
                warn!(target: "call.session", peer_id = %peer, error = %e, "Failed to initiate");
            }
        }
    }

    async fn handle_offer(&mut self, from: ParticipantId, data: Value) {
        if self.local_id.is_none() {
            warn!(target: "call.session", "Offer before join completed, dropped");
            return;
        }

        if !self.links.contains_key(&from) {
            let Some(link) = self.create_link(from) else {
                return;
            };
            self.links.insert(from, link);
        }
        let Some(link) = self.links.get_mut(&from) else {
            return;
        };

        match link.accept_offer(data).await {
            Ok(answer) => {
                self.send(ClientMessage::Answer {
                    target_id: Some(from),
                    data: answer,
                });
            }
            Err(e) => {
                warn!(target: "call.session", peer_id = %from, error = %e, "Offer handling failed");
                self.close_link(from);
            }
        }
    }

    async fn handle_answer(&mut self, from: ParticipantId, data: Value) {
        let Some(link) = self.links.get_mut(&from) else {
            debug!(target: "call.session", peer_id = %from, "Answer for unknown link, dropped");
            return;
        };
        if let Err(e) = link.accept_answer(data).await {
            warn!(target: "call.session", peer_id = %from, error = %e, "Answer handling failed");
            self.close_link(from);
        }
    }

    async fn handle_candidate(&mut self, from: ParticipantId, data: Value) {
        // Candidates can outrun the description exchange; a link created
        // here just buffers until the offer arrives.
        if !self.links.contains_key(&from) {
            let Some(link) = self.create_link(from) else {
                return;
            };
            self.links.insert(from, link);
        }
        let Some(link) = self.links.get_mut(&from) else {
            return;
        };

        if let Err(e) = link.add_candidate(data).await {
            warn!(target: "call.session", peer_id = %from, error = %e, "Candidate failed");
            self.close_link(from);
        }
    }

    fn create_link(&self, peer: ParticipantId) -> Option<PeerLink<F::Transport>> {
        match self
            .factory
            .create(&self.relay_config, self.local_media.as_ref())
        {
            Ok(transport) => Some(PeerLink::new(peer, transport)),
            Err(e) => {
                warn!(target: "call.session", peer_id = %peer, error = %e, "Transport creation failed");
                None
            }
        }
    }

    fn close_link(&mut self, peer: ParticipantId) {
        if let Some(mut link) = self.links.remove(&peer) {
            link.close();
            debug!(target: "call.session", peer_id = %peer, "Link closed");
        }
    }

    fn close_all_links(&mut self) {
        for (_, mut link) in self.links.drain() {
            link.close();
        }
    }

    fn send(&self, message: ClientMessage) {
        if self.outbound.send(message).is_err() {
            debug!(target: "call.session", "Signaling channel gone, message dropped");
        }
    }
}
