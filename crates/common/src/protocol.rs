//! JSON wire protocol for the signaling channel.
//!
//! Envelopes are tagged by `type` with kebab-case tags and camelCase fields,
//! one closed enum per direction so the socket boundary can match
//! exhaustively instead of dispatching on string keys.
//!
//! Negotiation payloads (`data`) are opaque [`serde_json::Value`]s: the
//! coordination layer forwards them between peers and never interprets them.

use crate::types::ParticipantId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One relay-assist (STUN/TURN) server entry handed to clients at join time.
///
/// Entries are ordered; clients try them in the order given. Credentials are
/// present only for TURN entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl RelayServer {
    /// A credential-less entry (STUN).
    #[must_use]
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

/// Messages a client sends to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Request to join an existing room. The id is validated server-side.
    JoinRoom { room_id: String },
    /// Leave the current room; the channel itself stays open.
    LeaveRoom,
    /// Negotiation description offered to one peer.
    Offer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_id: Option<ParticipantId>,
        data: Value,
    },
    /// Negotiation description answering a peer's offer.
    Answer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_id: Option<ParticipantId>,
        data: Value,
    },
    /// Connectivity candidate for one peer.
    IceCandidate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_id: Option<ParticipantId>,
        data: Value,
    },
}

/// Messages the server sends to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Join accepted; carries everything needed to start pairwise negotiation.
    RoomJoined {
        participant_id: ParticipantId,
        is_host: bool,
        room_name: String,
        existing_participants: Vec<ParticipantId>,
        relay_config: Vec<RelayServer>,
    },
    /// Another participant entered the room.
    ParticipantJoined { participant_id: ParticipantId },
    /// A participant left or was disconnected.
    ParticipantLeft { participant_id: ParticipantId },
    /// Relayed negotiation description from `from_id`.
    Offer { data: Value, from_id: ParticipantId },
    /// Relayed answering description from `from_id`.
    Answer { data: Value, from_id: ParticipantId },
    /// Relayed connectivity candidate from `from_id`.
    IceCandidate { data: Value, from_id: ParticipantId },
    /// The receiving participant has been elected host.
    YouAreHost,
    /// A different participant has been elected host.
    NewHost { host_id: ParticipantId },
    /// The room was administratively deleted; the session is over.
    RoomDeleted,
    /// Request-level failure, delivered only to the originating channel.
    Error { message: String },
}
