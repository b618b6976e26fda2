//! Message types exchanged between the actor layers.

use super::connection::ConnectionHandle;
use crate::errors::SignalError;
use common::types::{ParticipantId, RoomId};
use serde_json::Value;
use tokio::sync::oneshot;

/// What kind of negotiation payload a relay request carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayKind {
    Offer,
    Answer,
    IceCandidate,
}

/// Reply to a successful join.
#[derive(Debug)]
pub struct JoinAccepted {
    /// Id allocated to the joining participant.
    pub participant_id: ParticipantId,
    /// Whether the joiner became host (first arrival into an empty record).
    pub is_host: bool,
}

/// Current room state, for tests and diagnostics.
#[derive(Debug, Clone)]
pub struct RoomRoster {
    /// Participant ids in insertion order.
    pub participants: Vec<ParticipantId>,
    /// Current host, if any. Always a member of `participants` when set.
    pub host_id: Option<ParticipantId>,
}

/// Messages handled by a room actor.
///
/// Every mutation of one room's membership record flows through this mailbox,
/// which is what makes the single-writer-per-room invariant hold: handlers
/// run to completion in arrival order.
#[derive(Debug)]
pub enum RoomMessage {
    /// A validated participant joins.
    Join {
        connection: ConnectionHandle,
        respond_to: oneshot::Sender<JoinAccepted>,
    },
    /// A participant leaves, voluntarily or by channel failure.
    Leave { participant_id: ParticipantId },
    /// Forward a negotiation payload.
    Relay {
        from: ParticipantId,
        kind: RelayKind,
        target: Option<ParticipantId>,
        data: Value,
    },
    /// The room was administratively deleted: notify and disconnect everyone.
    Teardown { respond_to: oneshot::Sender<()> },
    /// Read the current roster.
    Roster {
        respond_to: oneshot::Sender<RoomRoster>,
    },
}

/// Messages handled by the session controller actor.
#[derive(Debug)]
pub enum ControllerMessage {
    /// Validate a room against the registry and return (spawning if needed)
    /// its room actor handle plus the persisted room name.
    ResolveRoom {
        room_id: RoomId,
        respond_to: oneshot::Sender<Result<super::room::RoomActorHandle, SignalError>>,
    },
    /// Tear down the live session for a deleted room, if one exists.
    TeardownRoom {
        room_id: RoomId,
        respond_to: oneshot::Sender<()>,
    },
    /// Current controller status.
    Status {
        respond_to: oneshot::Sender<ControllerStatus>,
    },
}

/// Controller status, for tests and diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct ControllerStatus {
    /// Number of live (spawned, non-empty) room sessions.
    pub active_rooms: usize,
}
