//! Actor system for live session state.
//!
//! Hierarchy: one `SessionControllerActor` per process supervises per-room
//! `RoomActor`s, each of which holds `ConnectionHandle`s into the WebSocket
//! tasks. Cancellation tokens parent downward so shutdown propagates.

mod connection;
mod controller;
mod messages;
mod metrics;
mod room;

pub use connection::ConnectionHandle;
pub use controller::SessionControllerHandle;
pub use messages::{ControllerStatus, JoinAccepted, RelayKind, RoomRoster};
pub use metrics::{SessionMetrics, SessionMetricsSnapshot};
pub use room::RoomActorHandle;
