//! Shared types for Parley components.
//!
//! This crate holds everything the server (`signal-service`) and the client
//! core (`call-client`) must agree on: identifier newtypes, the JSON wire
//! protocol spoken over the signaling channel, and the relay-server
//! configuration handed to clients at join time.

pub mod protocol;
pub mod secret;
pub mod types;

pub use protocol::{ClientMessage, RelayServer, ServerMessage};
pub use types::{ParticipantId, RoomId, RoomIdError};
