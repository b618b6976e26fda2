//! Identifier types shared by Parley components.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Length of the random portion of a room id (without separators).
pub const ROOM_ID_CHARS: usize = 12;

/// Size of each dash-separated group in the rendered room id.
const ROOM_ID_GROUP: usize = 4;

/// Unique identifier for a participant.
///
/// Allocated per successful join, held only in memory, and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantId(pub Uuid);

impl ParticipantId {
    /// Create a new random participant ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ParticipantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Room id parse failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoomIdError {
    /// Input does not match the `xxxx-xxxx-xxxx` surface format.
    #[error("Room id must be 12 lowercase letters or digits as xxxx-xxxx-xxxx")]
    InvalidFormat,
}

/// Durable room identifier.
///
/// Twelve lowercase `[a-z0-9]` characters rendered as three dash-separated
/// groups of four (`xxxx-xxxx-xxxx`). Construction goes through [`parse`],
/// which normalizes case and surrounding whitespace, so a held `RoomId` is
/// always well-formed.
///
/// [`parse`]: RoomId::parse
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    /// Parse a room id from user input.
    ///
    /// Trims surrounding whitespace and lowercases before validating, so the
    /// dial-in string a user typed with stray spaces or capitals still
    /// resolves to the canonical id.
    pub fn parse(input: &str) -> Result<Self, RoomIdError> {
        let normalized = input.trim().to_lowercase();

        let groups: Vec<&str> = normalized.split('-').collect();
        if groups.len() != ROOM_ID_CHARS / ROOM_ID_GROUP {
            return Err(RoomIdError::InvalidFormat);
        }
        for group in &groups {
            if group.len() != ROOM_ID_GROUP
                || !group.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            {
                return Err(RoomIdError::InvalidFormat);
            }
        }

        Ok(Self(normalized))
    }

    /// The canonical `xxxx-xxxx-xxxx` rendering.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RoomId {
    type Error = RoomIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomId> for String {
    fn from(id: RoomId) -> Self {
        id.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn participant_ids_are_unique() {
        assert_ne!(ParticipantId::new(), ParticipantId::new());
    }

    #[test]
    fn room_id_accepts_canonical_form() {
        let id = RoomId::parse("abcd-1234-wxyz").unwrap();
        assert_eq!(id.as_str(), "abcd-1234-wxyz");
    }

    #[test]
    fn room_id_normalizes_case_and_whitespace() {
        let id = RoomId::parse("  ABCD-1234-wxYZ \n").unwrap();
        assert_eq!(id.as_str(), "abcd-1234-wxyz");
    }

    #[test]
    fn room_id_rejects_malformed_input() {
        for input in [
            "",
            "abcd1234wxyz",
            "abcd-1234",
            "abcd-1234-wxyz-0000",
            "abc-1234-wxyz",
            "abcd-12_4-wxyz",
            "abcd-1234-wxy!",
        ] {
            assert_eq!(RoomId::parse(input), Err(RoomIdError::InvalidFormat), "{input:?}");
        }
    }

    #[test]
    fn room_id_round_trips_through_serde() {
        let id = RoomId::parse("abcd-1234-wxyz").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abcd-1234-wxyz\"");
        let back: RoomId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn room_id_deserialization_validates() {
        let result: Result<RoomId, _> = serde_json::from_str("\"not a room id\"");
        assert!(result.is_err());
    }
}
