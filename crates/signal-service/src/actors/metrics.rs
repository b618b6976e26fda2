//! Live session counters, surfaced by the health endpoint.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Current session counts, shared between the actor system and the health
/// endpoint.
#[derive(Debug, Default)]
pub struct SessionMetrics {
    /// Rooms with at least one connected participant.
    active_rooms: AtomicU32,
    /// Connected participants across all rooms.
    active_participants: AtomicU32,
}

/// Snapshot of session metrics at a point in time.
#[derive(Debug, Clone, Copy)]
pub struct SessionMetricsSnapshot {
    pub rooms: u32,
    pub participants: u32,
}

impl SessionMetrics {
    /// Create a new shared metrics instance.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Update the active room count.
    pub fn set_rooms(&self, count: u32) {
        self.active_rooms.store(count, Ordering::SeqCst);
    }

    /// Increment the participant count atomically.
    pub fn increment_participants(&self) {
        self.active_participants.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrement the participant count atomically.
    pub fn decrement_participants(&self) {
        self.active_participants.fetch_sub(1, Ordering::SeqCst);
    }

    /// Take a snapshot of the current counters.
    #[must_use]
    pub fn snapshot(&self) -> SessionMetricsSnapshot {
        SessionMetricsSnapshot {
            rooms: self.active_rooms.load(Ordering::SeqCst),
            participants: self.active_participants.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn counters_track_increments_and_decrements() {
        let metrics = SessionMetrics::new();

        metrics.set_rooms(2);
        metrics.increment_participants();
        metrics.increment_participants();
        metrics.decrement_participants();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.rooms, 2);
        assert_eq!(snapshot.participants, 1);
    }
}
