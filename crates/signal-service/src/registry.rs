//! Room registry - the durable catalog of room identity.
//!
//! Rooms live in SQLite (`rooms(id TEXT PRIMARY KEY, name TEXT, created_at
//! INTEGER)`); live membership is never persisted. All queries are
//! parameterized, and a create is acknowledged only after the `INSERT` has
//! completed, so an acknowledged room survives an immediate crash.

use crate::errors::SignalError;
use common::types::{RoomId, ROOM_ID_CHARS};
use ring::rand::{SecureRandom, SystemRandom};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::{debug, info, instrument};

/// Bounded retries for room-id collisions at insert time.
const MAX_ID_COLLISION_RETRIES: usize = 5;

/// Random bytes drawn per id candidate (64 bits for 12 base36 chars).
const ROOM_ID_RANDOM_BYTES: usize = 8;

/// Characters a room id is drawn from.
const ROOM_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// A persisted room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    /// Creation time, unix milliseconds.
    pub created_at: i64,
}

/// Room registry backed by a SQLite pool.
#[derive(Clone)]
pub struct RoomRegistry {
    pool: SqlitePool,
}

impl RoomRegistry {
    /// Open (or create) the database at `path` and bootstrap the schema.
    pub async fn connect(path: &str) -> Result<Self, SignalError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| SignalError::Database(format!("create data dir: {e}")))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let registry = Self { pool };
        registry.init_schema().await?;

        info!(target: "signal.registry", path = %path, "Room registry initialized");
        Ok(registry)
    }

    /// In-memory registry for tests.
    ///
    /// A single connection is mandatory: every SQLite `:memory:` connection
    /// is its own database.
    pub async fn in_memory() -> Result<Self, SignalError> {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let registry = Self { pool };
        registry.init_schema().await?;
        Ok(registry)
    }

    async fn init_schema(&self) -> Result<(), SignalError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS rooms (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Create a room with a freshly generated id.
    ///
    /// The id is regenerated on collision with an existing row (bounded
    /// retries). The insert completes before the room is returned.
    #[instrument(skip_all, name = "signal.registry.create_room")]
    pub async fn create_room(&self, name: &str) -> Result<Room, SignalError> {
        let created_at = chrono::Utc::now().timestamp_millis();

        for attempt in 0..MAX_ID_COLLISION_RETRIES {
            let id = generate_room_id()?;

            let result = sqlx::query("INSERT INTO rooms (id, name, created_at) VALUES (?1, ?2, ?3)")
                .bind(id.as_str())
                .bind(name)
                .bind(created_at)
                .execute(&self.pool)
                .await;

            match result {
                Ok(_) => {
                    info!(target: "signal.registry", room_id = %id, "Room created");
                    return Ok(Room {
                        id,
                        name: name.to_string(),
                        created_at,
                    });
                }
                Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                    debug!(
                        target: "signal.registry",
                        attempt = attempt + 1,
                        "Room id collision, retrying"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(SignalError::Internal(
            "Failed to generate a unique room id".to_string(),
        ))
    }

    /// Fetch one room by id.
    pub async fn get_room(&self, id: &RoomId) -> Result<Option<Room>, SignalError> {
        let row = sqlx::query("SELECT id, name, created_at FROM rooms WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(map_row_to_room).transpose()
    }

    /// All rooms, most recently created first.
    pub async fn list_rooms(&self) -> Result<Vec<Room>, SignalError> {
        let rows = sqlx::query("SELECT id, name, created_at FROM rooms ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(map_row_to_room).collect()
    }

    /// Delete a room. Returns whether it existed.
    ///
    /// Tearing down the room's live session is the caller's responsibility
    /// (the admin handler invokes the session controller's teardown hook).
    #[instrument(skip_all, name = "signal.registry.delete_room", fields(room_id = %id))]
    pub async fn delete_room(&self, id: &RoomId) -> Result<bool, SignalError> {
        let result = sqlx::query("DELETE FROM rooms WHERE id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        let existed = result.rows_affected() > 0;
        if existed {
            info!(target: "signal.registry", room_id = %id, "Room deleted");
        }
        Ok(existed)
    }
}

fn map_row_to_room(row: sqlx::sqlite::SqliteRow) -> Result<Room, SignalError> {
    let id: String = row.get("id");
    Ok(Room {
        id: RoomId::parse(&id)
            .map_err(|e| SignalError::Database(format!("corrupt room id {id:?}: {e}")))?,
        name: row.get("name"),
        created_at: row.get("created_at"),
    })
}

/// Generate a room-id candidate: 12 CSPRNG base36 characters rendered as
/// `xxxx-xxxx-xxxx`.
fn generate_room_id() -> Result<RoomId, SignalError> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; ROOM_ID_RANDOM_BYTES];
    rng.fill(&mut bytes)
        .map_err(|_| SignalError::Internal("RNG failure".to_string()))?;

    let mut value = u64::from_be_bytes(bytes);
    let mut chars = Vec::with_capacity(ROOM_ID_CHARS);
    for _ in 0..ROOM_ID_CHARS {
        let idx = (value % ROOM_ID_ALPHABET.len() as u64) as usize;
        let ch = ROOM_ID_ALPHABET
            .get(idx)
            .ok_or_else(|| SignalError::Internal("alphabet index out of range".to_string()))?;
        chars.push(*ch);
        value /= ROOM_ID_ALPHABET.len() as u64;
    }

    let raw = String::from_utf8(chars)
        .map_err(|_| SignalError::Internal("room id contained invalid UTF-8".to_string()))?;
    let grouped = format!(
        "{}-{}-{}",
        raw.get(0..4)
            .ok_or_else(|| SignalError::Internal("room id too short".to_string()))?,
        raw.get(4..8)
            .ok_or_else(|| SignalError::Internal("room id too short".to_string()))?,
        raw.get(8..12)
            .ok_or_else(|| SignalError::Internal("room id too short".to_string()))?,
    );

    RoomId::parse(&grouped).map_err(|e| SignalError::Internal(format!("generated bad id: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_match_the_surface_format() {
        for _ in 0..32 {
            let id = generate_room_id().unwrap();
            assert!(RoomId::parse(id.as_str()).is_ok());
            assert_eq!(id.as_str().len(), 14);
        }
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = generate_room_id().unwrap();
        let b = generate_room_id().unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let registry = RoomRegistry::in_memory().await.unwrap();

        let room = registry.create_room("Family").await.unwrap();
        let fetched = registry.get_room(&room.id).await.unwrap();

        assert_eq!(fetched, Some(room));
    }

    #[tokio::test]
    async fn get_missing_room_returns_none() {
        let registry = RoomRegistry::in_memory().await.unwrap();
        let id = RoomId::parse("aaaa-bbbb-cccc").unwrap();

        assert_eq!(registry.get_room(&id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let registry = RoomRegistry::in_memory().await.unwrap();

        // Distinct timestamps: created_at has millisecond resolution.
        let first = registry.create_room("first").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = registry.create_room("second").await.unwrap();

        let rooms = registry.list_rooms().await.unwrap();
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms.first().map(|r| r.id.clone()), Some(second.id));
        assert_eq!(rooms.last().map(|r| r.id.clone()), Some(first.id));
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let registry = RoomRegistry::in_memory().await.unwrap();
        let room = registry.create_room("Family").await.unwrap();

        assert!(registry.delete_room(&room.id).await.unwrap());
        assert!(!registry.delete_room(&room.id).await.unwrap());
        assert_eq!(registry.get_room(&room.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn room_ids_are_unique_among_existing_rooms() {
        let registry = RoomRegistry::in_memory().await.unwrap();

        let mut seen = std::collections::HashSet::new();
        for _ in 0..20 {
            let room = registry.create_room("r").await.unwrap();
            assert!(seen.insert(room.id));
        }
    }
}
