//! Snapshot Cache
//!
//! Durable per-domain snapshots in a local SQLite database. Writes are
//! best effort; reads honor a freshness window and the schema version
//! recorded alongside each row.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

/// Bump when the persisted snapshot layout changes; rows written under
/// an older version read back as misses.
pub const SNAPSHOT_SCHEMA_VERSION: i64 = 1;

/// Default freshness window for cached snapshots.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Cache failures surfaced by the fallible constructors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Underlying SQLite failure.
    #[error("cache storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

/// SQLite-backed store holding the latest snapshot per state domain.
pub struct SnapshotCache {
    conn: Mutex<Connection>,
}

impl SnapshotCache {
    /// Open (or create) a cache database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Open an in-memory cache, useful for tests and ephemeral runs.
    pub fn in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, CacheError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS snapshots (
                domain TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                written_at INTEGER NOT NULL,
                schema_version INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Persist the latest snapshot for a domain, replacing any previous
    /// row. Failures are logged and swallowed so a broken disk never
    /// interrupts live message flow.
    pub fn write(&self, domain: &str, data: &serde_json::Value) {
        let payload = data.to_string();
        let written_at = Utc::now().timestamp();

        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO snapshots (domain, data, written_at, schema_version)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(domain) DO UPDATE SET
                data = excluded.data,
                written_at = excluded.written_at,
                schema_version = excluded.schema_version",
            params![domain, payload, written_at, SNAPSHOT_SCHEMA_VERSION],
        );

        if let Err(e) = result {
            tracing::warn!(domain, error = %e, "Failed to persist snapshot");
        }
    }

    /// Read the snapshot for a domain if one exists, was written under
    /// the current schema version, and is younger than `max_age`.
    pub fn read_if_fresh(&self, domain: &str, max_age: Duration) -> Option<serde_json::Value> {
        let conn = self.conn.lock();
        let row: (String, i64, i64) = conn
            .query_row(
                "SELECT data, written_at, schema_version FROM snapshots WHERE domain = ?1",
                params![domain],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .unwrap_or_else(|e| {
                tracing::warn!(domain, error = %e, "Failed to read snapshot");
                None
            })?;

        let (payload, written_at, schema_version) = row;

        if schema_version != SNAPSHOT_SCHEMA_VERSION {
            tracing::debug!(domain, schema_version, "Snapshot schema version mismatch");
            return None;
        }

        let age = Utc::now().timestamp().saturating_sub(written_at);
        if age < 0 || age.unsigned_abs() > max_age.as_secs() {
            tracing::debug!(domain, age, "Snapshot older than freshness window");
            return None;
        }

        match serde_json::from_str(&payload) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(domain, error = %e, "Cached snapshot is not valid JSON");
                None
            }
        }
    }

    /// Remove every persisted snapshot.
    pub fn clear(&self) {
        let conn = self.conn.lock();
        if let Err(e) = conn.execute("DELETE FROM snapshots", []) {
            tracing::warn!(error = %e, "Failed to clear snapshot cache");
        }
    }
}
