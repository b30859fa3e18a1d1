// ── MindGraph Store ─────────────────────────────────────────────────────────
// SQLite persistence for the knowledge graph. One connection behind a
// Mutex; every multi-statement mutation runs inside a transaction on
// that connection, so writers serialize and partial writes never land.
//
// Module layout:
//   schema         — idempotent migrations
//   entities       — entity row SQL + mapping
//   relationships  — relationship row SQL + filtered listing
//   events         — append-only relationship event log

use std::path::Path;

use log::info;
use parking_lot::Mutex;
use rusqlite::Connection;

use crate::atoms::error::GraphResult;

pub(crate) mod entities;
pub(crate) mod events;
pub(crate) mod relationships;
mod schema;

/// Thread-safe database wrapper.
pub struct GraphStore {
    /// The SQLite connection, protected by a Mutex.
    /// `pub` for integration tests that need to construct an in-memory store.
    pub conn: Mutex<Connection>,
}

impl GraphStore {
    /// Open (or create) the graph database and initialize tables.
    pub fn open(path: impl AsRef<Path>) -> GraphResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        info!("[store] Opening graph store at {:?}", path);

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        // Required for relationship_events ON DELETE CASCADE.
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        schema::run_migrations(&conn)?;

        Ok(GraphStore {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store with the full schema. For tests.
    pub fn open_in_memory() -> GraphResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        schema::run_migrations(&conn)?;
        Ok(GraphStore {
            conn: Mutex::new(conn),
        })
    }
}

/// Initialise an already-open connection with the full schema.
/// Used by integration tests that create their own connections.
pub fn schema_for_testing(conn: &Connection) {
    schema::run_migrations(conn).expect("schema_for_testing: migrations failed");
}

/// Current UTC timestamp in the storage format.
pub fn now_ts() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Days elapsed since a stored timestamp. Unparseable values count as
/// fresh (0 days) so malformed rows are never decayed by accident.
pub(crate) fn days_since(timestamp: &str, now: &chrono::DateTime<chrono::Utc>) -> f64 {
    if let Ok(parsed) = chrono::NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%SZ") {
        let dt = parsed.and_utc();
        (*now - dt).num_hours() as f64 / 24.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_store_has_schema() {
        let store = GraphStore::open_in_memory().unwrap();
        let conn = store.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table'
                 AND name IN ('entities', 'relationships', 'relationship_events')",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn migrations_are_idempotent() {
        let store = GraphStore::open_in_memory().unwrap();
        let conn = store.conn.lock();
        schema_for_testing(&conn);
        schema_for_testing(&conn);
    }

    #[test]
    fn days_since_recent_timestamp() {
        let now = chrono::Utc::now();
        let ts = now.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        assert!(days_since(&ts, &now) < 1.0);
    }

    #[test]
    fn days_since_garbage_counts_as_fresh() {
        let now = chrono::Utc::now();
        assert_eq!(days_since("not-a-date", &now), 0.0);
    }
}
