// ── MindGraph Store: Relationship Event SQL ─────────────────────────────────
// The event log is append-only: inserts and reads, no updates ever.

use rusqlite::{params, Connection};
use serde_json::Value;

use crate::atoms::error::GraphResult;
use crate::atoms::types::{NormalizationMethod, RelationshipEvent};
use crate::store::GraphStore;

pub(crate) const EVENT_COLS: &str = "event_id, rel_id, predicate, valence, intensity, \
     source_sentence, timestamp, normalization_method, normalization_confidence, metadata_json";

pub(crate) fn event_from_row(row: &rusqlite::Row) -> rusqlite::Result<RelationshipEvent> {
    let method: String = row.get(7)?;
    let metadata_json: String = row.get(9)?;
    Ok(RelationshipEvent {
        event_id: row.get(0)?,
        rel_id: row.get(1)?,
        predicate: row.get(2)?,
        valence: row.get(3)?,
        intensity: row.get(4)?,
        source_sentence: row.get(5)?,
        timestamp: row.get(6)?,
        normalization_method: NormalizationMethod::parse(&method),
        normalization_confidence: row.get(8)?,
        metadata: serde_json::from_str(&metadata_json).unwrap_or(Value::Null),
    })
}

pub(crate) fn insert_event(conn: &Connection, event: &RelationshipEvent) -> GraphResult<()> {
    conn.execute(
        "INSERT INTO relationship_events (event_id, rel_id, predicate, valence,
            intensity, source_sentence, timestamp, normalization_method,
            normalization_confidence, metadata_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            event.event_id,
            event.rel_id,
            event.predicate,
            event.valence,
            event.intensity,
            event.source_sentence,
            event.timestamp,
            event.normalization_method.as_str(),
            event.normalization_confidence,
            crate::store::entities::map_json(&event.metadata),
        ],
    )?;
    Ok(())
}

impl GraphStore {
    pub fn insert_event(&self, event: &RelationshipEvent) -> GraphResult<()> {
        let conn = self.conn.lock();
        insert_event(&conn, event)
    }

    /// Events for one relationship, oldest-first or newest-first.
    /// Ties on timestamp break on insertion order (rowid) so events
    /// recorded within the same second keep their true sequence.
    pub fn list_events(
        &self,
        rel_id: &str,
        limit: Option<usize>,
        ascending: bool,
    ) -> GraphResult<Vec<RelationshipEvent>> {
        let order = if ascending { "ASC" } else { "DESC" };
        let limit = limit.map_or(-1i64, |l| l as i64);
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {EVENT_COLS} FROM relationship_events
             WHERE rel_id = ?1
             ORDER BY timestamp {order}, rowid {order}
             LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![rel_id, limit], event_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn count_events(&self) -> GraphResult<usize> {
        let conn = self.conn.lock();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM relationship_events", [], |r| r.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::RelationCategory;
    use crate::store::now_ts;
    use crate::store::relationships::test_support::sample_relationship;

    fn sample_event(event_id: &str, rel_id: &str, valence: f64) -> RelationshipEvent {
        RelationshipEvent {
            event_id: event_id.to_string(),
            rel_id: rel_id.to_string(),
            predicate: "amare".to_string(),
            valence,
            intensity: valence.abs(),
            source_sentence: None,
            timestamp: now_ts(),
            normalization_method: NormalizationMethod::Direct,
            normalization_confidence: 0.95,
            metadata: Value::Null,
        }
    }

    fn store_with_rel() -> GraphStore {
        let store = GraphStore::open_in_memory().unwrap();
        store
            .insert_relationship(&sample_relationship(
                "rel:1",
                "person:a",
                "food:pizza",
                RelationCategory::Sentiment,
            ))
            .unwrap();
        store
    }

    #[test]
    fn events_keep_insertion_order() {
        let store = store_with_rel();
        store.insert_event(&sample_event("evt:1", "rel:1", 0.9)).unwrap();
        store.insert_event(&sample_event("evt:2", "rel:1", 0.1)).unwrap();
        store.insert_event(&sample_event("evt:3", "rel:1", -0.8)).unwrap();

        let asc = store.list_events("rel:1", None, true).unwrap();
        assert_eq!(
            asc.iter().map(|e| e.event_id.as_str()).collect::<Vec<_>>(),
            vec!["evt:1", "evt:2", "evt:3"]
        );

        let desc = store.list_events("rel:1", Some(2), false).unwrap();
        assert_eq!(desc.len(), 2);
        assert_eq!(desc[0].event_id, "evt:3");
    }

    #[test]
    fn orphan_event_is_rejected() {
        let store = GraphStore::open_in_memory().unwrap();
        let err = store.insert_event(&sample_event("evt:1", "rel:ghost", 0.5));
        assert!(err.is_err(), "event without a relationship must be rejected");
    }

    #[test]
    fn hard_deleting_relationship_cascades_to_events() {
        let store = store_with_rel();
        store.insert_event(&sample_event("evt:1", "rel:1", 0.9)).unwrap();
        assert_eq!(store.count_events().unwrap(), 1);

        {
            let conn = store.conn.lock();
            crate::store::relationships::delete_relationship_row(&conn, "rel:1").unwrap();
        }
        assert_eq!(store.count_events().unwrap(), 0);
    }
}
