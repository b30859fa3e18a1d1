// ── MindGraph Store: Entity SQL ─────────────────────────────────────────────
// Row-level operations for the entities table. Free functions take a
// `&Connection` so service code can compose them inside transactions;
// the `GraphStore` methods wrap them with the lock for single-shot use.

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::atoms::error::GraphResult;
use crate::atoms::types::{EntityType, RecordSource, RecordStatus, StoredEntity};
use crate::store::GraphStore;

pub(crate) const ENTITY_COLS: &str = "entity_id, entity_type, primary_name, aliases_json, \
     identifiers_json, attributes_json, tags_json, salience, confidence, \
     source, status, created_at, updated_at";

/// Serialize a JSON value for a map column; Null becomes an empty object.
pub(crate) fn map_json(value: &Value) -> String {
    if value.is_null() {
        "{}".to_string()
    } else {
        value.to_string()
    }
}

pub(crate) fn entity_from_row(row: &rusqlite::Row) -> rusqlite::Result<StoredEntity> {
    let aliases_json: String = row.get(3)?;
    let identifiers_json: String = row.get(4)?;
    let attributes_json: String = row.get(5)?;
    let tags_json: String = row.get(6)?;
    let entity_type: String = row.get(1)?;
    let source: String = row.get(9)?;
    let status: String = row.get(10)?;

    Ok(StoredEntity {
        entity_id: row.get(0)?,
        entity_type: EntityType::parse(&entity_type),
        primary_name: row.get(2)?,
        aliases: serde_json::from_str(&aliases_json).unwrap_or_default(),
        identifiers: serde_json::from_str(&identifiers_json).unwrap_or(Value::Null),
        attributes: serde_json::from_str(&attributes_json).unwrap_or(Value::Null),
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        salience: row.get(7)?,
        confidence: row.get(8)?,
        source: RecordSource::parse(&source),
        status: RecordStatus::parse(&status),
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

/// Insert or fully replace an entity row.
pub(crate) fn put_entity(conn: &Connection, entity: &StoredEntity) -> GraphResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO entities (entity_id, entity_type, primary_name,
            aliases_json, identifiers_json, attributes_json, tags_json,
            salience, confidence, source, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            entity.entity_id,
            entity.entity_type.as_str(),
            entity.primary_name,
            serde_json::to_string(&entity.aliases)?,
            map_json(&entity.identifiers),
            map_json(&entity.attributes),
            serde_json::to_string(&entity.tags)?,
            entity.salience,
            entity.confidence,
            entity.source.as_str(),
            entity.status.as_str(),
            entity.created_at,
            entity.updated_at,
        ],
    )?;
    Ok(())
}

pub(crate) fn get_entity_conn(conn: &Connection, entity_id: &str) -> GraphResult<Option<StoredEntity>> {
    let sql = format!("SELECT {ENTITY_COLS} FROM entities WHERE entity_id = ?1");
    let entity = conn
        .query_row(&sql, params![entity_id], entity_from_row)
        .optional()?;
    Ok(entity)
}

impl GraphStore {
    pub fn put_entity(&self, entity: &StoredEntity) -> GraphResult<()> {
        let conn = self.conn.lock();
        put_entity(&conn, entity)
    }

    pub fn get_entity(&self, entity_id: &str) -> GraphResult<Option<StoredEntity>> {
        let conn = self.conn.lock();
        get_entity_conn(&conn, entity_id)
    }

    /// Case-insensitive substring match over primary name, id, and aliases.
    /// Active entities only, most confident first.
    pub fn search_entities_like(
        &self,
        query: &str,
        entity_type: Option<EntityType>,
        min_confidence: f64,
        limit: usize,
    ) -> GraphResult<Vec<StoredEntity>> {
        let pattern = format!("%{}%", query.to_lowercase());
        let type_filter = match entity_type {
            Some(t) => format!("AND entity_type = '{}'", t.as_str()),
            None => String::new(),
        };
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {ENTITY_COLS} FROM entities
             WHERE status = 'active'
               AND confidence >= ?2
               AND (lower(primary_name) LIKE ?1
                    OR lower(entity_id) LIKE ?1
                    OR lower(aliases_json) LIKE ?1)
               {type_filter}
             ORDER BY confidence DESC, salience DESC
             LIMIT ?3"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![pattern, min_confidence, limit as i64], entity_from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Match-quality scored entity lookup for top-k search.
    /// exact 1.0 > prefix 0.9 > substring 0.7 > alias 0.6, weighted by
    /// the row's confidence.
    pub fn score_entities(&self, query: &str, k: usize) -> GraphResult<Vec<(StoredEntity, f64)>> {
        let q = query.to_lowercase();
        let prefix = format!("{q}%");
        let substring = format!("%{q}%");
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {ENTITY_COLS},
                CASE
                    WHEN lower(primary_name) = ?1 THEN 1.0
                    WHEN lower(primary_name) LIKE ?2 THEN 0.9
                    WHEN lower(primary_name) LIKE ?3 THEN 0.7
                    WHEN lower(aliases_json) LIKE ?3 THEN 0.6
                    ELSE 0.0
                END AS match_score
             FROM entities
             WHERE status = 'active'
               AND (lower(primary_name) LIKE ?3 OR lower(aliases_json) LIKE ?3)
             ORDER BY match_score * confidence DESC
             LIMIT ?4"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![q, prefix, substring, k as i64], |row| {
            let entity = entity_from_row(row)?;
            let match_score: f64 = row.get(13)?;
            Ok((entity, match_score))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (entity, match_score) = row?;
            let similarity = match_score * entity.confidence;
            out.push((entity, similarity));
        }
        Ok(out)
    }

    pub fn count_entities(&self, status: Option<RecordStatus>) -> GraphResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = match status {
            Some(s) => conn.query_row(
                "SELECT COUNT(*) FROM entities WHERE status = ?1",
                params![s.as_str()],
                |r| r.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM entities", [], |r| r.get(0))?,
        };
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::now_ts;

    pub(crate) fn sample_entity(id: &str, name: &str) -> StoredEntity {
        StoredEntity {
            entity_id: id.to_string(),
            entity_type: EntityType::Person,
            primary_name: name.to_string(),
            aliases: vec![],
            identifiers: Value::Null,
            attributes: Value::Null,
            tags: vec![],
            salience: 0.5,
            confidence: 0.9,
            source: RecordSource::Extraction,
            status: RecordStatus::Active,
            created_at: now_ts(),
            updated_at: now_ts(),
        }
    }

    #[test]
    fn put_and_get_roundtrip() {
        let store = GraphStore::open_in_memory().unwrap();
        let entity = sample_entity("person:marco", "Marco");
        store.put_entity(&entity).unwrap();

        let loaded = store.get_entity("person:marco").unwrap().unwrap();
        assert_eq!(loaded.primary_name, "Marco");
        assert_eq!(loaded.entity_type, EntityType::Person);
        assert!(loaded.identifiers.is_null() || loaded.identifiers.as_object().is_some());
    }

    #[test]
    fn get_missing_is_none() {
        let store = GraphStore::open_in_memory().unwrap();
        assert!(store.get_entity("person:nessuno").unwrap().is_none());
    }

    #[test]
    fn like_search_matches_aliases() {
        let store = GraphStore::open_in_memory().unwrap();
        let mut entity = sample_entity("person:giovanna_bianchi", "Giovanna Bianchi");
        entity.aliases = vec!["Giò".to_string()];
        store.put_entity(&entity).unwrap();

        let by_name = store.search_entities_like("giovanna", None, 0.0, 10).unwrap();
        assert_eq!(by_name.len(), 1);
        let by_alias = store.search_entities_like("giò", None, 0.0, 10).unwrap();
        assert_eq!(by_alias.len(), 1);
        let wrong_type = store
            .search_entities_like("giovanna", Some(EntityType::Food), 0.0, 10)
            .unwrap();
        assert!(wrong_type.is_empty());
    }

    #[test]
    fn scored_search_orders_exact_first() {
        let store = GraphStore::open_in_memory().unwrap();
        store.put_entity(&sample_entity("person:anna", "Anna")).unwrap();
        store
            .put_entity(&sample_entity("person:annalisa", "Annalisa"))
            .unwrap();

        let hits = store.score_entities("anna", 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.primary_name, "Anna");
        assert!(hits[0].1 > hits[1].1);
    }
}
