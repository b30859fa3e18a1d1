// ── MindGraph Store: Relationship SQL ───────────────────────────────────────
// Row-level operations for the relationships table, including the
// filtered listing and the match-quality scoring used by top-k search.

use rusqlite::types::ToSql;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;

use crate::atoms::error::GraphResult;
use crate::atoms::results::{
    RelationshipFilter, RelationshipQuery, RelationshipWithTarget,
};
use crate::atoms::types::{
    EntityType, RecordSource, RecordStatus, RelationCategory, StoredRelationship, Valence,
};
use crate::store::GraphStore;

pub(crate) const REL_COLS: &str = "rel_id, from_entity_id, to_entity_id, relation_type, \
     original_predicate, source_sentence, metadata_json, strength, confidence, \
     valence, intensity, evidence_count, source, status, last_reinforced, \
     created_at, updated_at";

pub(crate) fn relationship_from_row(row: &rusqlite::Row) -> rusqlite::Result<StoredRelationship> {
    let relation_type: String = row.get(3)?;
    let metadata_json: String = row.get(6)?;
    let valence: String = row.get(9)?;
    let source: String = row.get(12)?;
    let status: String = row.get(13)?;

    Ok(StoredRelationship {
        rel_id: row.get(0)?,
        from_entity_id: row.get(1)?,
        to_entity_id: row.get(2)?,
        relation_type: RelationCategory::parse(&relation_type),
        original_predicate: row.get(4)?,
        source_sentence: row.get(5)?,
        metadata: serde_json::from_str(&metadata_json).unwrap_or(Value::Null),
        strength: row.get(7)?,
        confidence: row.get(8)?,
        valence: Valence::parse(&valence),
        intensity: row.get(10)?,
        evidence_count: row.get(11)?,
        source: RecordSource::parse(&source),
        status: RecordStatus::parse(&status),
        last_reinforced: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

/// Insert a new relationship row. Plain INSERT on purpose: a second active
/// row for the same (from, to, category) triple must surface as a
/// constraint error, never silently replace the existing one.
pub(crate) fn insert_relationship(conn: &Connection, rel: &StoredRelationship) -> GraphResult<()> {
    conn.execute(
        "INSERT INTO relationships (rel_id, from_entity_id, to_entity_id,
            relation_type, original_predicate, source_sentence, metadata_json,
            strength, confidence, valence, intensity, evidence_count,
            source, status, last_reinforced, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            rel.rel_id,
            rel.from_entity_id,
            rel.to_entity_id,
            rel.relation_type.as_str(),
            rel.original_predicate,
            rel.source_sentence,
            crate::store::entities::map_json(&rel.metadata),
            rel.strength,
            rel.confidence,
            rel.valence.as_str(),
            rel.intensity,
            rel.evidence_count,
            rel.source.as_str(),
            rel.status.as_str(),
            rel.last_reinforced,
            rel.created_at,
            rel.updated_at,
        ],
    )?;
    Ok(())
}

/// Update every mutable field of an existing relationship row.
pub(crate) fn update_relationship_row(
    conn: &Connection,
    rel: &StoredRelationship,
) -> GraphResult<usize> {
    let n = conn.execute(
        "UPDATE relationships SET
            original_predicate = ?2, source_sentence = ?3, metadata_json = ?4,
            strength = ?5, confidence = ?6, valence = ?7, intensity = ?8,
            evidence_count = ?9, source = ?10, status = ?11,
            last_reinforced = ?12, updated_at = ?13
         WHERE rel_id = ?1",
        params![
            rel.rel_id,
            rel.original_predicate,
            rel.source_sentence,
            crate::store::entities::map_json(&rel.metadata),
            rel.strength,
            rel.confidence,
            rel.valence.as_str(),
            rel.intensity,
            rel.evidence_count,
            rel.source.as_str(),
            rel.status.as_str(),
            rel.last_reinforced,
            rel.updated_at,
        ],
    )?;
    Ok(n)
}

pub(crate) fn get_relationship_conn(
    conn: &Connection,
    rel_id: &str,
) -> GraphResult<Option<StoredRelationship>> {
    let sql = format!("SELECT {REL_COLS} FROM relationships WHERE rel_id = ?1");
    let rel = conn
        .query_row(&sql, params![rel_id], relationship_from_row)
        .optional()?;
    Ok(rel)
}

/// The single active relationship for a (from, to, category) triple, if any.
pub(crate) fn find_active_conn(
    conn: &Connection,
    from_entity_id: &str,
    to_entity_id: &str,
    relation_type: RelationCategory,
) -> GraphResult<Option<StoredRelationship>> {
    let sql = format!(
        "SELECT {REL_COLS} FROM relationships
         WHERE from_entity_id = ?1 AND to_entity_id = ?2
           AND relation_type = ?3 AND status = 'active'"
    );
    let rel = conn
        .query_row(
            &sql,
            params![from_entity_id, to_entity_id, relation_type.as_str()],
            relationship_from_row,
        )
        .optional()?;
    Ok(rel)
}

pub(crate) fn delete_relationship_row(conn: &Connection, rel_id: &str) -> GraphResult<usize> {
    let n = conn.execute("DELETE FROM relationships WHERE rel_id = ?1", params![rel_id])?;
    Ok(n)
}

/// Build the WHERE fragment + parameters for a relationship filter.
fn filter_clauses(filter: &RelationshipFilter) -> (String, Vec<Box<dyn ToSql>>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Box<dyn ToSql>> = Vec::new();

    let status = filter.status.unwrap_or(RecordStatus::Active);
    clauses.push(format!("status = ?{}", values.len() + 1));
    values.push(Box::new(status.as_str().to_string()));

    if let Some(from) = &filter.from_entity_id {
        clauses.push(format!("from_entity_id = ?{}", values.len() + 1));
        values.push(Box::new(from.clone()));
    }
    if let Some(to) = &filter.to_entity_id {
        clauses.push(format!("to_entity_id = ?{}", values.len() + 1));
        values.push(Box::new(to.clone()));
    }
    if let Some(relation_type) = filter.relation_type {
        clauses.push(format!("relation_type = ?{}", values.len() + 1));
        values.push(Box::new(relation_type.as_str().to_string()));
    }
    if let Some(valence) = filter.valence {
        clauses.push(format!("valence = ?{}", values.len() + 1));
        values.push(Box::new(valence.as_str().to_string()));
    }
    if let Some(min_confidence) = filter.min_confidence {
        clauses.push(format!("confidence >= ?{}", values.len() + 1));
        values.push(Box::new(min_confidence));
    }
    if let Some(min_strength) = filter.min_strength {
        clauses.push(format!("strength >= ?{}", values.len() + 1));
        values.push(Box::new(min_strength));
    }

    (clauses.join(" AND "), values)
}

impl GraphStore {
    pub fn insert_relationship(&self, rel: &StoredRelationship) -> GraphResult<()> {
        let conn = self.conn.lock();
        insert_relationship(&conn, rel)
    }

    pub fn save_relationship(&self, rel: &StoredRelationship) -> GraphResult<usize> {
        let conn = self.conn.lock();
        update_relationship_row(&conn, rel)
    }

    pub fn get_relationship(&self, rel_id: &str) -> GraphResult<Option<StoredRelationship>> {
        let conn = self.conn.lock();
        get_relationship_conn(&conn, rel_id)
    }

    pub fn find_active_relationship(
        &self,
        from_entity_id: &str,
        to_entity_id: &str,
        relation_type: RelationCategory,
    ) -> GraphResult<Option<StoredRelationship>> {
        let conn = self.conn.lock();
        find_active_conn(&conn, from_entity_id, to_entity_id, relation_type)
    }

    /// Filtered listing plus the unpaginated total for the same filter.
    pub fn list_relationships(
        &self,
        filter: &RelationshipFilter,
    ) -> GraphResult<(Vec<StoredRelationship>, usize)> {
        let (where_sql, values) = filter_clauses(filter);
        let limit = filter.limit.unwrap_or(50);
        let offset = filter.offset.unwrap_or(0);

        let conn = self.conn.lock();

        let count_sql = format!("SELECT COUNT(*) FROM relationships WHERE {where_sql}");
        let total: i64 = conn.query_row(
            &count_sql,
            params_from_iter(values.iter().map(|v| v.as_ref())),
            |r| r.get(0),
        )?;

        let list_sql = format!(
            "SELECT {REL_COLS} FROM relationships WHERE {where_sql}
             ORDER BY updated_at DESC
             LIMIT {limit} OFFSET {offset}"
        );
        let mut stmt = conn.prepare(&list_sql)?;
        let rows = stmt.query_map(
            params_from_iter(values.iter().map(|v| v.as_ref())),
            relationship_from_row,
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok((out, total as usize))
    }

    /// Relationships joined with their target entity's type and name.
    /// Strongest feelings first (intensity, then confidence).
    pub fn query_relationships_with_target(
        &self,
        query: &RelationshipQuery,
    ) -> GraphResult<Vec<RelationshipWithTarget>> {
        let mut clauses: Vec<String> = vec!["r.status = 'active'".to_string()];
        let mut values: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(from) = &query.from_entity_id {
            clauses.push(format!("r.from_entity_id = ?{}", values.len() + 1));
            values.push(Box::new(from.clone()));
        }
        if let Some(relation_type) = query.relation_type {
            clauses.push(format!("r.relation_type = ?{}", values.len() + 1));
            values.push(Box::new(relation_type.as_str().to_string()));
        }
        if let Some(valence) = query.valence {
            clauses.push(format!("r.valence = ?{}", values.len() + 1));
            values.push(Box::new(valence.as_str().to_string()));
        }
        if let Some(target_type) = query.target_type {
            clauses.push(format!("e.entity_type = ?{}", values.len() + 1));
            values.push(Box::new(target_type.as_str().to_string()));
        }

        let limit = query.limit.unwrap_or(50);
        let rel_cols = REL_COLS
            .split(", ")
            .map(|c| format!("r.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {rel_cols}, e.entity_type, e.primary_name
             FROM relationships r
             LEFT JOIN entities e ON e.entity_id = r.to_entity_id
             WHERE {}
             ORDER BY r.intensity DESC, r.confidence DESC
             LIMIT {limit}",
            clauses.join(" AND ")
        );

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter().map(|v| v.as_ref())), |row| {
            let relationship = relationship_from_row(row)?;
            let target_type: Option<String> = row.get(17)?;
            let target_name: Option<String> = row.get(18)?;
            Ok(RelationshipWithTarget {
                relationship,
                target_type: target_type.as_deref().map(EntityType::parse),
                target_name,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Match-quality scored relationship lookup for top-k search:
    /// sentence 0.9 > predicate 0.8 > endpoint id 0.7, weighted by confidence.
    pub fn score_relationships(
        &self,
        query: &str,
        k: usize,
    ) -> GraphResult<Vec<(StoredRelationship, f64)>> {
        let pattern = format!("%{}%", query.to_lowercase());
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT {REL_COLS},
                CASE
                    WHEN lower(coalesce(source_sentence, '')) LIKE ?1 THEN 0.9
                    WHEN lower(original_predicate) LIKE ?1 THEN 0.8
                    WHEN lower(from_entity_id) LIKE ?1 OR lower(to_entity_id) LIKE ?1 THEN 0.7
                    ELSE 0.0
                END AS match_score
             FROM relationships
             WHERE status = 'active'
               AND (lower(coalesce(source_sentence, '')) LIKE ?1
                    OR lower(original_predicate) LIKE ?1
                    OR lower(from_entity_id) LIKE ?1
                    OR lower(to_entity_id) LIKE ?1)
             ORDER BY match_score * confidence DESC
             LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![pattern, k as i64], |row| {
            let rel = relationship_from_row(row)?;
            let match_score: f64 = row.get(17)?;
            Ok((rel, match_score))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (rel, match_score) = row?;
            let similarity = match_score * rel.confidence;
            out.push((rel, similarity));
        }
        Ok(out)
    }

    /// Distinct endpoint ids of active relationships matching a name fragment.
    /// Used by entity resolution when the entity table has no answer.
    pub fn endpoint_ids_like(&self, query: &str, limit: usize) -> GraphResult<Vec<String>> {
        let pattern = format!("%{}%", query.to_lowercase());
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT DISTINCT endpoint FROM (
                SELECT from_entity_id AS endpoint FROM relationships WHERE status = 'active'
                UNION
                SELECT to_entity_id AS endpoint FROM relationships WHERE status = 'active'
             )
             WHERE lower(endpoint) LIKE ?1
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![pattern, limit as i64], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// True if an active relationship links the two entities in either direction.
    pub fn active_relationship_between(&self, a: &str, b: &str) -> GraphResult<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM relationships
             WHERE status = 'active'
               AND ((from_entity_id = ?1 AND to_entity_id = ?2)
                    OR (from_entity_id = ?2 AND to_entity_id = ?1))",
            params![a, b],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    /// True if the entity participates in any relationship, regardless of status.
    pub fn entity_has_relationships(&self, entity_id: &str) -> GraphResult<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM relationships
             WHERE from_entity_id = ?1 OR to_entity_id = ?1",
            params![entity_id],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn count_relationships(&self, status: Option<RecordStatus>) -> GraphResult<usize> {
        let conn = self.conn.lock();
        let count: i64 = match status {
            Some(s) => conn.query_row(
                "SELECT COUNT(*) FROM relationships WHERE status = ?1",
                params![s.as_str()],
                |r| r.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM relationships", [], |r| r.get(0))?,
        };
        Ok(count as usize)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::sample_relationship;
    use super::*;

    #[test]
    fn put_get_and_find_active() {
        let store = GraphStore::open_in_memory().unwrap();
        let rel = sample_relationship(
            "rel:a_to_b_1",
            "person:a",
            "food:pizza",
            RelationCategory::Sentiment,
        );
        store.insert_relationship(&rel).unwrap();

        let loaded = store.get_relationship("rel:a_to_b_1").unwrap().unwrap();
        assert_eq!(loaded.valence, Valence::Positive);

        let active = store
            .find_active_relationship("person:a", "food:pizza", RelationCategory::Sentiment)
            .unwrap();
        assert!(active.is_some());

        let missing = store
            .find_active_relationship("person:a", "food:pizza", RelationCategory::Ownership)
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn active_triple_uniqueness_is_enforced() {
        let store = GraphStore::open_in_memory().unwrap();
        let a = sample_relationship("rel:1", "person:a", "food:pizza", RelationCategory::Sentiment);
        let mut b =
            sample_relationship("rel:2", "person:a", "food:pizza", RelationCategory::Sentiment);
        store.insert_relationship(&a).unwrap();
        let err = store.insert_relationship(&b);
        assert!(err.is_err(), "duplicate active triple must be rejected");

        // A deleted row does not occupy the active slot.
        b.status = RecordStatus::Deleted;
        store.insert_relationship(&b).unwrap();
    }

    #[test]
    fn filter_listing_and_total() {
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
            .insert_relationship(&sample_relationship(
                "rel:2",
                "person:a",
                "org:acme",
                RelationCategory::Employment,
            ))
            .unwrap();

        let filter = RelationshipFilter {
            from_entity_id: Some("person:a".to_string()),
            ..Default::default()
        };
        let (rows, total) = store.list_relationships(&filter).unwrap();
        assert_eq!(total, 2);
        assert_eq!(rows.len(), 2);

        let filter = RelationshipFilter {
            relation_type: Some(RelationCategory::Employment),
            limit: Some(1),
            ..Default::default()
        };
        let (rows, total) = store.list_relationships(&filter).unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].rel_id, "rel:2");
    }

    #[test]
    fn min_confidence_filter_excludes_weak_rows() {
        let store = GraphStore::open_in_memory().unwrap();
        let mut weak =
            sample_relationship("rel:weak", "person:a", "food:kale", RelationCategory::Sentiment);
        weak.confidence = 0.3;
        store.insert_relationship(&weak).unwrap();

        let filter = RelationshipFilter {
            min_confidence: Some(0.5),
            ..Default::default()
        };
        let (rows, total) = store.list_relationships(&filter).unwrap();
        assert_eq!(total, 0);
        assert!(rows.is_empty());
    }

    #[test]
    fn endpoint_scan_finds_both_directions() {
        let store = GraphStore::open_in_memory().unwrap();
        store
            .insert_relationship(&sample_relationship(
                "rel:1",
                "person:giovanna",
                "person:maria",
                RelationCategory::Family,
            ))
            .unwrap();

        let hits = store.endpoint_ids_like("giovanna", 10).unwrap();
        assert_eq!(hits, vec!["person:giovanna".to_string()]);
        let hits = store.endpoint_ids_like("maria", 10).unwrap();
        assert_eq!(hits, vec!["person:maria".to_string()]);
    }
}
