// ── MindGraph Graph: Relationships ──────────────────────────────────────────
// Raw assertions come in as (subject, predicate, object); the predicate is
// normalized, the triple merged into the single active relationship row,
// and every assertion appended to the event log. Endpoint creation, the
// row write, and the event insert share one transaction.

use std::collections::BTreeMap;

use log::{debug, info};
use serde_json::json;
use uuid::Uuid;

use crate::atoms::error::{GraphError, GraphResult};
use crate::atoms::results::{
    AssertionOutcome, RawAssertion, RelationshipFilter, RelationshipPage, RelationshipQuery,
    RelationshipQueryResult, RelationshipUpdate, RelationshipWithTarget,
};
use crate::atoms::types::{RecordStatus, RelationshipEvent, StoredRelationship};
use crate::graph::entities::{ensure_entity_conn, merge_object};
use crate::graph::GraphService;
use crate::store::events::insert_event;
use crate::store::now_ts;
use crate::store::relationships::{
    delete_relationship_row, find_active_conn, insert_relationship, update_relationship_row,
};

/// Strength bonus each time an existing triple is re-asserted.
const REINFORCE_BOOST: f64 = 0.1;

fn new_rel_id(from: &str, to: &str) -> String {
    let nonce = Uuid::new_v4().simple().to_string();
    format!("rel:{}_to_{}_{}", from, to, &nonce[..8])
}

fn new_event_id() -> String {
    let nonce = Uuid::new_v4().simple().to_string();
    format!("evt:{}", &nonce[..12])
}

impl GraphService {
    /// Record a raw assertion. The first assertion of a (subject, category,
    /// object) triple inserts a relationship; later ones reinforce it, with
    /// the newest assertion's valence and intensity overwriting the row
    /// while the event log keeps the full history. Missing endpoints are
    /// auto-created as low-confidence placeholders.
    pub async fn create_relationship_from_raw(
        &self,
        assertion: &RawAssertion,
    ) -> GraphResult<AssertionOutcome> {
        let subject = assertion.subject_id.trim();
        let predicate = assertion.predicate.trim();
        let object = assertion.object_id.trim();
        if subject.is_empty() || predicate.is_empty() || object.is_empty() {
            return Err(GraphError::validation(
                "assertion requires a subject, a predicate, and an object",
            ));
        }

        let normalization = self.predicates.normalize(predicate).await;
        let now = now_ts();

        let mut metadata = json!({
            "valence": normalization.valence.as_str(),
            "intensity": normalization.intensity,
            "normalization_method": normalization.method.as_str(),
            "normalization_confidence": normalization.confidence,
        });
        merge_object(&mut metadata, &normalization.metadata);
        merge_object(&mut metadata, &assertion.metadata);

        let mut conn = self.store.conn.lock();
        let tx = conn.transaction()?;

        ensure_entity_conn(&tx, subject)?;
        ensure_entity_conn(&tx, object)?;

        let existing = find_active_conn(&tx, subject, object, normalization.relation_type)?;
        let (relationship, created) = match existing {
            Some(mut rel) => {
                rel.evidence_count += 1;
                rel.strength = (rel.strength + REINFORCE_BOOST).min(1.0);
                rel.valence = normalization.valence;
                rel.intensity = normalization.intensity;
                rel.original_predicate = predicate.to_string();
                if assertion.source_sentence.is_some() {
                    rel.source_sentence = assertion.source_sentence.clone();
                }
                rel.metadata = metadata;
                rel.last_reinforced = Some(now.clone());
                rel.updated_at = now.clone();
                update_relationship_row(&tx, &rel)?;
                (rel, false)
            }
            None => {
                let rel = StoredRelationship {
                    rel_id: new_rel_id(subject, object),
                    from_entity_id: subject.to_string(),
                    to_entity_id: object.to_string(),
                    relation_type: normalization.relation_type,
                    original_predicate: predicate.to_string(),
                    source_sentence: assertion.source_sentence.clone(),
                    metadata,
                    strength: 1.0,
                    confidence: normalization.confidence,
                    valence: normalization.valence,
                    intensity: normalization.intensity,
                    evidence_count: 1,
                    source: assertion.source,
                    status: RecordStatus::Active,
                    last_reinforced: None,
                    created_at: now.clone(),
                    updated_at: now.clone(),
                };
                insert_relationship(&tx, &rel)?;
                (rel, true)
            }
        };

        let event = RelationshipEvent {
            event_id: new_event_id(),
            rel_id: relationship.rel_id.clone(),
            predicate: predicate.to_string(),
            valence: normalization.valence.signed(normalization.intensity),
            intensity: normalization.intensity,
            source_sentence: assertion.source_sentence.clone(),
            timestamp: now,
            normalization_method: normalization.method,
            normalization_confidence: normalization.confidence,
            metadata: assertion.metadata.clone(),
        };
        insert_event(&tx, &event)?;
        tx.commit()?;

        if created {
            info!(
                "[graph] Relationship created: {} -{}-> {} ({})",
                subject, relationship.relation_type, object, relationship.rel_id
            );
        } else {
            info!(
                "[graph] Relationship reinforced: {} (evidence={}, strength={:.2})",
                relationship.rel_id, relationship.evidence_count, relationship.strength
            );
        }

        Ok(AssertionOutcome {
            relationship,
            event,
            created,
            normalization,
        })
    }

    pub fn get_relationship(&self, rel_id: &str) -> GraphResult<Option<StoredRelationship>> {
        self.store.get_relationship(rel_id)
    }

    /// Filtered, paginated relationship listing.
    pub fn get_relationships(&self, filter: &RelationshipFilter) -> GraphResult<RelationshipPage> {
        let (relationships, total) = self.store.list_relationships(filter)?;
        debug!(
            "[graph] Listed {} of {} relationships",
            relationships.len(),
            total
        );
        Ok(RelationshipPage {
            relationships,
            total,
            limit: filter.limit.unwrap_or(50),
            offset: filter.offset.unwrap_or(0),
        })
    }

    /// Target-joined relationship query, optionally grouped by the target
    /// entity's type ("what foods does she love?").
    pub fn query_relationships(
        &self,
        query: &RelationshipQuery,
    ) -> GraphResult<RelationshipQueryResult> {
        let relationships = self.store.query_relationships_with_target(query)?;
        let total = relationships.len();

        let groups = if query.group_by_target_type {
            let mut grouped: BTreeMap<String, Vec<RelationshipWithTarget>> = BTreeMap::new();
            for row in &relationships {
                let key = row
                    .target_type
                    .map(|t| t.as_str().to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                grouped.entry(key).or_default().push(row.clone());
            }
            Some(grouped)
        } else {
            None
        };

        Ok(RelationshipQueryResult {
            relationships,
            groups,
            total,
        })
    }

    /// Apply a whitelisted partial update. An update with no fields set is
    /// a caller bug and is rejected; a missing relationship is not.
    pub fn update_relationship(
        &self,
        rel_id: &str,
        update: &RelationshipUpdate,
    ) -> GraphResult<Option<StoredRelationship>> {
        if update.is_empty() {
            return Err(GraphError::validation("relationship update has no fields"));
        }
        let Some(mut rel) = self.store.get_relationship(rel_id)? else {
            return Ok(None);
        };

        if let Some(strength) = update.strength {
            rel.strength = strength;
        }
        if let Some(confidence) = update.confidence {
            rel.confidence = confidence;
        }
        if let Some(valence) = update.valence {
            rel.valence = valence;
        }
        if let Some(intensity) = update.intensity {
            rel.intensity = intensity;
        }
        if let Some(status) = update.status {
            rel.status = status;
        }
        if let Some(sentence) = &update.source_sentence {
            rel.source_sentence = Some(sentence.clone());
        }
        if let Some(metadata) = &update.metadata {
            merge_object(&mut rel.metadata, metadata);
        }
        rel.updated_at = now_ts();

        self.store.save_relationship(&rel)?;
        debug!("[graph] Relationship updated: {}", rel_id);
        Ok(Some(rel))
    }

    /// Soft delete marks the row `deleted` and frees the active slot for
    /// the triple; hard delete removes the row and cascades to its events.
    pub fn delete_relationship(&self, rel_id: &str, hard: bool) -> GraphResult<bool> {
        let Some(mut rel) = self.store.get_relationship(rel_id)? else {
            return Ok(false);
        };
        if hard {
            let conn = self.store.conn.lock();
            delete_relationship_row(&conn, rel_id)?;
            info!("[graph] Relationship hard-deleted: {}", rel_id);
        } else {
            rel.status = RecordStatus::Deleted;
            rel.updated_at = now_ts();
            self.store.save_relationship(&rel)?;
            info!("[graph] Relationship soft-deleted: {}", rel_id);
        }
        Ok(true)
    }

    /// Strengthen a relationship without re-asserting it. Valence and
    /// intensity are untouched; only strength, evidence, and the
    /// reinforcement timestamps move.
    pub fn reinforce_relationship(
        &self,
        rel_id: &str,
        boost: f64,
        new_sentence: Option<&str>,
    ) -> GraphResult<Option<StoredRelationship>> {
        let Some(mut rel) = self.store.get_relationship(rel_id)? else {
            return Ok(None);
        };
        rel.strength = (rel.strength + boost).min(1.0);
        rel.evidence_count += 1;
        if let Some(sentence) = new_sentence {
            rel.source_sentence = Some(sentence.to_string());
        }
        let now = now_ts();
        rel.last_reinforced = Some(now.clone());
        rel.updated_at = now;

        self.store.save_relationship(&rel)?;
        debug!(
            "[graph] Relationship reinforced manually: {} (strength={:.2})",
            rel_id, rel.strength
        );
        Ok(Some(rel))
    }
}
