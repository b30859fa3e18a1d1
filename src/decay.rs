// ── MindGraph: Graph Decay Service ──────────────────────────────────────────
// Ages the graph: entities lose confidence and relationships lose strength
// after a period of inactivity, and whatever falls below threshold is
// garbage-collected. Curated rows (user_declared/system source, or tagged
// "protected") never decay.
//
// A run is three sequential passes: entity decay, relationship decay,
// orphan removal. Each pass reads its candidates, then writes under the
// same lock; per-row failures are collected into the report and never
// abort the rest of the run.

use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;
use rusqlite::params;

use crate::atoms::error::GraphResult;
use crate::atoms::results::{DecayConfig, DecayOptions, DecayReport, DecayStats};
use crate::store::entities::{entity_from_row, ENTITY_COLS};
use crate::store::relationships::{relationship_from_row, REL_COLS};
use crate::store::{days_since, now_ts, GraphStore};

pub struct GraphDecayService {
    store: Arc<GraphStore>,
    config: Mutex<DecayConfig>,
    stats: Mutex<DecayStats>,
}

impl GraphDecayService {
    pub fn new(store: Arc<GraphStore>) -> Self {
        info!("[decay] Service initialized");
        GraphDecayService {
            store,
            config: Mutex::new(DecayConfig::default()),
            stats: Mutex::new(DecayStats::default()),
        }
    }

    /// Persistently apply the `Some` fields of `options` to the configuration.
    pub fn update_config(&self, options: &DecayOptions) {
        let mut config = self.config.lock();
        apply_overrides(&mut config, options);
        info!(
            "[decay] Config updated: rate={} interval={}d thresholds={}/{} orphan={}d",
            config.decay_rate,
            config.decay_interval_days,
            config.min_confidence_threshold,
            config.min_strength_threshold,
            config.orphan_removal_days
        );
    }

    pub fn config(&self) -> DecayConfig {
        self.config.lock().clone()
    }

    /// Cumulative counters across all runs since construction.
    pub fn stats(&self) -> DecayStats {
        self.stats.lock().clone()
    }

    /// Run one full decay cycle. `options` overrides the configuration for
    /// this run only. Never fails: pass-level and row-level errors end up
    /// in the report's `errors`.
    pub fn apply_decay(&self, options: &DecayOptions) -> DecayReport {
        info!("[decay] Starting decay run");
        let mut config = self.config.lock().clone();
        apply_overrides(&mut config, options);

        let mut report = DecayReport {
            timestamp: now_ts(),
            ..DecayReport::default()
        };

        if let Err(e) = self.decay_entities(&config, &mut report) {
            warn!("[decay] Entity pass failed: {}", e);
            report.errors.push(format!("entity decay error: {e}"));
        }
        if let Err(e) = self.decay_relationships(&config, &mut report) {
            warn!("[decay] Relationship pass failed: {}", e);
            report.errors.push(format!("relationship decay error: {e}"));
        }
        if let Err(e) = self.remove_orphans(&config, &mut report) {
            warn!("[decay] Orphan pass failed: {}", e);
            report.errors.push(format!("orphan removal error: {e}"));
        }

        let mut stats = self.stats.lock();
        stats.total_decay_runs += 1;
        stats.entities_decayed += report.entities_decayed as u64;
        stats.entities_removed += report.entities_removed as u64;
        stats.relationships_decayed += report.relationships_decayed as u64;
        stats.relationships_removed += report.relationships_removed as u64;
        stats.orphans_removed += report.orphans_removed as u64;
        stats.last_decay_run = Some(report.timestamp.clone());

        info!(
            "[decay] Completed: {} entities decayed, {} removed, {} relationships decayed, {} removed, {} orphans removed",
            report.entities_decayed,
            report.entities_removed,
            report.relationships_decayed,
            report.relationships_removed,
            report.orphans_removed
        );
        report
    }

    fn decay_entities(&self, config: &DecayConfig, report: &mut DecayReport) -> GraphResult<()> {
        let now = chrono::Utc::now();
        let now_str = now_ts();
        let interval = config.decay_interval_days as f64;

        let conn = self.store.conn.lock();
        let sql = format!("SELECT {ENTITY_COLS} FROM entities WHERE status = 'active'");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], entity_from_row)?;
        let mut entities = Vec::new();
        for row in rows {
            entities.push(row?);
        }
        drop(stmt);
        report.entities_processed = entities.len();

        for entity in entities {
            let days_inactive = days_since(&entity.updated_at, &now);
            if days_inactive < interval {
                continue;
            }
            if entity.source.is_protected() || entity.tags.iter().any(|t| t == "protected") {
                continue;
            }

            let multiplier = (days_inactive / interval).min(3.0);
            let new_confidence = entity.confidence * (1.0 - config.decay_rate * multiplier);

            let outcome = if new_confidence < config.min_confidence_threshold {
                debug!(
                    "[decay] Removing entity {} (confidence {:.3})",
                    entity.entity_id, new_confidence
                );
                conn.execute(
                    "DELETE FROM entities WHERE entity_id = ?1",
                    params![entity.entity_id],
                )
                .map(|_| report.entities_removed += 1)
            } else {
                debug!(
                    "[decay] Entity {} confidence {:.3} -> {:.3}",
                    entity.entity_id, entity.confidence, new_confidence
                );
                conn.execute(
                    "UPDATE entities SET confidence = ?1, updated_at = ?2 WHERE entity_id = ?3",
                    params![new_confidence, now_str, entity.entity_id],
                )
                .map(|_| report.entities_decayed += 1)
            };
            if let Err(e) = outcome {
                report
                    .errors
                    .push(format!("entity {}: {}", entity.entity_id, e));
            }
        }
        Ok(())
    }

    fn decay_relationships(
        &self,
        config: &DecayConfig,
        report: &mut DecayReport,
    ) -> GraphResult<()> {
        let now = chrono::Utc::now();
        let now_str = now_ts();
        let interval = config.decay_interval_days as f64;

        let conn = self.store.conn.lock();
        let sql = format!("SELECT {REL_COLS} FROM relationships WHERE status = 'active'");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], relationship_from_row)?;
        let mut relationships = Vec::new();
        for row in rows {
            relationships.push(row?);
        }
        drop(stmt);
        report.relationships_processed = relationships.len();

        for rel in relationships {
            let days_inactive = days_since(&rel.updated_at, &now);
            if days_inactive < interval {
                continue;
            }
            if rel.source.is_protected() {
                continue;
            }

            let multiplier = (days_inactive / interval).min(3.0);
            let new_strength = rel.strength * (1.0 - config.decay_rate * multiplier);

            let outcome = if new_strength < config.min_strength_threshold {
                debug!("[decay] Removing relationship {}", rel.rel_id);
                conn.execute(
                    "DELETE FROM relationships WHERE rel_id = ?1",
                    params![rel.rel_id],
                )
                .map(|_| report.relationships_removed += 1)
            } else {
                debug!(
                    "[decay] Relationship {} strength {:.3} -> {:.3}",
                    rel.rel_id, rel.strength, new_strength
                );
                conn.execute(
                    "UPDATE relationships SET strength = ?1, updated_at = ?2 WHERE rel_id = ?3",
                    params![new_strength, now_str, rel.rel_id],
                )
                .map(|_| report.relationships_decayed += 1)
            };
            if let Err(e) = outcome {
                report.errors.push(format!("relationship {}: {}", rel.rel_id, e));
            }
        }
        Ok(())
    }

    /// Entities with no relationship in either direction, unprotected, and
    /// untouched for longer than `orphan_removal_days`. The existence check
    /// ignores relationship status: a soft-deleted edge still anchors its
    /// endpoints.
    fn remove_orphans(&self, config: &DecayConfig, report: &mut DecayReport) -> GraphResult<()> {
        let now = chrono::Utc::now();

        let conn = self.store.conn.lock();
        let sql = format!(
            "SELECT {ENTITY_COLS} FROM entities e
             WHERE e.status = 'active'
               AND NOT EXISTS (
                   SELECT 1 FROM relationships r
                   WHERE r.from_entity_id = e.entity_id
                      OR r.to_entity_id = e.entity_id
               )"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], entity_from_row)?;
        let mut orphans = Vec::new();
        for row in rows {
            orphans.push(row?);
        }
        drop(stmt);

        for orphan in orphans {
            if days_since(&orphan.updated_at, &now) < config.orphan_removal_days as f64 {
                continue;
            }
            if orphan.source.is_protected() || orphan.tags.iter().any(|t| t == "protected") {
                continue;
            }
            debug!("[decay] Removing orphan entity {}", orphan.entity_id);
            match conn.execute(
                "DELETE FROM entities WHERE entity_id = ?1",
                params![orphan.entity_id],
            ) {
                Ok(_) => report.orphans_removed += 1,
                Err(e) => report
                    .errors
                    .push(format!("orphan {}: {}", orphan.entity_id, e)),
            }
        }
        Ok(())
    }
}

fn apply_overrides(config: &mut DecayConfig, options: &DecayOptions) {
    if let Some(v) = options.decay_rate {
        config.decay_rate = v;
    }
    if let Some(v) = options.decay_interval_days {
        config.decay_interval_days = v;
    }
    if let Some(v) = options.min_confidence_threshold {
        config.min_confidence_threshold = v;
    }
    if let Some(v) = options.min_strength_threshold {
        config.min_strength_threshold = v;
    }
    if let Some(v) = options.orphan_removal_days {
        config.orphan_removal_days = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::{
        EntityType, RecordSource, RecordStatus, RelationCategory, StoredEntity,
        StoredRelationship, Valence,
    };
    use serde_json::Value;

    fn ts_days_ago(days: i64) -> String {
        (chrono::Utc::now() - chrono::Duration::days(days))
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string()
    }

    fn entity(id: &str, confidence: f64, age_days: i64, source: RecordSource) -> StoredEntity {
        StoredEntity {
            entity_id: id.to_string(),
            entity_type: EntityType::Person,
            primary_name: id.to_string(),
            aliases: vec![],
            identifiers: Value::Null,
            attributes: Value::Null,
            tags: vec![],
            salience: 0.5,
            confidence,
            source,
            status: RecordStatus::Active,
            created_at: ts_days_ago(age_days),
            updated_at: ts_days_ago(age_days),
        }
    }

    fn relationship(id: &str, strength: f64, age_days: i64) -> StoredRelationship {
        StoredRelationship {
            rel_id: id.to_string(),
            from_entity_id: "person:a".to_string(),
            to_entity_id: "person:b".to_string(),
            relation_type: RelationCategory::Friendship,
            original_predicate: "conoscere".to_string(),
            source_sentence: None,
            metadata: Value::Null,
            strength,
            confidence: 0.9,
            valence: Valence::Neutral,
            intensity: 0.5,
            evidence_count: 1,
            source: RecordSource::Extraction,
            status: RecordStatus::Active,
            last_reinforced: None,
            created_at: ts_days_ago(age_days),
            updated_at: ts_days_ago(age_days),
        }
    }

    fn service() -> GraphDecayService {
        GraphDecayService::new(Arc::new(GraphStore::open_in_memory().unwrap()))
    }

    #[test]
    fn stale_entity_loses_confidence() {
        let svc = service();
        // 120 days idle with a 30-day interval: multiplier capped at 3.0,
        // factor 0.15, 0.9 -> 0.765.
        svc.store
            .put_entity(&entity("person:old", 0.9, 120, RecordSource::Extraction))
            .unwrap();
        let report = svc.apply_decay(&DecayOptions::default());

        assert_eq!(report.entities_decayed, 1);
        assert_eq!(report.entities_removed, 0);
        let decayed = svc.store.get_entity("person:old").unwrap().unwrap();
        assert!((decayed.confidence - 0.765).abs() < 1e-9);
        // decay touches updated_at, so a second immediate run is a no-op
        let second = svc.apply_decay(&DecayOptions::default());
        assert_eq!(second.entities_decayed, 0);
    }

    #[test]
    fn fresh_entity_is_untouched() {
        let svc = service();
        svc.store
            .put_entity(&entity("person:new", 0.9, 1, RecordSource::Extraction))
            .unwrap();
        let report = svc.apply_decay(&DecayOptions::default());
        assert_eq!(report.entities_processed, 1);
        assert_eq!(report.entities_decayed, 0);
        let e = svc.store.get_entity("person:new").unwrap().unwrap();
        assert!((e.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn entity_below_threshold_is_removed() {
        let svc = service();
        svc.store
            .put_entity(&entity("person:weak", 0.22, 120, RecordSource::Extraction))
            .unwrap();
        let report = svc.apply_decay(&DecayOptions::default());
        assert_eq!(report.entities_removed, 1);
        assert!(svc.store.get_entity("person:weak").unwrap().is_none());
    }

    #[test]
    fn protected_sources_and_tags_never_decay() {
        let svc = service();
        svc.store
            .put_entity(&entity("person:declared", 0.9, 400, RecordSource::UserDeclared))
            .unwrap();
        let mut tagged = entity("person:tagged", 0.9, 400, RecordSource::Extraction);
        tagged.tags = vec!["protected".to_string()];
        svc.store.put_entity(&tagged).unwrap();

        let report = svc.apply_decay(&DecayOptions::default());
        assert_eq!(report.entities_decayed, 0);
        assert_eq!(report.entities_removed, 0);
        assert_eq!(report.orphans_removed, 0);
    }

    #[test]
    fn stale_relationship_decays_and_weak_one_is_removed() {
        let svc = service();
        svc.store
            .insert_relationship(&relationship("rel:strong", 1.0, 120))
            .unwrap();
        let mut weak = relationship("rel:weak", 0.21, 120);
        weak.to_entity_id = "person:c".to_string();
        svc.store.insert_relationship(&weak).unwrap();

        let report = svc.apply_decay(&DecayOptions::default());
        assert_eq!(report.relationships_decayed, 1);
        assert_eq!(report.relationships_removed, 1);
        let strong = svc.store.get_relationship("rel:strong").unwrap().unwrap();
        assert!((strong.strength - 0.85).abs() < 1e-9);
        assert!(svc.store.get_relationship("rel:weak").unwrap().is_none());
    }

    #[test]
    fn old_orphan_is_removed_but_connected_entity_survives() {
        let svc = service();
        svc.store
            .put_entity(&entity("person:a", 0.9, 1, RecordSource::Extraction))
            .unwrap();
        svc.store
            .put_entity(&entity("person:b", 0.9, 1, RecordSource::Extraction))
            .unwrap();
        svc.store
            .insert_relationship(&relationship("rel:ab", 1.0, 1))
            .unwrap();
        svc.store
            .put_entity(&entity("person:alone", 0.9, 200, RecordSource::Extraction))
            .unwrap();

        // a long interval keeps the decay pass off the 200-day-old entity;
        // decaying it would touch updated_at and hide it from the orphan scan
        let report = svc.apply_decay(&DecayOptions {
            decay_interval_days: Some(365),
            ..DecayOptions::default()
        });
        assert_eq!(report.entities_decayed, 0);
        assert_eq!(report.orphans_removed, 1);
        assert!(svc.store.get_entity("person:alone").unwrap().is_none());
        assert!(svc.store.get_entity("person:a").unwrap().is_some());
    }

    #[test]
    fn decaying_an_entity_resets_its_orphan_clock() {
        let svc = service();
        svc.store
            .put_entity(&entity("person:alone", 0.9, 200, RecordSource::Extraction))
            .unwrap();

        // the decay pass runs first, persists 0.9 → 0.765 and bumps
        // updated_at, so the same cycle's orphan scan must skip the row
        let report = svc.apply_decay(&DecayOptions::default());
        assert_eq!(report.entities_decayed, 1);
        assert_eq!(report.orphans_removed, 0);
        let alone = svc.store.get_entity("person:alone").unwrap().unwrap();
        assert!((alone.confidence - 0.765).abs() < 1e-9);
    }

    #[test]
    fn per_run_overrides_do_not_stick() {
        let svc = service();
        svc.store
            .put_entity(&entity("person:x", 0.9, 10, RecordSource::Extraction))
            .unwrap();

        // 5-day interval override makes a 10-day-old entity decay
        let report = svc.apply_decay(&DecayOptions {
            decay_interval_days: Some(5),
            ..DecayOptions::default()
        });
        assert_eq!(report.entities_decayed, 1);
        assert_eq!(svc.config().decay_interval_days, 30);
    }

    #[test]
    fn update_config_persists() {
        let svc = service();
        svc.update_config(&DecayOptions {
            decay_rate: Some(0.1),
            ..DecayOptions::default()
        });
        assert!((svc.config().decay_rate - 0.1).abs() < 1e-12);
    }

    #[test]
    fn stats_accumulate_across_runs() {
        let svc = service();
        svc.store
            .put_entity(&entity("person:old", 0.9, 120, RecordSource::Extraction))
            .unwrap();
        svc.apply_decay(&DecayOptions::default());
        svc.apply_decay(&DecayOptions::default());

        let stats = svc.stats();
        assert_eq!(stats.total_decay_runs, 2);
        assert_eq!(stats.entities_decayed, 1);
        assert!(stats.last_decay_run.is_some());
    }
}
