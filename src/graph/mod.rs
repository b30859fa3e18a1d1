// ── MindGraph: Graph Service ────────────────────────────────────────────────
// The orchestrator over the store and both normalizers:
//   - entity CRUD with automatic type inference and idempotent merge
//   - relationship CRUD from raw assertions, with an append-only event log
//   - trend/volatility analytics over that log
//   - cascading entity resolution and multi-factor disambiguation
//   - top-k search across the entity graph and the vector memories
//
// Split by concern: entities, relationships, history, resolve,
// disambiguate, search.

mod disambiguate;
mod entities;
mod history;
mod relationships;
mod resolve;
mod search;

use std::sync::Arc;

use log::info;

use crate::atoms::error::GraphResult;
use crate::atoms::results::{DecayOptions, DecayReport, GraphStats};
use crate::atoms::types::RecordStatus;
use crate::decay::GraphDecayService;
use crate::normalize::entity_type::EntityTypeNormalizer;
use crate::normalize::predicate::PredicateNormalizer;
use crate::similarity::{EmbeddingProvider, VectorSearch};
use crate::store::GraphStore;

pub struct GraphService {
    pub(crate) store: Arc<GraphStore>,
    pub(crate) predicates: Arc<PredicateNormalizer>,
    pub(crate) entity_types: Arc<EntityTypeNormalizer>,
    pub(crate) decay: GraphDecayService,
    pub(crate) embedder: Option<Arc<dyn EmbeddingProvider>>,
    pub(crate) vectors: Option<Arc<dyn VectorSearch>>,
}

impl GraphService {
    /// Both collaborators are optional: without an embedder the normalizers
    /// degrade to their rule/default paths, and without a vector store the
    /// episodic/semantic search branches report an error note.
    pub fn new(
        store: Arc<GraphStore>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        vectors: Option<Arc<dyn VectorSearch>>,
    ) -> Self {
        info!("[graph] Service initialized");
        GraphService {
            predicates: Arc::new(PredicateNormalizer::new(embedder.clone())),
            entity_types: Arc::new(EntityTypeNormalizer::new(embedder.clone())),
            decay: GraphDecayService::new(store.clone()),
            store,
            embedder,
            vectors,
        }
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    pub fn predicate_normalizer(&self) -> &Arc<PredicateNormalizer> {
        &self.predicates
    }

    pub fn entity_type_normalizer(&self) -> &Arc<EntityTypeNormalizer> {
        &self.entity_types
    }

    pub fn decay_service(&self) -> &GraphDecayService {
        &self.decay
    }

    /// Run one decay cycle with per-call overrides.
    pub fn apply_decay(&self, options: &DecayOptions) -> DecayReport {
        self.decay.apply_decay(options)
    }

    /// Engine-wide counters: row counts plus normalizer and decay stats.
    pub fn graph_stats(&self) -> GraphResult<GraphStats> {
        Ok(GraphStats {
            entities_active: self.store.count_entities(Some(RecordStatus::Active))?,
            entities_total: self.store.count_entities(None)?,
            relationships_active: self.store.count_relationships(Some(RecordStatus::Active))?,
            relationships_total: self.store.count_relationships(None)?,
            events_total: self.store.count_events()?,
            predicate_normalizer: self.predicates.stats(),
            entity_type_normalizer: self.entity_types.stats(),
            decay: self.decay.stats(),
        })
    }
}


#[cfg(test)]
mod tests {
    use crate::atoms::results::RawAssertion;
    use crate::graph::test_support::bare_service;

    #[tokio::test]
    async fn stats_count_rows_and_normalizations() {
        let svc = bare_service();
        svc.create_relationship_from_raw(&RawAssertion::new("person:marco", "amare", "food:pizza"))
            .await
            .unwrap();
        svc.create_relationship_from_raw(&RawAssertion::new("person:marco", "odiare", "food:kale"))
            .await
            .unwrap();

        let stats = svc.graph_stats().unwrap();
        assert_eq!(stats.entities_active, 3);
        assert_eq!(stats.relationships_active, 2);
        assert_eq!(stats.events_total, 2);
        assert_eq!(stats.predicate_normalizer.direct_hits, 2);
        assert_eq!(stats.decay.total_decay_runs, 0);
    }
}
