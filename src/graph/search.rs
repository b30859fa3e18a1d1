// ── MindGraph Graph: Top-K Search ───────────────────────────────────────────
// One query fanned out across the four memory sources: episodic and
// semantic vectors, the entity table, and the relationship table. Each
// branch ranks and filters independently and failures stay inside their
// branch, so one dead backend never empties the whole answer.

use log::{debug, warn};
use serde_json::json;

use crate::atoms::results::{SearchBranch, SearchHit, SearchSource, UnifiedSearchResult};
use crate::graph::GraphService;
use crate::similarity::VectorTier;

impl GraphService {
    async fn topk_vector(
        &self,
        tier: VectorTier,
        source: SearchSource,
        query: &str,
        k: usize,
        min_similarity: f64,
    ) -> SearchBranch {
        let Some(vectors) = &self.vectors else {
            return SearchBranch::failed("vector store not configured");
        };
        // over-fetch so the similarity floor doesn't starve the branch
        match vectors.query(tier, query, k * 2).await {
            Ok(hits) => {
                let mut results: Vec<SearchHit> = hits
                    .into_iter()
                    .filter_map(|hit| {
                        let similarity = (1.0 - hit.distance).max(0.0);
                        (similarity >= min_similarity).then(|| SearchHit {
                            content: hit.content,
                            similarity,
                            source,
                            metadata: hit.metadata,
                        })
                    })
                    .collect();
                results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
                results.truncate(k);
                SearchBranch { results, error: None }
            }
            Err(e) => {
                warn!("[graph] {} search failed: {}", tier.as_str(), e);
                SearchBranch::failed(e.to_string())
            }
        }
    }

    /// Top-k over raw conversation memories.
    pub async fn topk_episodic(&self, query: &str, k: usize, min_similarity: f64) -> SearchBranch {
        self.topk_vector(VectorTier::Episodic, SearchSource::Episodic, query, k, min_similarity)
            .await
    }

    /// Top-k over consolidated knowledge.
    pub async fn topk_semantic(&self, query: &str, k: usize, min_similarity: f64) -> SearchBranch {
        self.topk_vector(VectorTier::Semantic, SearchSource::Semantic, query, k, min_similarity)
            .await
    }

    /// Top-k over the entity table, ranked by match quality × confidence.
    pub fn topk_entities(&self, query: &str, k: usize, min_similarity: f64) -> SearchBranch {
        match self.store.score_entities(query, k * 2) {
            Ok(scored) => {
                let results = scored
                    .into_iter()
                    .filter(|(_, similarity)| *similarity >= min_similarity)
                    .take(k)
                    .map(|(entity, similarity)| SearchHit {
                        content: entity.primary_name.clone(),
                        similarity,
                        source: SearchSource::Entities,
                        metadata: json!({
                            "entity_id": entity.entity_id,
                            "entity_type": entity.entity_type.as_str(),
                        }),
                    })
                    .collect();
                SearchBranch { results, error: None }
            }
            Err(e) => {
                warn!("[graph] Entity search failed: {e}");
                SearchBranch::failed(e.to_string())
            }
        }
    }

    /// Top-k over relationships; the hit content is the source sentence
    /// when one was recorded, otherwise a rendered triple.
    pub fn topk_relationships(&self, query: &str, k: usize, min_similarity: f64) -> SearchBranch {
        match self.store.score_relationships(query, k * 2) {
            Ok(scored) => {
                let results = scored
                    .into_iter()
                    .filter(|(_, similarity)| *similarity >= min_similarity)
                    .take(k)
                    .map(|(rel, similarity)| {
                        let content = rel.source_sentence.clone().unwrap_or_else(|| {
                            format!(
                                "{} {} {}",
                                rel.from_entity_id, rel.original_predicate, rel.to_entity_id
                            )
                        });
                        SearchHit {
                            content,
                            similarity,
                            source: SearchSource::Relationships,
                            metadata: json!({
                                "rel_id": rel.rel_id,
                                "relation_type": rel.relation_type.as_str(),
                                "valence": rel.valence.as_str(),
                            }),
                        }
                    })
                    .collect();
                SearchBranch { results, error: None }
            }
            Err(e) => {
                warn!("[graph] Relationship search failed: {e}");
                SearchBranch::failed(e.to_string())
            }
        }
    }

    /// Search all four memory sources concurrently. Each branch returns up
    /// to `k_per_memory` hits above `min_similarity`; failed branches carry
    /// their error note and contribute nothing to the total.
    pub async fn topk_unified(
        &self,
        query: &str,
        k_per_memory: usize,
        min_similarity: f64,
    ) -> UnifiedSearchResult {
        let (episodic, semantic, entities, relationships) = tokio::join!(
            self.topk_episodic(query, k_per_memory, min_similarity),
            self.topk_semantic(query, k_per_memory, min_similarity),
            async { self.topk_entities(query, k_per_memory, min_similarity) },
            async { self.topk_relationships(query, k_per_memory, min_similarity) },
        );

        let total_results = episodic.results.len()
            + semantic.results.len()
            + entities.results.len()
            + relationships.results.len();
        debug!("[graph] Unified search '{}': {} hits", query, total_results);

        UnifiedSearchResult {
            query: query.to_string(),
            episodic,
            semantic,
            entities,
            relationships,
            total_results,
        }
    }
}
