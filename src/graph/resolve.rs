// ── MindGraph Graph: Entity Resolution ──────────────────────────────────────
// Cascading resolution of a free-text mention: entity table first, then
// relationship endpoints, then the episodic and semantic vector memories.
// A vector layer failing is a degraded answer, never a failed resolution.

use log::{debug, info, warn};

use crate::atoms::error::GraphResult;
use crate::atoms::results::{
    ResolutionCandidate, ResolutionResult, ResolutionSource, ResolveOptions, SuggestedAction,
};
use crate::atoms::types::EntityType;
use crate::graph::GraphService;
use crate::similarity::VectorTier;

/// A candidate at or above this confidence resolves the query outright.
const RESOLVE_THRESHOLD: f64 = 0.8;
/// How many candidates an unresolved answer carries.
const MAX_CANDIDATES: usize = 5;

fn snippet(content: &str) -> String {
    content.chars().take(150).collect()
}

impl GraphService {
    /// Resolve "who is Marco?" against the memory stack. An exact name hit
    /// in the entity graph or among relationship endpoints short-circuits;
    /// otherwise evidence from every layer is ranked and either the top
    /// candidate wins or the caller is told to disambiguate.
    pub async fn resolve_entity(
        &self,
        name: &str,
        entity_type: Option<EntityType>,
        context_hint: Option<&str>,
        options: &ResolveOptions,
    ) -> GraphResult<ResolutionResult> {
        let name_lower = name.to_lowercase();
        let mut candidates: Vec<ResolutionCandidate> = Vec::new();

        // Layer 1: the entity graph itself.
        let search = self.search_entities(name, entity_type, options.min_confidence, 5)?;
        if let Some(exact) = search.exact_match {
            info!(
                "[graph] Resolved '{}' via entity graph: {}",
                name, exact.entity_id
            );
            return Ok(ResolutionResult {
                query: name.to_string(),
                resolved: true,
                entity_id: Some(exact.entity_id),
                name: Some(exact.primary_name),
                confidence: exact.confidence,
                source: Some(ResolutionSource::EntityGraph),
                candidates: Vec::new(),
                suggested_action: None,
            });
        }
        for entity in search.matches {
            candidates.push(ResolutionCandidate {
                entity_id: Some(entity.entity_id),
                name: entity.primary_name,
                confidence: entity.confidence,
                source: ResolutionSource::EntityGraph,
                detail: None,
            });
        }

        // Layer 2: entities that only exist as relationship endpoints.
        if options.include_relationships {
            for endpoint_id in self.store.endpoint_ids_like(&name_lower, 5)? {
                if candidates
                    .iter()
                    .any(|c| c.entity_id.as_deref() == Some(endpoint_id.as_str()))
                {
                    continue;
                }
                let Some(entity) = self.store.get_entity(&endpoint_id)? else {
                    continue;
                };
                if entity.primary_name.to_lowercase() == name_lower {
                    info!(
                        "[graph] Resolved '{}' via relationship endpoint: {}",
                        name, entity.entity_id
                    );
                    return Ok(ResolutionResult {
                        query: name.to_string(),
                        resolved: true,
                        entity_id: Some(entity.entity_id),
                        name: Some(entity.primary_name),
                        confidence: entity.confidence,
                        source: Some(ResolutionSource::Relationships),
                        candidates: Vec::new(),
                        suggested_action: None,
                    });
                }
                candidates.push(ResolutionCandidate {
                    entity_id: Some(entity.entity_id.clone()),
                    name: entity.primary_name,
                    // endpoint evidence is weaker than a direct table hit
                    confidence: entity.confidence * 0.9,
                    source: ResolutionSource::Relationships,
                    detail: Some(format!("endpoint of stored relationships ({})", entity.entity_id)),
                });
            }
        }

        // Layers 3 and 4: unstructured vector memories.
        if let Some(vectors) = &self.vectors {
            let query = match context_hint {
                Some(hint) => format!("{name} {hint}"),
                None => name.to_string(),
            };
            let tiers = [
                (options.include_episodic, VectorTier::Episodic, ResolutionSource::Episodic),
                (options.include_semantic, VectorTier::Semantic, ResolutionSource::Semantic),
            ];
            for (enabled, tier, source) in tiers {
                if !enabled {
                    continue;
                }
                match vectors.query(tier, &query, 5).await {
                    Ok(hits) => {
                        for hit in hits.into_iter().take(3) {
                            let similarity = 1.0 - hit.distance;
                            if similarity < options.min_confidence
                                || !hit.content.to_lowercase().contains(&name_lower)
                            {
                                continue;
                            }
                            candidates.push(ResolutionCandidate {
                                entity_id: None,
                                name: name.to_string(),
                                confidence: similarity,
                                source,
                                detail: Some(snippet(&hit.content)),
                            });
                        }
                    }
                    Err(e) => {
                        warn!("[graph] {} lookup failed during resolution: {}", tier.as_str(), e);
                    }
                }
            }
        }

        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        if let Some(top) = candidates.first() {
            if top.confidence >= RESOLVE_THRESHOLD {
                let top = top.clone();
                let rest: Vec<_> = candidates.into_iter().skip(1).take(MAX_CANDIDATES - 1).collect();
                info!(
                    "[graph] Resolved '{}' via {:?} at {:.2}",
                    name, top.source, top.confidence
                );
                return Ok(ResolutionResult {
                    query: name.to_string(),
                    resolved: true,
                    entity_id: top.entity_id.clone(),
                    name: Some(top.name.clone()),
                    confidence: top.confidence,
                    source: Some(top.source),
                    candidates: rest,
                    suggested_action: None,
                });
            }
        }

        candidates.truncate(MAX_CANDIDATES);
        let confidence = candidates.first().map(|c| c.confidence).unwrap_or(0.0);
        let suggested_action = if candidates.is_empty() {
            Some(SuggestedAction::AskUser)
        } else {
            Some(SuggestedAction::ChooseFromCandidates)
        };
        debug!(
            "[graph] '{}' unresolved: {} candidates, best {:.2}",
            name,
            candidates.len(),
            confidence
        );
        Ok(ResolutionResult {
            query: name.to_string(),
            resolved: false,
            entity_id: None,
            name: None,
            confidence,
            source: None,
            candidates,
            suggested_action,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::results::{NewEntity, RawAssertion};
    use crate::graph::test_support::{bare_service, service_with_vectors};
    use crate::similarity::fixtures::FixtureVectorStore;
    use crate::similarity::VectorHit;
    use serde_json::Value;

    fn hit(content: &str, distance: f64) -> VectorHit {
        VectorHit {
            content: content.to_string(),
            metadata: Value::Null,
            distance,
        }
    }

    #[tokio::test]
    async fn exact_entity_match_resolves_immediately() {
        let svc = bare_service();
        svc.create_entity(NewEntity::typed("Marco", EntityType::Person))
            .await
            .unwrap();

        let result = svc
            .resolve_entity("Marco", None, None, &ResolveOptions::default())
            .await
            .unwrap();
        assert!(result.resolved);
        assert_eq!(result.entity_id.as_deref(), Some("person:marco"));
        assert_eq!(result.source, Some(ResolutionSource::EntityGraph));
        assert!(result.candidates.is_empty());
    }

    #[tokio::test]
    async fn relationship_endpoints_are_consulted() {
        let svc = bare_service();
        // endpoint entities are auto-created with primary_name == id,
        // so "person:chiara" matches the fragment but not the name exactly
        svc.create_relationship_from_raw(&RawAssertion::new(
            "person:chiara",
            "amare",
            "food:pizza",
        ))
        .await
        .unwrap();

        let result = svc
            .resolve_entity("chiara", None, None, &ResolveOptions::default())
            .await
            .unwrap();
        // auto-created endpoints carry confidence 0.7, below the resolve bar
        assert!(!result.resolved);
        assert!(result
            .candidates
            .iter()
            .any(|c| c.entity_id.as_deref() == Some("person:chiara")));
        assert_eq!(
            result.suggested_action,
            Some(SuggestedAction::ChooseFromCandidates)
        );
    }

    #[tokio::test]
    async fn strong_memory_evidence_resolves() {
        let mut vectors = FixtureVectorStore::new();
        vectors.episodic = vec![hit("Ieri Chiara mi ha parlato del suo gatto", 0.1)];
        let svc = service_with_vectors(vectors);

        let result = svc
            .resolve_entity("Chiara", None, Some("gatto"), &ResolveOptions::default())
            .await
            .unwrap();
        assert!(result.resolved);
        assert_eq!(result.source, Some(ResolutionSource::Episodic));
        assert!(result.entity_id.is_none());
        assert!((result.confidence - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn memory_hits_without_the_name_are_ignored() {
        let mut vectors = FixtureVectorStore::new();
        vectors.semantic = vec![hit("una nota che non la nomina affatto", 0.05)];
        let svc = service_with_vectors(vectors);

        let result = svc
            .resolve_entity("Chiara", None, None, &ResolveOptions::default())
            .await
            .unwrap();
        assert!(!result.resolved);
        assert!(result.candidates.is_empty());
        assert_eq!(result.suggested_action, Some(SuggestedAction::AskUser));
    }

    #[tokio::test]
    async fn vector_outage_degrades_instead_of_failing() {
        let mut vectors = FixtureVectorStore::new();
        vectors.fail = true;
        let svc = service_with_vectors(vectors);
        let request = NewEntity {
            confidence: 0.6,
            ..NewEntity::typed("Marco Polo", EntityType::Person)
        };
        svc.create_entity(request).await.unwrap();

        let result = svc
            .resolve_entity("Marco", None, None, &ResolveOptions::default())
            .await
            .unwrap();
        // the graph candidate still comes back despite the vector outage
        assert!(!result.resolved);
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.candidates[0].source, ResolutionSource::EntityGraph);
    }

    #[tokio::test]
    async fn nothing_anywhere_asks_the_user() {
        let svc = bare_service();
        let result = svc
            .resolve_entity("Sconosciuto", None, None, &ResolveOptions::default())
            .await
            .unwrap();
        assert!(!result.resolved);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.suggested_action, Some(SuggestedAction::AskUser));
    }
}
