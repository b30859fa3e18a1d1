// ── MindGraph Graph: Disambiguation ─────────────────────────────────────────
// "Which Giovanna?" — score every candidate against the caller's context
// (names, known relations, attributes, free text) and either pick a clear
// winner or report the ambiguity. Expected relations that point at a
// different target than the graph records are flagged as inconsistencies,
// never silently overridden.

use log::{debug, info, warn};

use crate::atoms::error::GraphResult;
use crate::atoms::results::{
    DisambiguateOptions, DisambiguationCandidate, DisambiguationContext, DisambiguationResult,
    Inconsistency, RelationshipFilter,
};
use crate::atoms::types::{EntityType, StoredEntity};
use crate::graph::GraphService;
use crate::similarity::cosine_similarity;

// Additive score weights. Confidence is score ÷ 2, capped at 1.0.
const W_NAME_EXACT: f64 = 1.0;
const W_NAME_PARTIAL: f64 = 0.6;
const W_ALIAS_EXACT: f64 = 0.8;
const W_ALIAS_PARTIAL: f64 = 0.4;
const W_RELATED_ENTITY: f64 = 0.2;
const W_RELATION_CONFIRMED: f64 = 0.25;
const W_RELATION_TYPE_ONLY: f64 = 0.1;
const W_ATTRIBUTE_EXACT: f64 = 0.15;
const W_ATTRIBUTE_PARTIAL: f64 = 0.08;
const W_CONTEXT_MAX: f64 = 0.15;

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn contains_either(a: &str, b: &str) -> bool {
    a.contains(b) || b.contains(a)
}

impl GraphService {
    /// Score candidates whose name, id, or alias matches `name` against the
    /// caller's context. The best candidate wins only when it clears the
    /// runner-up by more than the ambiguity threshold.
    pub async fn disambiguate_entity(
        &self,
        name: &str,
        entity_type: Option<EntityType>,
        context: &DisambiguationContext,
        options: &DisambiguateOptions,
    ) -> GraphResult<DisambiguationResult> {
        let name_lower = name.to_lowercase();
        let pool = self.store.search_entities_like(&name_lower, entity_type, 0.0, 50)?;
        debug!(
            "[graph] Disambiguating '{}': {} candidates in pool",
            name,
            pool.len()
        );

        let mut candidates: Vec<DisambiguationCandidate> = Vec::new();
        for entity in pool {
            let candidate = self.score_candidate(&name_lower, entity, context).await?;
            if candidate.confidence >= options.min_confidence {
                candidates.push(candidate);
            }
        }

        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        candidates.truncate(options.max_results);

        let ambiguous = candidates.len() >= 2
            && (candidates[0].confidence - candidates[1].confidence) < options.ambiguity_threshold;
        let best_match = if !candidates.is_empty() && !ambiguous {
            Some(candidates[0].clone())
        } else {
            None
        };
        let has_inconsistencies = best_match
            .as_ref()
            .map(|b| !b.inconsistencies.is_empty())
            .unwrap_or(false);

        match &best_match {
            Some(best) => info!(
                "[graph] Disambiguated '{}' -> {} (confidence={:.3}, inconsistencies={})",
                name,
                best.entity.entity_id,
                best.confidence,
                best.inconsistencies.len()
            ),
            None => info!(
                "[graph] '{}' stays ambiguous: {} candidates",
                name,
                candidates.len()
            ),
        }

        Ok(DisambiguationResult {
            query: name.to_string(),
            best_match,
            candidates,
            ambiguous,
            has_inconsistencies,
        })
    }

    async fn score_candidate(
        &self,
        name_lower: &str,
        entity: StoredEntity,
        context: &DisambiguationContext,
    ) -> GraphResult<DisambiguationCandidate> {
        let mut score = 0.0;
        let mut match_reasons: Vec<String> = Vec::new();
        let mut inconsistencies: Vec<Inconsistency> = Vec::new();

        let primary_lower = entity.primary_name.to_lowercase();
        if primary_lower == name_lower {
            score += W_NAME_EXACT;
            match_reasons.push("exact_name".to_string());
        } else if contains_either(&primary_lower, name_lower) {
            score += W_NAME_PARTIAL;
            match_reasons.push("partial_name".to_string());
        }

        for alias in &entity.aliases {
            let alias_lower = alias.to_lowercase();
            if alias_lower == name_lower {
                score += W_ALIAS_EXACT;
                match_reasons.push(format!("alias_exact:{alias}"));
                break;
            }
            if contains_either(&alias_lower, name_lower) {
                score += W_ALIAS_PARTIAL;
                match_reasons.push(format!("alias_partial:{alias}"));
                break;
            }
        }

        for related_name in &context.related_entities {
            let related = self
                .store
                .search_entities_like(&related_name.to_lowercase(), None, 0.0, 5)?;
            let connected = related.iter().any(|r| {
                self.store
                    .active_relationship_between(&entity.entity_id, &r.entity_id)
                    .unwrap_or(false)
            });
            if connected {
                score += W_RELATED_ENTITY;
                match_reasons.push(format!("related_to:{related_name}"));
            }
        }

        for expected in &context.expected_relations {
            let filter = RelationshipFilter {
                from_entity_id: Some(entity.entity_id.clone()),
                relation_type: Some(expected.relation_type),
                ..Default::default()
            };
            let (rels, _) = self.store.list_relationships(&filter)?;
            if rels.is_empty() {
                continue;
            }

            let target_lower = expected.target_name.to_lowercase();
            let mut confirmed = false;
            let mut found_targets: Vec<String> = Vec::new();
            for rel in &rels {
                let target = self.store.get_entity(&rel.to_entity_id)?;
                let target_name = target
                    .as_ref()
                    .map(|t| t.primary_name.clone())
                    .unwrap_or_else(|| rel.to_entity_id.clone());
                let matches = rel.to_entity_id.to_lowercase() == target_lower
                    || contains_either(&target_name.to_lowercase(), &target_lower)
                    || target
                        .as_ref()
                        .map(|t| t.aliases.iter().any(|a| a.to_lowercase() == target_lower))
                        .unwrap_or(false);
                if matches {
                    confirmed = true;
                    break;
                }
                if found_targets.is_empty() {
                    found_targets.push(target_name);
                }
            }

            if confirmed {
                score += W_RELATION_CONFIRMED;
                match_reasons.push(format!(
                    "expected_relation_confirmed:{}",
                    expected.relation_type
                ));
            } else {
                // the relation type exists, but with a different target:
                // partial credit plus a contradiction flag for the caller
                score += W_RELATION_TYPE_ONLY;
                inconsistencies.push(Inconsistency {
                    relation_type: expected.relation_type,
                    expected_target: expected.target_name.clone(),
                    found_targets,
                });
            }
        }

        if let Some(expected_attrs) = context.attributes.as_object() {
            let actual = entity.attributes.as_object();
            for (key, expected_value) in expected_attrs {
                let Some(actual_value) = actual.and_then(|a| a.get(key)) else {
                    continue;
                };
                let expected_str = value_text(expected_value).to_lowercase();
                let actual_str = value_text(actual_value).to_lowercase();
                if actual_str == expected_str {
                    score += W_ATTRIBUTE_EXACT;
                    match_reasons.push(format!("attribute_exact:{key}"));
                } else if contains_either(&actual_str, &expected_str) {
                    score += W_ATTRIBUTE_PARTIAL;
                    match_reasons.push(format!("attribute_partial:{key}"));
                }
            }
        }

        if score > 0.0 {
            if let (Some(text), Some(embedder)) = (&context.context_text, &self.embedder) {
                let label = format!("{} ({})", entity.primary_name, entity.entity_type);
                match (embedder.embed(text).await, embedder.embed(&label).await) {
                    (Ok(a), Ok(b)) => {
                        let similarity = cosine_similarity(&a, &b);
                        if similarity > 0.5 {
                            let bonus = ((similarity - 0.5) * 0.3).min(W_CONTEXT_MAX);
                            score += bonus;
                            match_reasons.push(format!("context_similarity:{similarity:.2}"));
                        }
                    }
                    (Err(e), _) | (_, Err(e)) => {
                        warn!("[graph] Context embedding failed during disambiguation: {e}");
                    }
                }
            }
        }

        let confidence = round3((score / 2.0).min(1.0));
        Ok(DisambiguationCandidate {
            entity,
            score,
            confidence,
            match_reasons,
            inconsistencies,
        })
    }
}

fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
