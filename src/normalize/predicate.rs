// ── MindGraph Normalize: Predicate Normalizer ───────────────────────────────
// Converts raw extracted predicates ("esprimere_gradimento_per", "amare",
// "odiare"…) into normalized relation categories with valence/intensity.
//
// Pipeline, first hit wins:
//   1. Cache
//   2. Direct lookup in the known-predicate table        (confidence 0.95)
//   3. Keyword/regex partial match                       (confidence 0.70–0.85)
//   4. Embedding similarity vs category exemplars        (confidence = sim × 0.8)
//   5. Low-confidence neutral default                    (confidence 0.30)
//
// This function never fails: a broken embedding provider just means step 4
// silently falls through to the default.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;
use regex::Regex;
use serde_json::{json, Value};

use crate::atoms::results::{NormalizationResult, PredicateNormalizerStats};
use crate::atoms::types::{NormalizationMethod, RelationCategory, Valence};
use crate::similarity::{cosine_similarity, EmbeddingProvider};

// ═════════════════════════════════════════════════════════════════════════════
// Known-predicate table
// ═════════════════════════════════════════════════════════════════════════════

/// Direct hint: category, valence, intensity, extra metadata key/value pairs.
type DirectHint = (RelationCategory, Valence, f64, &'static [(&'static str, &'static str)]);

fn direct_hint(predicate: &str) -> Option<DirectHint> {
    use RelationCategory::*;
    use Valence::*;
    let hint: DirectHint = match predicate {
        // Sentiment (positive)
        "esprimere_gradimento_per" => (Sentiment, Positive, 0.7, &[]),
        "piacere" => (Sentiment, Positive, 0.6, &[]),
        "amare" => (Sentiment, Positive, 0.95, &[]),
        "adorare" => (Sentiment, Positive, 0.9, &[]),
        "preferire" => (Sentiment, Positive, 0.8, &[("aspect", "preference")]),
        "apprezzare" => (Sentiment, Positive, 0.7, &[]),
        "gradire" => (Sentiment, Positive, 0.65, &[]),
        "desiderare" => (Sentiment, Positive, 0.75, &[("aspect", "desire")]),
        "volere" => (Sentiment, Positive, 0.7, &[("aspect", "desire")]),
        "interessare" => (Sentiment, Positive, 0.6, &[("aspect", "interest")]),

        // Sentiment (negative)
        "detestare" => (Sentiment, Negative, 0.9, &[]),
        "odiare" => (Sentiment, Negative, 0.95, &[]),
        "non_sopportare" => (Sentiment, Negative, 0.85, &[]),
        "non_gradire" => (Sentiment, Negative, 0.6, &[]),
        "disprezzare" => (Sentiment, Negative, 0.8, &[]),
        "temere" => (Sentiment, Negative, 0.7, &[("aspect", "fear")]),
        "evitare" => (Sentiment, Negative, 0.6, &[("aspect", "avoidance")]),

        // Ownership
        "possedere" => (Ownership, Neutral, 0.8, &[]),
        "avere" => (Ownership, Neutral, 0.7, &[]),
        "appartenere_a" => (Ownership, Neutral, 0.7, &[("direction", "reverse")]),
        "comprare" => (Ownership, Neutral, 0.8, &[("aspect", "acquisition")]),
        "vendere" => (Ownership, Neutral, 0.8, &[("aspect", "disposal")]),

        // Employment
        "lavorare_presso" => (Employment, Neutral, 0.8, &[]),
        "lavorare_per" => (Employment, Neutral, 0.8, &[]),
        "essere_impiegato_da" => (Employment, Neutral, 0.8, &[]),
        "dirigere" => (Employment, Neutral, 0.9, &[("role", "manager")]),
        "collaborare_con" => (Employment, Neutral, 0.7, &[("aspect", "collaboration")]),

        // Location
        "abitare_in" => (Location, Neutral, 0.8, &[("type", "residence")]),
        "vivere_a" => (Location, Neutral, 0.8, &[("type", "residence")]),
        "trovarsi_a" => (Location, Neutral, 0.6, &[("type", "current")]),
        "essere_nato_a" => (Location, Neutral, 0.9, &[("type", "birth")]),
        "risiedere_a" => (Location, Neutral, 0.85, &[("type", "residence")]),

        // Family
        "essere_figlio_di" => (Family, Neutral, 0.95, &[("relation", "child")]),
        "essere_padre_di" => (Family, Neutral, 0.95, &[("relation", "father")]),
        "essere_madre_di" => (Family, Neutral, 0.95, &[("relation", "mother")]),
        "essere_fratello_di" => (Family, Neutral, 0.9, &[("relation", "sibling")]),
        "essere_sorella_di" => (Family, Neutral, 0.9, &[("relation", "sibling")]),
        "essere_coniuge_di" => (Family, Neutral, 0.95, &[("relation", "spouse")]),
        "essere_sposato_con" => (Family, Neutral, 0.95, &[("relation", "spouse")]),

        // Friendship / Social
        "conoscere" => (Friendship, Neutral, 0.5, &[]),
        "essere_amico_di" => (Friendship, Positive, 0.8, &[]),
        "frequentare" => (Friendship, Neutral, 0.6, &[]),

        // Professional
        "essere_cliente_di" => (Professional, Neutral, 0.7, &[("role", "client")]),
        "essere_fornitore_di" => (Professional, Neutral, 0.7, &[("role", "supplier")]),
        "essere_commercialista_di" => (Professional, Neutral, 0.8, &[("role", "accountant")]),
        "essere_medico_di" => (Professional, Neutral, 0.8, &[("role", "doctor")]),
        "essere_avvocato_di" => (Professional, Neutral, 0.8, &[("role", "lawyer")]),

        // Identity
        "essere" => (Identity, Neutral, 0.9, &[]),
        "chiamarsi" => (Identity, Neutral, 0.95, &[("aspect", "name")]),

        _ => return None,
    };
    Some(hint)
}

/// For unknown predicates: embedding similarity against these category
/// exemplars decides the closest category.
fn category_exemplars() -> &'static [(RelationCategory, &'static [&'static str])] {
    use RelationCategory::*;
    &[
        (Sentiment, &["piacere", "amare", "odiare", "preferire", "apprezzare", "gradire", "detestare", "adorare"]),
        (Ownership, &["possedere", "avere", "appartenere", "comprare", "vendere", "proprietà"]),
        (Employment, &["lavorare", "impiegare", "dirigere", "assumere", "licenziare", "collaborare"]),
        (Location, &["abitare", "vivere", "trovarsi", "stare", "risiedere", "nascere"]),
        (Family, &["figlio", "padre", "madre", "fratello", "sorella", "coniuge", "sposato", "parente"]),
        (Friendship, &["amico", "conoscere", "frequentare", "amicizia"]),
        (Professional, &["cliente", "fornitore", "commercialista", "medico", "avvocato", "consulente"]),
        (Identity, &["essere", "chiamarsi", "nome", "identità"]),
    ]
}

/// Negation markers that flip an embedding-matched sentiment to negative.
const NEGATION_MARKERS: [&str; 4] = ["non", "odio", "detest", "disprezz"];

// ═════════════════════════════════════════════════════════════════════════════
// Partial-match rule groups
// ═════════════════════════════════════════════════════════════════════════════

struct PartialRule {
    regex: Regex,
    intensity: f64,
    /// Substring veto: the rule is skipped when the predicate contains this
    /// ("avere" is ownership, "avere_come_amico" is not).
    unless: Option<&'static str>,
}

struct PartialGroup {
    category: RelationCategory,
    valence: Valence,
    confidence: f64,
    rules: Vec<PartialRule>,
}

fn build_partial_groups() -> Vec<PartialGroup> {
    use RelationCategory::*;

    fn group(
        category: RelationCategory,
        valence: Valence,
        confidence: f64,
        patterns: &[(&'static str, f64, Option<&'static str>)],
    ) -> PartialGroup {
        PartialGroup {
            category,
            valence,
            confidence,
            rules: patterns
                .iter()
                .map(|(pattern, intensity, unless)| PartialRule {
                    // Patterns are static and known-valid.
                    regex: Regex::new(pattern).expect("invalid partial-match pattern"),
                    intensity: *intensity,
                    unless: *unless,
                })
                .collect(),
        }
    }

    vec![
        group(Sentiment, Valence::Positive, 0.8, &[
            (r"(piacere|piace)", 0.7, None),
            (r"(amare|amo|ama)", 0.95, None),
            (r"(adorare|adoro|adora)", 0.9, None),
            (r"(preferire|preferisco|preferisce)", 0.8, None),
            (r"(preferit[oa])", 0.8, None),
            (r"(colore_preferito|cibo_preferito|piatto_preferito)", 0.85, None),
            (r"(dichiarare.*preferit)", 0.8, None),
            (r"(apprezzare|apprezzo|apprezza)", 0.7, None),
            (r"(gradire|gradisco|gradisce)", 0.65, None),
            (r"(gradimento)", 0.7, None),
            (r"(volere|voglio|vuole)", 0.7, None),
            (r"(desiderare|desidero|desidera)", 0.75, None),
            (r"(favorit[oa])", 0.8, None),
        ]),
        group(Sentiment, Valence::Negative, 0.8, &[
            (r"(odiare|odio|odia)", 0.95, None),
            (r"(detestare|detesto|detesta)", 0.9, None),
            (r"(disprezzare|disprezzo|disprezza)", 0.8, None),
            (r"(non_sopportare|non_sopporto)", 0.85, None),
            (r"(temere|temo|teme)", 0.7, None),
            (r"(evitare|evito|evita)", 0.6, None),
        ]),
        group(Ownership, Valence::Neutral, 0.75, &[
            (r"(possedere|possiedo|possiede)", 0.8, None),
            // "avere", but not "avere come amico"
            (r"(avere|ho|ha)", 0.7, Some("amico")),
            (r"(comprare|compro|compra)", 0.8, None),
            (r"(acquistare|acquisto|acquista)", 0.8, None),
        ]),
        group(Location, Valence::Neutral, 0.75, &[
            (r"(abitare|abito|abita)", 0.8, None),
            (r"(vivere|vivo|vive)_(?:a|in)", 0.8, None),
            (r"(trovarsi|mi_trovo|si_trova)", 0.6, None),
            (r"(risiedere|risiedo|risiede)", 0.85, None),
            (r"(nato_a|nascere)", 0.9, None),
        ]),
        group(Employment, Valence::Neutral, 0.75, &[
            (r"(lavorare|lavoro|lavora)", 0.8, None),
            (r"(impiegare|impiego|impiega)", 0.8, None),
            (r"(dirigere|dirigo|dirige)", 0.9, None),
            (r"(collaborare|collaboro|collabora)", 0.7, None),
        ]),
        group(Family, Valence::Neutral, 0.85, &[
            (r"(figlio|figlia)", 0.95, None),
            (r"(padre|papà)", 0.95, None),
            (r"(madre|mamma)", 0.95, None),
            (r"(fratello|sorella)", 0.9, None),
            (r"(coniuge|sposato|sposata|marito|moglie)", 0.95, None),
            (r"(nonno|nonna|zio|zia|cugino|cugina)", 0.85, None),
        ]),
        group(Professional, Valence::Neutral, 0.75, &[
            (r"(cliente)", 0.7, None),
            (r"(fornitore)", 0.7, None),
            (r"(commercialista|contabile)", 0.8, None),
            (r"(medico|dottore)", 0.8, None),
            (r"(avvocato|legale)", 0.8, None),
            (r"(consulente)", 0.75, None),
        ]),
        group(Friendship, Valence::Neutral, 0.7, &[
            (r"(amico|amica|amicizia)", 0.8, None),
            (r"(conoscere|conosco|conosce)", 0.5, None),
            (r"(frequentare|frequento|frequenta)", 0.6, None),
        ]),
    ]
}

// ═════════════════════════════════════════════════════════════════════════════
// Normalizer
// ═════════════════════════════════════════════════════════════════════════════

/// Normalizes raw predicates into semantic relation categories.
///
/// Constructed explicitly (no global instance); the embedding provider is
/// optional — without one, step 4 is skipped and unknown predicates fall
/// through to the default.
pub struct PredicateNormalizer {
    provider: Option<Arc<dyn EmbeddingProvider>>,
    groups: Vec<PartialGroup>,
    cache: Mutex<HashMap<String, NormalizationResult>>,
    /// Per-category exemplar embeddings, computed once on first use.
    category_embeddings: Mutex<Option<HashMap<RelationCategory, Vec<f32>>>>,
    stats: Mutex<PredicateNormalizerStats>,
}

impl PredicateNormalizer {
    pub fn new(provider: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        PredicateNormalizer {
            provider,
            groups: build_partial_groups(),
            cache: Mutex::new(HashMap::new()),
            category_embeddings: Mutex::new(None),
            stats: Mutex::new(PredicateNormalizerStats::default()),
        }
    }

    /// Normalize a raw predicate. Infallible: every input produces a result,
    /// degrading to an unknown/neutral default when nothing matches.
    pub async fn normalize(&self, predicate: &str) -> NormalizationResult {
        let cleaned = predicate.to_lowercase().trim().replace(' ', "_");

        if let Some(hit) = self.cache.lock().get(&cleaned) {
            self.stats.lock().cache_hits += 1;
            return hit.clone();
        }

        // 1. Direct lookup
        if let Some((category, valence, intensity, extras)) = direct_hint(&cleaned) {
            let mut metadata = serde_json::Map::new();
            for (key, value) in extras {
                metadata.insert(key.to_string(), json!(value));
            }
            let result = NormalizationResult {
                relation_type: category,
                valence,
                intensity,
                metadata: Value::Object(metadata),
                method: NormalizationMethod::Direct,
                confidence: 0.95,
            };
            self.stats.lock().direct_hits += 1;
            self.cache.lock().insert(cleaned, result.clone());
            return result;
        }

        // 2. Partial match
        if let Some(result) = self.try_partial_match(&cleaned) {
            self.stats.lock().partial_hits += 1;
            self.cache.lock().insert(cleaned, result.clone());
            return result;
        }

        // 3. Embedding similarity
        if let Some(result) = self.try_embedding_similarity(&cleaned).await {
            self.stats.lock().embedding_hits += 1;
            self.cache.lock().insert(cleaned, result.clone());
            return result;
        }

        // 4. Default
        let result = NormalizationResult {
            relation_type: RelationCategory::Unknown,
            valence: Valence::Neutral,
            intensity: 0.5,
            metadata: json!({ "original": predicate }),
            method: NormalizationMethod::Default,
            confidence: 0.3,
        };
        self.stats.lock().defaults += 1;
        self.cache.lock().insert(cleaned, result.clone());
        result
    }

    fn try_partial_match(&self, predicate: &str) -> Option<NormalizationResult> {
        for group in &self.groups {
            for rule in &group.rules {
                if rule.unless.is_some_and(|veto| predicate.contains(veto)) {
                    continue;
                }
                if rule.regex.is_match(predicate) {
                    return Some(NormalizationResult {
                        relation_type: group.category,
                        valence: group.valence,
                        intensity: rule.intensity,
                        metadata: json!({ "matched_pattern": rule.regex.as_str() }),
                        method: NormalizationMethod::Partial,
                        confidence: group.confidence,
                    });
                }
            }
        }
        None
    }

    async fn try_embedding_similarity(&self, predicate: &str) -> Option<NormalizationResult> {
        let provider = self.provider.as_ref()?;

        if let Err(e) = self.ensure_category_embeddings(provider.as_ref()).await {
            warn!("[normalize] Category embeddings unavailable: {}", e);
            return None;
        }

        // Underscores back to spaces for a better embedding.
        let predicate_text = predicate.replace('_', " ");
        let predicate_embedding = match provider.embed(&predicate_text).await {
            Ok(v) => v,
            Err(e) => {
                warn!("[normalize] Embedding failed for '{}': {}", predicate, e);
                return None;
            }
        };

        let embeddings = self.category_embeddings.lock();
        let embeddings = embeddings.as_ref()?;

        let mut best: Option<(RelationCategory, f64)> = None;
        for (category, category_embedding) in embeddings.iter() {
            let sim = cosine_similarity(&predicate_embedding, category_embedding);
            if best.map_or(true, |(_, s)| sim > s) {
                best = Some((*category, sim));
            }
        }
        let (best_category, best_similarity) = best?;

        if best_similarity < 0.3 {
            return None;
        }

        // Valence from negation keywords; sentiment defaults to positive.
        let valence = if best_category == RelationCategory::Sentiment {
            if NEGATION_MARKERS.iter().any(|m| predicate.contains(m)) {
                Valence::Negative
            } else {
                Valence::Positive
            }
        } else {
            Valence::Neutral
        };

        debug!(
            "[normalize] Embedding match '{}' → {} (sim {:.3})",
            predicate, best_category, best_similarity
        );

        Some(NormalizationResult {
            relation_type: best_category,
            valence,
            // Cap at 0.9: embedding matches never claim direct-hit certainty.
            intensity: best_similarity.min(0.9),
            metadata: json!({ "similarity": (best_similarity * 1000.0).round() / 1000.0 }),
            method: NormalizationMethod::Embedding,
            confidence: best_similarity * 0.8,
        })
    }

    /// Compute per-category exemplar embeddings once. Each category embeds
    /// its exemplars joined into one phrase.
    async fn ensure_category_embeddings(
        &self,
        provider: &dyn EmbeddingProvider,
    ) -> crate::GraphResult<()> {
        if self.category_embeddings.lock().is_some() {
            return Ok(());
        }
        let mut computed = HashMap::new();
        for (category, exemplars) in category_exemplars() {
            let text = exemplars.join(" ");
            let embedding = provider.embed(&text).await?;
            computed.insert(*category, embedding);
        }
        debug!("[normalize] Computed embeddings for {} categories", computed.len());
        *self.category_embeddings.lock() = Some(computed);
        Ok(())
    }

    pub fn stats(&self) -> PredicateNormalizerStats {
        let mut stats = self.stats.lock().clone();
        stats.cache_size = self.cache.lock().len();
        stats
    }

    /// Drop the result cache and the precomputed category embeddings.
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
        *self.category_embeddings.lock() = None;
        debug!("[normalize] Predicate cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::fixtures::FixtureEmbedder;

    fn bare() -> PredicateNormalizer {
        PredicateNormalizer::new(None)
    }

    #[tokio::test]
    async fn direct_hit_odiare() {
        let n = bare();
        let r = n.normalize("odiare").await;
        assert_eq!(r.relation_type, RelationCategory::Sentiment);
        assert_eq!(r.valence, Valence::Negative);
        assert!((r.intensity - 0.95).abs() < 1e-9);
        assert_eq!(r.method, NormalizationMethod::Direct);
        assert!((r.confidence - 0.95).abs() < 1e-9);
    }

    #[tokio::test]
    async fn direct_hit_lavorare_presso() {
        let n = bare();
        let r = n.normalize("lavorare_presso").await;
        assert_eq!(r.relation_type, RelationCategory::Employment);
        assert_eq!(r.valence, Valence::Neutral);
        assert!((r.intensity - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn cleaning_maps_spaces_and_case() {
        let n = bare();
        let r = n.normalize("  Lavorare Presso ").await;
        assert_eq!(r.relation_type, RelationCategory::Employment);
        assert_eq!(r.method, NormalizationMethod::Direct);
    }

    #[tokio::test]
    async fn direct_hits_carry_extra_metadata() {
        let n = bare();
        let r = n.normalize("essere_madre_di").await;
        assert_eq!(r.relation_type, RelationCategory::Family);
        assert_eq!(r.metadata["relation"], "mother");
    }

    #[tokio::test]
    async fn partial_match_compound_predicate() {
        let n = bare();
        let r = n.normalize("dichiarare_colore_preferito").await;
        assert_eq!(r.relation_type, RelationCategory::Sentiment);
        assert_eq!(r.valence, Valence::Positive);
        assert_eq!(r.method, NormalizationMethod::Partial);
        assert!((r.confidence - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn partial_match_negative_keyword() {
        let n = bare();
        let r = n.normalize("odia_profondamente").await;
        assert_eq!(r.relation_type, RelationCategory::Sentiment);
        assert_eq!(r.valence, Valence::Negative);
        assert!((r.intensity - 0.95).abs() < 1e-9);
    }

    #[tokio::test]
    async fn avere_come_amico_is_friendship_not_ownership() {
        let n = bare();
        // "avere" alone is ownership…
        let r = n.normalize("avere").await;
        assert_eq!(r.relation_type, RelationCategory::Ownership);
        // …but positive sentiment patterns run first and "amico" wins over
        // the ownership group for friend-ish compounds.
        let r = n.normalize("avere_come_amico").await;
        assert_ne!(r.relation_type, RelationCategory::Ownership);
    }

    #[tokio::test]
    async fn unknown_without_provider_gets_default() {
        let n = bare();
        let r = n.normalize("fotosintetizzare").await;
        assert_eq!(r.relation_type, RelationCategory::Unknown);
        assert_eq!(r.valence, Valence::Neutral);
        assert!((r.intensity - 0.5).abs() < 1e-9);
        assert_eq!(r.method, NormalizationMethod::Default);
        assert!((r.confidence - 0.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn cache_serves_repeat_lookups() {
        let n = bare();
        n.normalize("odiare").await;
        n.normalize("odiare").await;
        n.normalize("ODIARE").await;
        let stats = n.stats();
        assert_eq!(stats.direct_hits, 1);
        assert_eq!(stats.cache_hits, 2);
        assert_eq!(stats.cache_size, 1);

        n.clear_cache();
        assert_eq!(n.stats().cache_size, 0);
    }

    #[tokio::test]
    async fn embedding_fallback_picks_closest_category() {
        // Exemplar phrase for sentiment contains "amare"; the unknown
        // predicate maps onto the same axis.
        let embedder = Arc::new(
            FixtureEmbedder::new()
                .with("amare", vec![1.0, 0.0, 0.0, 0.0])
                .with("venerare", vec![1.0, 0.0, 0.0, 0.0]),
        );
        let n = PredicateNormalizer::new(Some(embedder));
        let r = n.normalize("venerare").await;
        assert_eq!(r.relation_type, RelationCategory::Sentiment);
        assert_eq!(r.valence, Valence::Positive);
        assert_eq!(r.method, NormalizationMethod::Embedding);
        // sim 1.0 → intensity capped at 0.9, confidence 0.8
        assert!((r.intensity - 0.9).abs() < 1e-9);
        assert!((r.confidence - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn embedding_negation_marker_flips_valence() {
        let embedder = Arc::new(
            FixtureEmbedder::new()
                .with("amare", vec![1.0, 0.0, 0.0, 0.0])
                .with("detestabile", vec![1.0, 0.0, 0.0, 0.0]),
        );
        let n = PredicateNormalizer::new(Some(embedder));
        // contains "detest" → negative even though similarity matched sentiment
        let r = n.normalize("considerare_detestabile").await;
        assert_eq!(r.relation_type, RelationCategory::Sentiment);
        assert_eq!(r.valence, Valence::Negative);
    }

    #[tokio::test]
    async fn provider_failure_degrades_to_default() {
        let n = PredicateNormalizer::new(Some(Arc::new(FixtureEmbedder::failing())));
        let r = n.normalize("fotosintetizzare").await;
        assert_eq!(r.relation_type, RelationCategory::Unknown);
        assert_eq!(r.method, NormalizationMethod::Default);
    }

    #[tokio::test]
    async fn low_similarity_falls_through_to_default() {
        // Zero fallback vector: cosine against every category is 0.0.
        let mut embedder = FixtureEmbedder::new().with("amare", vec![1.0, 0.0, 0.0, 0.0]);
        embedder.fallback = vec![0.0; 4];
        let embedder = Arc::new(embedder);
        let n = PredicateNormalizer::new(Some(embedder));
        let r = n.normalize("zxqwky").await;
        assert_eq!(r.relation_type, RelationCategory::Unknown);
        assert_eq!(r.method, NormalizationMethod::Default);
    }
}
