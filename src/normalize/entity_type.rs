// ── MindGraph Normalize: Entity Type Inference ──────────────────────────────
// Infers what kind of thing an entity is (person, organization, location…)
// with embedding similarity as the primary signal and lightweight name
// rules as a confidence boost, never as the deciding factor.
//
// 1. Embed "{name} - {context}" and compare against the mean exemplar
//    embedding of every type.
// 2. If rules agree with the embedding winner (known first name, legal
//    suffix, address prefix), boost confidence by up to 0.15, capped 0.98.
// 3. Below 0.35 similarity the answer is Unknown with method `fallback`;
//    a broken provider yields Unknown at confidence 0.2.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;
use regex::Regex;

use crate::atoms::results::{EntityTypeNormalizerStats, EntityTypeResult, TypeScore};
use crate::atoms::types::{EntityType, TypeInferenceMethod};
use crate::similarity::{cosine_similarity, mean_embedding, EmbeddingProvider};

// ═════════════════════════════════════════════════════════════════════════════
// Type exemplars
// ═════════════════════════════════════════════════════════════════════════════

/// Representative phrases defining each type's "concept". The per-type
/// embedding is the element-wise mean over its exemplars.
fn default_exemplars() -> Vec<(EntityType, Vec<String>)> {
    use EntityType::*;
    let table: &[(EntityType, &[&str])] = &[
        (Person, &[
            "Marco Rossi", "Maria Bianchi", "Giuseppe Verdi", "Anna Ferrari",
            "Fabrizio", "Giulia", "Alessandro", "Francesca",
            "il dottore", "mia moglie", "il cliente", "un amico",
            "la professoressa", "il collega", "mio padre", "sua sorella",
            "il paziente", "l'avvocato", "lo studente", "la segretaria",
            "una persona di nome", "qualcuno chiamato", "un uomo", "una donna",
        ]),
        (Organization, &[
            "Google", "Microsoft", "Apple", "Amazon", "Meta", "Netflix",
            "Fiat", "Ferrari", "Eni", "Enel", "Telecom Italia", "Intesa Sanpaolo",
            "Unicredit", "Generali", "Poste Italiane", "Alitalia",
            "l'azienda", "la società", "il gruppo", "la ditta",
            "una startup", "la multinazionale", "l'impresa", "la compagnia",
            "Banca X", "Assicurazione Y", "S.p.A.", "S.r.l.",
            "Università di Milano", "Ospedale San Raffaele", "Comune di Roma",
        ]),
        (Location, &[
            "Roma", "Milano", "Napoli", "Torino", "Firenze", "Venezia",
            "New York", "Londra", "Parigi", "Tokyo",
            "Via Garibaldi 15", "Piazza del Duomo", "Corso Vittorio Emanuele",
            "Via Roma", "Viale della Repubblica",
            "l'ufficio", "casa mia", "il ristorante", "l'aeroporto",
            "la stazione", "il negozio", "l'hotel", "il centro commerciale",
            "un luogo chiamato", "il posto dove", "la sede di",
        ]),
        (Object, &[
            "la mia auto", "la BMW", "la moto", "la bici",
            "il portatile", "l'iPhone", "il computer", "lo smartphone", "il tablet",
            "la borsa", "l'orologio", "il documento", "la valigia",
            "il libro", "la chiave", "il portafoglio",
            "un oggetto", "una cosa", "il mio", "la mia",
        ]),
        (Event, &[
            "la riunione di domani", "il matrimonio di Luca", "la conferenza",
            "il meeting", "l'appuntamento delle 15", "la festa di compleanno",
            "un evento", "l'incontro", "la presentazione", "il corso",
            "la lezione", "il concerto", "la partita", "il viaggio",
        ]),
        (Food, &[
            "pizza margherita", "pasta al pomodoro", "lasagne", "risotto",
            "tiramisù", "carbonara", "amatriciana", "parmigiana",
            "caffè espresso", "vino rosso", "birra", "cappuccino",
            "un piatto di", "qualcosa da mangiare", "cibo", "il pranzo",
            "la cena", "la colazione", "uno spuntino",
        ]),
        (Time, &[
            "domani", "ieri", "la prossima settimana", "il mese scorso",
            "lunedì", "alle 15:00", "nel 2025", "questa mattina",
            "un momento", "il periodo", "la data", "l'ora",
            "quando", "il giorno in cui",
        ]),
        (Concept, &[
            "l'idea di", "il concetto di", "la teoria", "il principio",
            "la strategia", "il metodo", "l'approccio", "la filosofia",
            "un progetto", "un piano", "un obiettivo", "un problema",
            "una soluzione", "una decisione",
        ]),
        (Tool, &[
            "lo strumento", "il tool", "l'applicazione", "il software",
            "la funzione", "il comando", "l'API", "il servizio",
        ]),
    ];
    table
        .iter()
        .map(|(t, xs)| (*t, xs.iter().map(|s| s.to_string()).collect()))
        .collect()
}

// ═════════════════════════════════════════════════════════════════════════════
// Rule validators — boost only, never decisive
// ═════════════════════════════════════════════════════════════════════════════

const ORGANIZATION_PATTERNS: [&str; 3] = [
    r"(?i)^.*\s+(s\.?p\.?a\.?|s\.?r\.?l\.?|s\.?n\.?c\.?|s\.?a\.?s\.?)$",
    r"(?i)^.*\s+(inc\.?|corp\.?|ltd\.?|llc\.?|gmbh\.?)$",
    r"(?i)^(università|politecnico|istituto|ospedale|banca|banco)\s+",
];

const LOCATION_PATTERNS: [&str; 2] = [
    r"(?i)^(via|viale|piazza|corso|largo|vicolo)\s+",
    r"(?i)^(strada|contrada|località)\s+",
];

const PERSON_PATTERNS: [&str; 2] = [
    r"(?i)^(dott\.?|dr\.?|prof\.?|ing\.?|avv\.?|sig\.?)\s+",
    r"(?i)^(signor|signora|mister|mr\.?|mrs\.?)\s+",
];

/// Common Italian first names, used to boost a Person classification.
const ITALIAN_FIRST_NAMES: [&str; 35] = [
    "marco", "luca", "giuseppe", "giovanni", "francesco", "andrea", "alessandro",
    "stefano", "matteo", "lorenzo", "roberto", "riccardo", "fabio", "fabrizio",
    "paolo", "massimo", "davide", "simone", "antonio", "mario", "pietro",
    "maria", "giulia", "francesca", "anna", "sara", "laura", "valentina",
    "chiara", "federica", "elena", "alessandra", "silvia", "martina", "elisa",
];

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        // Patterns are static and known-valid.
        .map(|p| Regex::new(p).unwrap())
        .collect()
}

/// Truncate on a character boundary, not a byte offset.
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// Normalizer
// ═════════════════════════════════════════════════════════════════════════════

pub struct EntityTypeNormalizer {
    provider: Option<Arc<dyn EmbeddingProvider>>,
    use_rule_boost: bool,
    exemplars: Mutex<Vec<(EntityType, Vec<String>)>>,
    /// Mean exemplar embedding per type, computed lazily on first use and
    /// invalidated by `add_exemplars`.
    type_embeddings: Mutex<Option<Vec<(EntityType, Vec<f32>)>>>,
    cache: Mutex<HashMap<String, EntityTypeResult>>,
    org_patterns: Vec<Regex>,
    loc_patterns: Vec<Regex>,
    person_patterns: Vec<Regex>,
    stats: Mutex<EntityTypeNormalizerStats>,
}

impl EntityTypeNormalizer {
    pub fn new(provider: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        Self::with_rule_boost(provider, true)
    }

    pub fn with_rule_boost(
        provider: Option<Arc<dyn EmbeddingProvider>>,
        use_rule_boost: bool,
    ) -> Self {
        info!("[normalize] EntityTypeNormalizer initialized (embedding-first)");
        EntityTypeNormalizer {
            provider,
            use_rule_boost,
            exemplars: Mutex::new(default_exemplars()),
            type_embeddings: Mutex::new(None),
            cache: Mutex::new(HashMap::new()),
            org_patterns: compile_all(&ORGANIZATION_PATTERNS),
            loc_patterns: compile_all(&LOCATION_PATTERNS),
            person_patterns: compile_all(&PERSON_PATTERNS),
            stats: Mutex::new(EntityTypeNormalizerStats::default()),
        }
    }

    /// Classify an entity's type from its name and optional surrounding
    /// context. This never fails: provider problems degrade to Unknown.
    pub async fn infer_type(&self, entity_name: &str, context: &str) -> EntityTypeResult {
        let cache_key = format!(
            "{}|{}",
            entity_name.to_lowercase(),
            truncate_chars(context, 100)
        );
        if let Some(hit) = self.cache.lock().get(&cache_key) {
            self.stats.lock().cache_hits += 1;
            return hit.clone();
        }

        let mut signals: Vec<String> = Vec::new();

        let similarities = match self.score_all_types(entity_name, context).await {
            Ok(scores) => scores,
            Err(e) => {
                warn!("[normalize] Type inference failed for '{}': {}", entity_name, e);
                self.stats.lock().fallbacks += 1;
                return EntityTypeResult {
                    entity_type: EntityType::Unknown,
                    confidence: 0.2,
                    method: TypeInferenceMethod::ErrorFallback,
                    signals: vec![format!("error:{}", truncate_chars(&e.to_string(), 50))],
                    alternative_types: Vec::new(),
                    embedding_scores: Vec::new(),
                };
            }
        };

        // Sorted descending; ties keep exemplar-table order.
        let mut sorted = similarities.clone();
        sorted.sort_by(|a, b| b.score.total_cmp(&a.score));
        let best = sorted[0].clone();
        signals.push(format!(
            "embedding_top:{}={:.3}",
            best.entity_type, best.score
        ));

        let mut confidence = best.score;
        let mut method = TypeInferenceMethod::Embedding;
        if self.use_rule_boost {
            let boost = self.rule_boost(entity_name, best.entity_type);
            if boost > 0.0 {
                confidence = (confidence + boost).min(0.98);
                method = TypeInferenceMethod::EmbeddingWithRules;
                signals.push(format!("rule_boost:+{boost:.2}"));
                self.stats.lock().rule_boosts += 1;
            }
        }

        let result = if confidence < 0.35 {
            signals.push("low_confidence_fallback".to_string());
            self.stats.lock().fallbacks += 1;
            EntityTypeResult {
                entity_type: EntityType::Unknown,
                confidence,
                method: TypeInferenceMethod::Fallback,
                signals,
                alternative_types: sorted.iter().take(3).cloned().collect(),
                embedding_scores: sorted,
            }
        } else {
            self.stats.lock().embedding_inferences += 1;
            EntityTypeResult {
                entity_type: best.entity_type,
                confidence: (confidence * 1000.0).round() / 1000.0,
                method,
                signals,
                alternative_types: sorted
                    .iter()
                    .skip(1)
                    .take(3)
                    .filter(|t| t.score >= 0.25)
                    .cloned()
                    .collect(),
                embedding_scores: sorted,
            }
        };

        self.cache.lock().insert(cache_key, result.clone());
        result
    }

    /// Placeholder for local-LLM classification; logs and defers to the
    /// embedding path until a client exists.
    pub async fn infer_type_with_llm(
        &self,
        entity_name: &str,
        context: &str,
    ) -> EntityTypeResult {
        warn!("[normalize] LLM type inference not available, using embeddings");
        self.infer_type(entity_name, context).await
    }

    /// Extend a type's exemplar set; the cached type embeddings are
    /// recomputed on the next inference.
    pub fn add_exemplars(&self, entity_type: EntityType, new_exemplars: Vec<String>) {
        let count = new_exemplars.len();
        let mut exemplars = self.exemplars.lock();
        match exemplars.iter_mut().find(|(t, _)| *t == entity_type) {
            Some((_, xs)) => xs.extend(new_exemplars),
            None => exemplars.push((entity_type, new_exemplars)),
        }
        *self.type_embeddings.lock() = None;
        info!(
            "[normalize] Added {} exemplars for {}, type embeddings invalidated",
            count, entity_type
        );
    }

    pub fn stats(&self) -> EntityTypeNormalizerStats {
        let mut stats = self.stats.lock().clone();
        stats.total_inferences =
            stats.embedding_inferences + stats.fallbacks + stats.cache_hits;
        stats.cache_size = self.cache.lock().len();
        stats.types_loaded = self
            .type_embeddings
            .lock()
            .as_ref()
            .map_or(0, |t| t.len());
        stats
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
        info!("[normalize] Entity type cache cleared");
    }

    async fn score_all_types(
        &self,
        entity_name: &str,
        context: &str,
    ) -> crate::atoms::error::GraphResult<Vec<TypeScore>> {
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| crate::atoms::error::GraphError::dependency(
                "embedding",
                "no embedding provider configured",
            ))?;

        self.ensure_type_embeddings(provider.as_ref()).await?;

        let query = if context.is_empty() {
            entity_name.to_string()
        } else {
            format!("{} - {}", entity_name, truncate_chars(context, 150))
        };
        let query_embedding = provider.embed(&query).await?;

        let embeddings = self.type_embeddings.lock();
        let scores = embeddings
            .as_ref()
            .map(|types| {
                types
                    .iter()
                    .map(|(t, emb)| TypeScore {
                        entity_type: *t,
                        score: cosine_similarity(&query_embedding, emb),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(scores)
    }

    /// Compute the mean exemplar embedding per type. The embedding calls
    /// run without any lock held; the result is stored in one shot.
    async fn ensure_type_embeddings(
        &self,
        provider: &dyn EmbeddingProvider,
    ) -> crate::atoms::error::GraphResult<()> {
        if self.type_embeddings.lock().is_some() {
            return Ok(());
        }
        let exemplars = self.exemplars.lock().clone();

        debug!("[normalize] Pre-computing type embeddings from exemplars");
        let mut computed = Vec::with_capacity(exemplars.len());
        for (entity_type, texts) in &exemplars {
            let mut vectors = Vec::with_capacity(texts.len());
            for text in texts {
                vectors.push(provider.embed(text).await?);
            }
            computed.push((*entity_type, mean_embedding(&vectors)));
        }
        debug!("[normalize] Type embeddings ready ({} types)", computed.len());

        *self.type_embeddings.lock() = Some(computed);
        Ok(())
    }

    /// Up-to-0.15 confidence boost when name rules agree with the type
    /// the embedding already picked.
    fn rule_boost(&self, entity_name: &str, suggested: EntityType) -> f64 {
        let name_lower = entity_name.to_lowercase();
        let name_lower = name_lower.trim();
        let mut boost: f64 = 0.0;

        match suggested {
            EntityType::Person => {
                if name_lower
                    .split_whitespace()
                    .any(|part| ITALIAN_FIRST_NAMES.contains(&part))
                {
                    boost += 0.1;
                }
                if self.person_patterns.iter().any(|p| p.is_match(entity_name)) {
                    boost += 0.05;
                }
            }
            EntityType::Organization => {
                if self.org_patterns.iter().any(|p| p.is_match(entity_name)) {
                    boost += 0.1;
                }
            }
            EntityType::Location => {
                if self.loc_patterns.iter().any(|p| p.is_match(entity_name)) {
                    boost += 0.1;
                }
            }
            _ => {}
        }

        boost.min(0.15)
    }
}
