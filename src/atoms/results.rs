// ── MindGraph Atoms: Operation Inputs & Results ─────────────────────────────
// Typed request/response structs for every engine operation. The service
// layer never returns loose JSON maps: each operation has a named result.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::atoms::types::{
    EntityType, NormalizationMethod, RecordSource, RecordStatus, RelationCategory,
    RelationshipEvent, StoredEntity, StoredRelationship, TypeInferenceMethod, Valence,
};

// ═════════════════════════════════════════════════════════════════════════════
// Normalization
// ═════════════════════════════════════════════════════════════════════════════

/// Result of normalizing a raw predicate into a relation category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizationResult {
    pub relation_type: RelationCategory,
    pub valence: Valence,
    /// 0.0–1.0.
    pub intensity: f64,
    /// Extra hint metadata (aspect, role, relation, matched pattern, …).
    pub metadata: Value,
    pub method: NormalizationMethod,
    pub confidence: f64,
}

/// Predicate normalizer counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredicateNormalizerStats {
    pub direct_hits: u64,
    pub partial_hits: u64,
    pub embedding_hits: u64,
    pub defaults: u64,
    pub cache_hits: u64,
    pub cache_size: usize,
}

/// One (type, similarity) pair from entity-type classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeScore {
    pub entity_type: EntityType,
    pub score: f64,
}

/// Result of classifying an entity's type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityTypeResult {
    pub entity_type: EntityType,
    pub confidence: f64,
    pub method: TypeInferenceMethod,
    /// Human-readable signals behind the decision
    /// ("embedding_top:person=0.812", "rule_boost:+0.10", …).
    pub signals: Vec<String>,
    /// Runner-up types with meaningful scores.
    pub alternative_types: Vec<TypeScore>,
    /// Full per-type similarity map, sorted descending. For debugging.
    pub embedding_scores: Vec<TypeScore>,
}

/// Entity-type normalizer counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityTypeNormalizerStats {
    pub embedding_inferences: u64,
    pub rule_boosts: u64,
    pub cache_hits: u64,
    pub fallbacks: u64,
    pub llm_inferences: u64,
    pub total_inferences: u64,
    pub cache_size: usize,
    pub types_loaded: usize,
}

// ═════════════════════════════════════════════════════════════════════════════
// Decay
// ═════════════════════════════════════════════════════════════════════════════

/// Decay tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayConfig {
    /// Base fraction removed per cycle (0.05 = 5%).
    pub decay_rate: f64,
    /// Days of inactivity before decay applies.
    pub decay_interval_days: i64,
    /// Entities below this confidence are removed.
    pub min_confidence_threshold: f64,
    /// Relationships below this strength are removed.
    pub min_strength_threshold: f64,
    /// Orphan entities older than this are removed.
    pub orphan_removal_days: i64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        DecayConfig {
            decay_rate: 0.05,
            decay_interval_days: 30,
            min_confidence_threshold: 0.2,
            min_strength_threshold: 0.2,
            orphan_removal_days: 90,
        }
    }
}

/// Per-call overrides for a single decay run. `None` keeps the configured value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecayOptions {
    pub decay_rate: Option<f64>,
    pub decay_interval_days: Option<i64>,
    pub min_confidence_threshold: Option<f64>,
    pub min_strength_threshold: Option<f64>,
    pub orphan_removal_days: Option<i64>,
}

/// Outcome of one decay run. Per-row failures are collected in `errors`,
/// never aborting the run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecayReport {
    pub entities_processed: usize,
    pub entities_decayed: usize,
    pub entities_removed: usize,
    pub relationships_processed: usize,
    pub relationships_decayed: usize,
    pub relationships_removed: usize,
    pub orphans_removed: usize,
    pub errors: Vec<String>,
    pub timestamp: String,
}

/// Cumulative decay statistics across runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecayStats {
    pub total_decay_runs: u64,
    pub entities_decayed: u64,
    pub entities_removed: u64,
    pub relationships_decayed: u64,
    pub relationships_removed: u64,
    pub orphans_removed: u64,
    pub last_decay_run: Option<String>,
}

// ═════════════════════════════════════════════════════════════════════════════
// Relationship operations
// ═════════════════════════════════════════════════════════════════════════════

/// A raw subject–predicate–object assertion, before normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAssertion {
    pub subject_id: String,
    pub predicate: String,
    pub object_id: String,
    #[serde(default)]
    pub source_sentence: Option<String>,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub source: RecordSource,
}

impl RawAssertion {
    pub fn new(
        subject_id: impl Into<String>,
        predicate: impl Into<String>,
        object_id: impl Into<String>,
    ) -> Self {
        RawAssertion {
            subject_id: subject_id.into(),
            predicate: predicate.into(),
            object_id: object_id.into(),
            source_sentence: None,
            metadata: Value::Null,
            source: RecordSource::Extraction,
        }
    }

    pub fn with_sentence(mut self, sentence: impl Into<String>) -> Self {
        self.source_sentence = Some(sentence.into());
        self
    }
}

/// Outcome of recording an assertion: either a fresh relationship or a
/// reinforcement of the existing active triple. The appended event is
/// returned alongside the current row state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionOutcome {
    pub relationship: StoredRelationship,
    pub event: RelationshipEvent,
    /// True if a new relationship row was inserted, false if reinforced.
    pub created: bool,
    pub normalization: NormalizationResult,
}

/// Filters for listing relationships. All fields combine with AND.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationshipFilter {
    pub from_entity_id: Option<String>,
    pub to_entity_id: Option<String>,
    pub relation_type: Option<RelationCategory>,
    pub valence: Option<Valence>,
    pub min_confidence: Option<f64>,
    pub min_strength: Option<f64>,
    /// Defaults to `active` when unset.
    pub status: Option<RecordStatus>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// One page of relationships plus the unpaginated total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipPage {
    pub relationships: Vec<StoredRelationship>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// A relationship joined with its target entity's type and name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipWithTarget {
    pub relationship: StoredRelationship,
    pub target_type: Option<EntityType>,
    pub target_name: Option<String>,
}

/// Query options for the target-joined view.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationshipQuery {
    pub from_entity_id: Option<String>,
    pub relation_type: Option<RelationCategory>,
    pub valence: Option<Valence>,
    pub target_type: Option<EntityType>,
    /// When true, results are additionally grouped by target type.
    pub group_by_target_type: bool,
    pub limit: Option<usize>,
}

/// Result of the target-joined query. `groups` is populated only when
/// grouping was requested; keys are entity-type strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipQueryResult {
    pub relationships: Vec<RelationshipWithTarget>,
    pub groups: Option<std::collections::BTreeMap<String, Vec<RelationshipWithTarget>>>,
    pub total: usize,
}

/// Whitelisted relationship field updates. Fields left `None` are untouched;
/// `metadata` deep-merges into the stored map instead of replacing it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationshipUpdate {
    pub strength: Option<f64>,
    pub confidence: Option<f64>,
    pub valence: Option<Valence>,
    pub intensity: Option<f64>,
    pub status: Option<RecordStatus>,
    pub source_sentence: Option<String>,
    pub metadata: Option<Value>,
}

impl RelationshipUpdate {
    pub fn is_empty(&self) -> bool {
        self.strength.is_none()
            && self.confidence.is_none()
            && self.valence.is_none()
            && self.intensity.is_none()
            && self.status.is_none()
            && self.source_sentence.is_none()
            && self.metadata.is_none()
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// History analytics
// ═════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Worsening,
    Stable,
    Volatile,
    /// No events recorded.
    Unknown,
}

/// Short-window trend over the most recent events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendReport {
    pub rel_id: String,
    pub direction: TrendDirection,
    /// newest valence − oldest valence within the window.
    pub change: f64,
    pub current_valence: Option<f64>,
    pub oldest_valence: Option<f64>,
    pub events_considered: usize,
    pub window: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityLevel {
    Stable,
    Fluctuating,
    HighlyUnstable,
    /// Fewer than two events.
    InsufficientData,
}

/// Full-history volatility of a relationship's signed valence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolatilityReport {
    pub rel_id: String,
    pub level: VolatilityLevel,
    /// stddev + 0.3 × sign-change ratio, capped at 1.0.
    pub volatility: f64,
    pub stddev: f64,
    pub sign_changes: usize,
    pub events_considered: usize,
}

// ═════════════════════════════════════════════════════════════════════════════
// Entity operations
// ═════════════════════════════════════════════════════════════════════════════

/// Request to create (or idempotently merge) an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEntity {
    pub name: String,
    /// `None` = infer with the entity-type normalizer.
    pub entity_type: Option<EntityType>,
    /// Context sentence for type inference.
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub identifiers: Value,
    #[serde(default)]
    pub attributes: Value,
    #[serde(default)]
    pub tags: Vec<String>,
    pub salience: f64,
    pub confidence: f64,
    #[serde(default)]
    pub source: RecordSource,
}

impl NewEntity {
    pub fn named(name: impl Into<String>) -> Self {
        NewEntity {
            name: name.into(),
            entity_type: None,
            context: None,
            aliases: Vec::new(),
            identifiers: Value::Null,
            attributes: Value::Null,
            tags: Vec::new(),
            salience: 0.5,
            confidence: 1.0,
            source: RecordSource::Extraction,
        }
    }

    pub fn typed(name: impl Into<String>, entity_type: EntityType) -> Self {
        let mut e = Self::named(name);
        e.entity_type = Some(entity_type);
        e
    }
}

/// Partial-match entity search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySearchResult {
    pub matches: Vec<StoredEntity>,
    /// Set when one of the matches equals the query exactly
    /// (primary name, id, or alias, case-insensitive).
    pub exact_match: Option<StoredEntity>,
}

/// How `find_or_create_entity` settled on its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedBy {
    Exact,
    Partial,
    Created,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoundOrCreated {
    pub entity: StoredEntity,
    pub created: bool,
    pub matched_by: MatchedBy,
}

// ═════════════════════════════════════════════════════════════════════════════
// Entity resolution
// ═════════════════════════════════════════════════════════════════════════════

/// Knobs for the resolution cascade. Defaults consult every layer and
/// require 0.5 similarity from the vector memories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveOptions {
    pub include_relationships: bool,
    pub include_episodic: bool,
    pub include_semantic: bool,
    pub min_confidence: f64,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        ResolveOptions {
            include_relationships: true,
            include_episodic: true,
            include_semantic: true,
            min_confidence: 0.5,
        }
    }
}

/// Which layer of the memory stack produced a resolution candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    EntityGraph,
    Relationships,
    Episodic,
    Semantic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionCandidate {
    /// Absent for evidence found only in unstructured memory.
    pub entity_id: Option<String>,
    pub name: String,
    pub confidence: f64,
    pub source: ResolutionSource,
    /// Supporting snippet for memory-derived candidates.
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    AskUser,
    ChooseFromCandidates,
}

/// Outcome of resolving a free-text mention against the memory stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub query: String,
    pub resolved: bool,
    pub entity_id: Option<String>,
    pub name: Option<String>,
    pub confidence: f64,
    pub source: Option<ResolutionSource>,
    /// Ranked candidates, best first.
    pub candidates: Vec<ResolutionCandidate>,
    /// Set only when unresolved.
    pub suggested_action: Option<SuggestedAction>,
}

// ═════════════════════════════════════════════════════════════════════════════
// Disambiguation
// ═════════════════════════════════════════════════════════════════════════════

/// Knobs for disambiguation. Two candidates whose confidences sit within
/// `ambiguity_threshold` of each other make the answer ambiguous.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisambiguateOptions {
    pub min_confidence: f64,
    pub max_results: usize,
    pub ambiguity_threshold: f64,
}

impl Default for DisambiguateOptions {
    fn default() -> Self {
        DisambiguateOptions {
            min_confidence: 0.2,
            max_results: 5,
            ambiguity_threshold: 0.1,
        }
    }
}

/// A relation the caller expects the right entity to have
/// ("the Giovanna whose mother is Maria").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpectedRelation {
    pub relation_type: RelationCategory,
    pub target_name: String,
}

/// Caller-provided context signals for disambiguation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisambiguationContext {
    /// Names of entities known to relate to the one being sought.
    pub related_entities: Vec<String>,
    pub expected_relations: Vec<ExpectedRelation>,
    /// Expected attribute key/value pairs.
    #[serde(default)]
    pub attributes: Value,
    /// Free text for embedding similarity against candidate names.
    pub context_text: Option<String>,
}

/// An expected relation that exists in the graph but points at a
/// DIFFERENT target than the context claims. Flagged, never auto-resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inconsistency {
    pub relation_type: RelationCategory,
    pub expected_target: String,
    pub found_targets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisambiguationCandidate {
    pub entity: StoredEntity,
    /// Raw additive score.
    pub score: f64,
    /// Normalized score (score ÷ 2, capped at 1.0).
    pub confidence: f64,
    pub match_reasons: Vec<String>,
    pub inconsistencies: Vec<Inconsistency>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisambiguationResult {
    pub query: String,
    /// Absent when no candidate survived or the top two are too close.
    pub best_match: Option<DisambiguationCandidate>,
    pub candidates: Vec<DisambiguationCandidate>,
    pub ambiguous: bool,
    /// True when the winner carries contradiction flags.
    pub has_inconsistencies: bool,
}

// ═════════════════════════════════════════════════════════════════════════════
// Top-K search
// ═════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSource {
    Episodic,
    Semantic,
    Entities,
    Relationships,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub content: String,
    /// 0.0–1.0, comparable within a branch only.
    pub similarity: f64,
    pub source: SearchSource,
    #[serde(default)]
    pub metadata: Value,
}

/// One branch of a search. A failed branch carries its error note and an
/// empty result list instead of failing the whole search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchBranch {
    pub results: Vec<SearchHit>,
    pub error: Option<String>,
}

impl SearchBranch {
    pub fn failed(message: impl Into<String>) -> Self {
        SearchBranch {
            results: Vec::new(),
            error: Some(message.into()),
        }
    }
}

/// Combined result of searching all four memory sources concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedSearchResult {
    pub query: String,
    pub episodic: SearchBranch,
    pub semantic: SearchBranch,
    pub entities: SearchBranch,
    pub relationships: SearchBranch,
    pub total_results: usize,
}

// ═════════════════════════════════════════════════════════════════════════════
// Observability
// ═════════════════════════════════════════════════════════════════════════════

/// Engine-wide counters for the stats surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphStats {
    pub entities_active: usize,
    pub entities_total: usize,
    pub relationships_active: usize,
    pub relationships_total: usize,
    pub events_total: usize,
    pub predicate_normalizer: PredicateNormalizerStats,
    pub entity_type_normalizer: EntityTypeNormalizerStats,
    pub decay: DecayStats,
}
