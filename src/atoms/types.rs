// ── MindGraph Atoms: Domain Types ───────────────────────────────────────────
// Canonical enums and stored records for the knowledge graph.
//
// Relationships are stored in NORMALIZED form: instead of raw predicates
// ("esprimere_gradimento_per", "amare", "detestare"…) the row carries a
// generic relation category plus valence/intensity metadata, and the raw
// predicate is preserved in `original_predicate` for reference.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ═════════════════════════════════════════════════════════════════════════════
// Enums
// ═════════════════════════════════════════════════════════════════════════════

/// Types of entities in the knowledge graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Person,
    Organization,
    Location,
    Event,
    Concept,
    Object,
    Time,
    Tool,
    /// The assistant itself (singleton entity).
    #[serde(rename = "self")]
    SelfEntity,
    Food,
    Unknown,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "person",
            EntityType::Organization => "organization",
            EntityType::Location => "location",
            EntityType::Event => "event",
            EntityType::Concept => "concept",
            EntityType::Object => "object",
            EntityType::Time => "time",
            EntityType::Tool => "tool",
            EntityType::SelfEntity => "self",
            EntityType::Food => "food",
            EntityType::Unknown => "unknown",
        }
    }

    /// Parse a stored type string. Unrecognized values become `Unknown`
    /// rather than an error so old rows never poison reads.
    pub fn parse(s: &str) -> Self {
        match s {
            "person" => EntityType::Person,
            "organization" => EntityType::Organization,
            "location" => EntityType::Location,
            "event" => EntityType::Event,
            "concept" => EntityType::Concept,
            "object" => EntityType::Object,
            "time" => EntityType::Time,
            "tool" => EntityType::Tool,
            "self" => EntityType::SelfEntity,
            "food" => EntityType::Food,
            _ => EntityType::Unknown,
        }
    }

    /// All concrete types (excludes `Unknown`), in classification order.
    pub fn all() -> &'static [EntityType] {
        &[
            EntityType::Person,
            EntityType::Organization,
            EntityType::Location,
            EntityType::Event,
            EntityType::Concept,
            EntityType::Object,
            EntityType::Time,
            EntityType::Tool,
            EntityType::SelfEntity,
            EntityType::Food,
        ]
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized relation categories.
///
/// The predicate normalizer maps raw predicates to these:
///   esprimere_gradimento_per → Sentiment (positive)
///   possedere                → Ownership
///   lavorare_presso          → Employment
///   abitare_in               → Location
///   essere_figlio_di         → Family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationCategory {
    /// Feelings, preferences, opinions.
    Sentiment,
    /// Possessions, belongings.
    Ownership,
    /// Work relationships.
    Employment,
    /// Where entities are.
    Location,
    /// Family relationships.
    Family,
    /// Friend relationships.
    Friendship,
    /// Business relationships.
    Professional,
    /// Time-based relationships.
    Temporal,
    /// Is-a, same-as relationships.
    Identity,
    /// Has-property relationships.
    Attribute,
    /// Generic association.
    Association,
    /// Cannot categorize.
    Unknown,
}

impl RelationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationCategory::Sentiment => "sentiment",
            RelationCategory::Ownership => "ownership",
            RelationCategory::Employment => "employment",
            RelationCategory::Location => "location",
            RelationCategory::Family => "family",
            RelationCategory::Friendship => "friendship",
            RelationCategory::Professional => "professional",
            RelationCategory::Temporal => "temporal",
            RelationCategory::Identity => "identity",
            RelationCategory::Attribute => "attribute",
            RelationCategory::Association => "association",
            RelationCategory::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "sentiment" => RelationCategory::Sentiment,
            "ownership" => RelationCategory::Ownership,
            "employment" => RelationCategory::Employment,
            "location" => RelationCategory::Location,
            "family" => RelationCategory::Family,
            "friendship" => RelationCategory::Friendship,
            "professional" => RelationCategory::Professional,
            "temporal" => RelationCategory::Temporal,
            "identity" => RelationCategory::Identity,
            "attribute" => RelationCategory::Attribute,
            "association" => RelationCategory::Association,
            _ => RelationCategory::Unknown,
        }
    }
}

impl std::fmt::Display for RelationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categorical valence of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Valence {
    Positive,
    Negative,
    #[default]
    Neutral,
}

impl Valence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Valence::Positive => "positive",
            Valence::Negative => "negative",
            Valence::Neutral => "neutral",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "positive" => Valence::Positive,
            "negative" => Valence::Negative,
            _ => Valence::Neutral,
        }
    }

    /// Signed numeric valence for the event log: the relationship row keeps
    /// the categorical form, events keep `+intensity` / `-intensity` / `0.0`
    /// so history analytics can do arithmetic on it.
    pub fn signed(&self, intensity: f64) -> f64 {
        match self {
            Valence::Positive => intensity,
            Valence::Negative => -intensity,
            Valence::Neutral => 0.0,
        }
    }
}

impl std::fmt::Display for Valence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a predicate was normalized into a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalizationMethod {
    /// Exact hit in the known-predicate table.
    Direct,
    /// Keyword/regex group match inside the predicate.
    Partial,
    /// Embedding similarity against category exemplars.
    Embedding,
    /// Nothing matched; low-confidence neutral default.
    Default,
}

impl NormalizationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            NormalizationMethod::Direct => "direct",
            NormalizationMethod::Partial => "partial",
            NormalizationMethod::Embedding => "embedding",
            NormalizationMethod::Default => "default",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "direct" => NormalizationMethod::Direct,
            "partial" => NormalizationMethod::Partial,
            "embedding" => NormalizationMethod::Embedding,
            _ => NormalizationMethod::Default,
        }
    }
}

/// How an entity's type was inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeInferenceMethod {
    Embedding,
    #[serde(rename = "embedding+rules")]
    EmbeddingWithRules,
    /// Confidence too low; degraded to Unknown.
    Fallback,
    /// Provider failure; degraded to Unknown.
    ErrorFallback,
    Llm,
}

impl TypeInferenceMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeInferenceMethod::Embedding => "embedding",
            TypeInferenceMethod::EmbeddingWithRules => "embedding+rules",
            TypeInferenceMethod::Fallback => "fallback",
            TypeInferenceMethod::ErrorFallback => "error_fallback",
            TypeInferenceMethod::Llm => "llm",
        }
    }
}

/// Provenance of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    #[default]
    Extraction,
    UserDeclared,
    Inferred,
    System,
}

impl RecordSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordSource::Extraction => "extraction",
            RecordSource::UserDeclared => "user_declared",
            RecordSource::Inferred => "inferred",
            RecordSource::System => "system",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "user_declared" => RecordSource::UserDeclared,
            "inferred" => RecordSource::Inferred,
            "system" => RecordSource::System,
            _ => RecordSource::Extraction,
        }
    }

    /// User-declared and system records are exempt from decay.
    pub fn is_protected(&self) -> bool {
        matches!(self, RecordSource::UserDeclared | RecordSource::System)
    }
}

/// Lifecycle status of a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    #[default]
    Active,
    Deleted,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Active => "active",
            RecordStatus::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "deleted" => RecordStatus::Deleted,
            _ => RecordStatus::Active,
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// Stored records
// ═════════════════════════════════════════════════════════════════════════════

/// Persistent entity representation.
///
/// `entity_id` is a pure function of type + normalized name
/// (`person:fabrizio_rossi`), which makes entity creation idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntity {
    pub entity_id: String,
    pub entity_type: EntityType,
    pub primary_name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// External identifiers (email, phone, …) as an open JSON map.
    #[serde(default)]
    pub identifiers: Value,
    /// Free-form attributes as an open JSON map.
    #[serde(default)]
    pub attributes: Value,
    #[serde(default)]
    pub tags: Vec<String>,
    /// How central the entity is to the user's world (0.0–1.0).
    pub salience: f64,
    pub confidence: f64,
    pub source: RecordSource,
    pub status: RecordStatus,
    pub created_at: String,
    pub updated_at: String,
}

/// Persistent relationship representation (current state; last value wins).
///
/// History lives in the event log, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRelationship {
    pub rel_id: String,
    pub from_entity_id: String,
    pub to_entity_id: String,
    /// Normalized relation category (NOT the raw predicate).
    pub relation_type: RelationCategory,
    /// Raw predicate as extracted, preserved for debugging/learning.
    pub original_predicate: String,
    pub source_sentence: Option<String>,
    /// Normalized metadata, varies by category
    /// (sentiment: aspect; employment: role; family: relation; …).
    #[serde(default)]
    pub metadata: Value,
    /// 0.0–1.0, reinforced by repetition, decays over time.
    pub strength: f64,
    pub confidence: f64,
    pub valence: Valence,
    pub intensity: f64,
    pub evidence_count: i64,
    pub source: RecordSource,
    pub status: RecordStatus,
    pub last_reinforced: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Append-only event log entry for relationship changes.
///
/// The relationships table answers "what does the user feel NOW about X";
/// this log answers "how has it changed over time" (trend, volatility,
/// sign changes). Events are never updated once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipEvent {
    pub event_id: String,
    pub rel_id: String,
    /// The raw predicate for this assertion (ama, odia, …).
    pub predicate: String,
    /// Signed valence: -1.0 (negative) to +1.0 (positive).
    pub valence: f64,
    /// 0.0–1.0.
    pub intensity: f64,
    pub source_sentence: Option<String>,
    pub timestamp: String,
    pub normalization_method: NormalizationMethod,
    pub normalization_confidence: f64,
    #[serde(default)]
    pub metadata: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_type_roundtrip() {
        for t in EntityType::all() {
            assert_eq!(EntityType::parse(t.as_str()), *t);
        }
        assert_eq!(EntityType::parse("gibberish"), EntityType::Unknown);
        assert_eq!(EntityType::parse("self"), EntityType::SelfEntity);
    }

    #[test]
    fn entity_type_serde_uses_self_keyword() {
        let json = serde_json::to_string(&EntityType::SelfEntity).unwrap();
        assert_eq!(json, "\"self\"");
        let back: EntityType = serde_json::from_str("\"self\"").unwrap();
        assert_eq!(back, EntityType::SelfEntity);
    }

    #[test]
    fn signed_valence() {
        assert!((Valence::Positive.signed(0.8) - 0.8).abs() < 1e-9);
        assert!((Valence::Negative.signed(0.95) + 0.95).abs() < 1e-9);
        assert_eq!(Valence::Neutral.signed(0.7), 0.0);
    }

    #[test]
    fn protected_sources() {
        assert!(RecordSource::UserDeclared.is_protected());
        assert!(RecordSource::System.is_protected());
        assert!(!RecordSource::Extraction.is_protected());
        assert!(!RecordSource::Inferred.is_protected());
    }
}
