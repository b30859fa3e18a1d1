// ── MindGraph: Knowledge Graph Engine ───────────────────────────────────────
// SQLite-backed knowledge graph for a cognitive memory service.
//
// Pipeline: raw (subject, predicate, object) assertions are normalized into
// typed entities and categorized relationships, every assertion is appended
// to an event log, and analytics / resolution / search layers read both.
//
// Module layout:
//   atoms       — pure data types (errors, records, result structs)
//   config      — engine configuration (db path, embedding endpoint)
//   similarity  — embedding provider + vector search seams, cosine math
//   store       — GraphStore: SQLite schema and row-level SQL
//   normalize   — predicate + entity-type normalizers
//   decay       — confidence/strength decay service
//   graph       — GraphService: CRUD, analytics, resolution, top-k search

pub mod atoms;
pub mod config;
pub mod decay;
pub mod graph;
pub mod normalize;
pub mod similarity;
pub mod store;

pub use atoms::error::{GraphError, GraphResult};
pub use config::GraphConfig;
pub use decay::GraphDecayService;
pub use graph::GraphService;
pub use normalize::entity_type::EntityTypeNormalizer;
pub use normalize::predicate::PredicateNormalizer;
pub use similarity::{EmbeddingProvider, HttpEmbeddingClient, VectorSearch};
pub use store::GraphStore;
