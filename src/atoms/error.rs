// ── MindGraph Atoms: Error Types ────────────────────────────────────────────
// Single canonical error enum for the engine, built with `thiserror`.
//
// Design rules:
//   • Variants are coarse-grained by domain (I/O, DB, Network, Validation…).
//   • The `#[from]` attribute wires std/external error conversions automatically.
//   • `GraphError` → `String` conversion is provided via `Display` so service
//     boundaries returning `Result<T, String>` can call `.map_err(|e|
//     e.to_string())` without boilerplate.

use thiserror::Error;

// ── Primary error enum ──────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum GraphError {
    /// Filesystem or OS-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP / network failure (reqwest layer).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// SQLite / rusqlite database failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Caller-supplied input is invalid (empty fields, unknown filter, …).
    /// Retrying the same call will fail the same way.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A referenced record does not exist where its absence is not a
    /// meaningful answer. Lookups use `Ok(None)` instead.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A collaborating service (embedding provider, vector store) failed.
    #[error("Dependency error: {source_name}: {message}")]
    Dependency { source_name: String, message: String },

    /// Catch-all for errors that do not yet have a dedicated variant.
    /// Prefer adding a specific variant over using this in new code.
    #[error("{0}")]
    Other(String),
}

// ── Convenience constructors ────────────────────────────────────────────────

impl GraphError {
    /// Create a validation error from any displayable message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a dependency error with the collaborator's name and message.
    pub fn dependency(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Dependency {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}

// ── Migration bridge: String → GraphError ───────────────────────────────────

impl From<String> for GraphError {
    fn from(s: String) -> Self {
        GraphError::Other(s)
    }
}

impl From<&str> for GraphError {
    fn from(s: &str) -> Self {
        GraphError::Other(s.to_string())
    }
}

// ── Convenience alias ───────────────────────────────────────────────────────

/// All engine operations return this type.
pub type GraphResult<T> = Result<T, GraphError>;

// ── Conversion: GraphError → String ─────────────────────────────────────────

impl From<GraphError> for String {
    fn from(e: GraphError) -> Self {
        e.to_string()
    }
}
