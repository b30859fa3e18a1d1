// ── MindGraph: Configuration ────────────────────────────────────────────────

use std::path::PathBuf;

use serde::Deserialize;

/// Engine configuration. Defaults work for a local Ollama setup; every
/// field can be overridden from the environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// SQLite database path. `None` = default data directory.
    pub db_path: Option<PathBuf>,
    /// Base URL of the embedding endpoint.
    pub embedding_base_url: String,
    /// Embedding model name.
    pub embedding_model: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        GraphConfig {
            db_path: None,
            embedding_base_url: "http://localhost:11434".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
        }
    }
}

impl GraphConfig {
    /// Defaults overlaid with `MINDGRAPH_DB`, `MINDGRAPH_EMBEDDING_URL`,
    /// and `MINDGRAPH_EMBEDDING_MODEL` when set.
    pub fn from_env() -> Self {
        let mut config = GraphConfig::default();
        if let Ok(path) = std::env::var("MINDGRAPH_DB") {
            if !path.is_empty() {
                config.db_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(url) = std::env::var("MINDGRAPH_EMBEDDING_URL") {
            if !url.is_empty() {
                config.embedding_base_url = url;
            }
        }
        if let Ok(model) = std::env::var("MINDGRAPH_EMBEDDING_MODEL") {
            if !model.is_empty() {
                config.embedding_model = model;
            }
        }
        config
    }

    /// Resolved database path: the configured one, or
    /// `<data dir>/mindgraph/graph.db`.
    pub fn resolved_db_path(&self) -> PathBuf {
        if let Some(path) = &self.db_path {
            return path.clone();
        }
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        base.join("mindgraph").join("graph.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_ollama() {
        let config = GraphConfig::default();
        assert_eq!(config.embedding_base_url, "http://localhost:11434");
        assert!(config.db_path.is_none());
    }

    #[test]
    fn resolved_path_honors_override() {
        let config = GraphConfig {
            db_path: Some(PathBuf::from("/tmp/test-graph.db")),
            ..Default::default()
        };
        assert_eq!(config.resolved_db_path(), PathBuf::from("/tmp/test-graph.db"));
    }
}
