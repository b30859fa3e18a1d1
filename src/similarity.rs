// ── MindGraph: Similarity & Provider Seams ──────────────────────────────────
// Embedding and vector-search collaborators are injected at construction
// behind async traits, so tests run with deterministic fixtures and the
// engine never reaches for a global.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::atoms::error::{GraphError, GraphResult};

// ═════════════════════════════════════════════════════════════════════════════
// Traits
// ═════════════════════════════════════════════════════════════════════════════

/// Produces embedding vectors for arbitrary text.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> GraphResult<Vec<f32>>;

    fn model_name(&self) -> &str {
        "unknown"
    }
}

/// Which vector-indexed memory tier to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorTier {
    /// Raw conversation memories.
    Episodic,
    /// Consolidated knowledge.
    Semantic,
}

impl VectorTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorTier::Episodic => "episodic",
            VectorTier::Semantic => "semantic",
        }
    }
}

/// One hit from a vector store query.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub content: String,
    pub metadata: Value,
    /// Distance in the store's metric; similarity = 1.0 − distance.
    pub distance: f64,
}

/// Similarity search over the episodic/semantic memory stores.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn query(&self, tier: VectorTier, text: &str, k: usize) -> GraphResult<Vec<VectorHit>>;
}

// ═════════════════════════════════════════════════════════════════════════════
// Vector math
// ═════════════════════════════════════════════════════════════════════════════

/// Cosine similarity between two vectors. Returns 0.0 if either is zero-length
/// or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-12 {
        0.0
    } else {
        dot / denom
    }
}

/// Element-wise mean of a set of equal-length vectors.
/// Returns an empty vector when the input is empty or ragged.
pub fn mean_embedding(vectors: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = vectors.first() else {
        return Vec::new();
    };
    let dim = first.len();
    if vectors.iter().any(|v| v.len() != dim) {
        return Vec::new();
    }
    let mut avg = vec![0.0f32; dim];
    for vector in vectors {
        for (slot, value) in avg.iter_mut().zip(vector.iter()) {
            *slot += value;
        }
    }
    let n = vectors.len() as f32;
    for slot in avg.iter_mut() {
        *slot /= n;
    }
    avg
}

// ═════════════════════════════════════════════════════════════════════════════
// HTTP embedding client
// ═════════════════════════════════════════════════════════════════════════════

/// Embedding client speaking the Ollama API with an OpenAI-compatible
/// fallback. Tries `POST /api/embed { model, input }` first, then
/// `POST /v1/embeddings { model, input }`.
pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl HttpEmbeddingClient {
    pub fn new(config: &crate::config::GraphConfig) -> Self {
        HttpEmbeddingClient {
            client: reqwest::Client::new(),
            base_url: config.embedding_base_url.clone(),
            model: config.embedding_model.clone(),
        }
    }

    /// Ollama format: POST /api/embed { model, input } → { embeddings: [[f32…]] }
    async fn embed_ollama(&self, text: &str) -> GraphResult<Vec<f32>> {
        let url = format!("{}/api/embed", self.base_url.trim_end_matches('/'));
        let body = json!({ "model": self.model, "input": text });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .timeout(std::time::Duration::from_secs(60))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(GraphError::dependency(
                "embedding",
                format!("ollama embed returned {}", resp.status()),
            ));
        }

        let v: Value = resp.json().await?;
        if let Some(first) = v["embeddings"].as_array().and_then(|e| e.first()) {
            if let Some(values) = first.as_array() {
                return Ok(values
                    .iter()
                    .filter_map(|x| x.as_f64())
                    .map(|x| x as f32)
                    .collect());
            }
        }
        Err(GraphError::dependency(
            "embedding",
            "ollama embed response missing embeddings array",
        ))
    }

    /// OpenAI-compatible format: POST /v1/embeddings { model, input }
    /// → { data: [{ embedding: [f32…] }] }
    async fn embed_openai(&self, text: &str) -> GraphResult<Vec<f32>> {
        let url = format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'));
        let body = json!({ "model": self.model, "input": text });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .timeout(std::time::Duration::from_secs(60))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(GraphError::dependency(
                "embedding",
                format!("openai embed returned {}", resp.status()),
            ));
        }

        let v: Value = resp.json().await?;
        if let Some(values) = v["data"][0]["embedding"].as_array() {
            return Ok(values
                .iter()
                .filter_map(|x| x.as_f64())
                .map(|x| x as f32)
                .collect());
        }
        Err(GraphError::dependency(
            "embedding",
            "openai embed response missing data[0].embedding",
        ))
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> GraphResult<Vec<f32>> {
        let ollama_err = match self.embed_ollama(text).await {
            Ok(vec) => return Ok(vec),
            Err(e) => e,
        };
        match self.embed_openai(text).await {
            Ok(vec) => Ok(vec),
            Err(openai_err) => Err(GraphError::dependency(
                "embedding",
                format!("ollama: {} | openai: {}", ollama_err, openai_err),
            )),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// Test fixtures
// ═════════════════════════════════════════════════════════════════════════════


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical_vectors() {
        let v = vec![1.0f32, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors() {
        let a = vec![1.0f32, 0.0];
        let b = vec![0.0f32, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_opposite_vectors() {
        let a = vec![1.0f32, 0.0];
        let b = vec![-1.0f32, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_zero_vector() {
        let a = vec![0.0f32, 0.0];
        let b = vec![1.0f32, 2.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn cosine_different_lengths() {
        let a = vec![1.0f32, 2.0];
        let b = vec![1.0f32, 2.0, 3.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn mean_of_two_vectors() {
        let avg = mean_embedding(&[vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert_eq!(avg, vec![0.5, 0.5]);
    }

    #[test]
    fn mean_of_empty_set() {
        assert!(mean_embedding(&[]).is_empty());
    }

    #[test]
    fn mean_rejects_ragged_input() {
        assert!(mean_embedding(&[vec![1.0], vec![1.0, 2.0]]).is_empty());
    }

    #[tokio::test]
    async fn fixture_embedder_routes_keywords() {
        let embedder = fixtures::FixtureEmbedder::new().with("amare", vec![1.0, 0.0, 0.0, 0.0]);
        let v = embedder.embed("amare molto").await.unwrap();
        assert_eq!(v, vec![1.0, 0.0, 0.0, 0.0]);
        let fallback = embedder.embed("qualcosa").await.unwrap();
        assert_eq!(fallback, vec![0.0, 0.0, 0.0, 1.0]);
    }
}
