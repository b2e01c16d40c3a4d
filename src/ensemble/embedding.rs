//! The embedding/vector-store collaborator trait (SPEC_FULL.md §6a). Grounded on
//! `llm/adapter.rs::LLMClient`: one narrow async trait plus a `Null` degraded-mode
//! implementation the Ensemble Matcher and Modifier Extractor fall back to.

use crate::error::RouterError;
use async_trait::async_trait;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RouterError>;
    fn similarity(&self, a: &[f32], b: &[f32]) -> f32;
}

/// No embedding backend wired: the Ensemble Matcher degrades to keyword-only
/// selection and the Modifier Extractor to literal substring matching (§6).
pub struct NullEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for NullEmbeddingProvider {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, RouterError> {
        Err(RouterError::external_unavailable("no embedding backend configured"))
    }

    fn similarity(&self, _a: &[f32], _b: &[f32]) -> f32 {
        0.0
    }
}

/// A simple cosine-similarity embedding backend over bag-of-words hashing, useful in
/// tests and as a placeholder default when no real vector store is wired. Not a
/// production semantic model — it satisfies the trait contract deterministically.
pub struct BasicEmbeddingProvider {
    pub dims: usize,
}

impl BasicEmbeddingProvider {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }
}

#[async_trait]
impl EmbeddingProvider for BasicEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RouterError> {
        let mut vector = vec![0.0f32; self.dims];
        for token in text.to_lowercase().split_whitespace() {
            let bucket = hash_token(token) % self.dims;
            vector[bucket] += 1.0;
        }
        Ok(vector)
    }

    fn similarity(&self, a: &[f32], b: &[f32]) -> f32 {
        cosine_similarity(a, b)
    }
}

fn hash_token(token: &str) -> usize {
    let mut hash: u64 = 1469598103934665603;
    for byte in token.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    hash as usize
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn basic_provider_scores_identical_text_maximally() {
        let provider = BasicEmbeddingProvider::new(64);
        let a = provider.embed("bevel the selected edges").await.unwrap();
        let b = provider.embed("bevel the selected edges").await.unwrap();
        assert!((provider.similarity(&a, &b) - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn null_provider_fails_embed_and_scores_zero() {
        let provider = NullEmbeddingProvider;
        assert!(provider.embed("anything").await.is_err());
        assert_eq!(provider.similarity(&[1.0], &[1.0]), 0.0);
    }
}
