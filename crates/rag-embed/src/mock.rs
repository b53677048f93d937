//! Deterministic stand-ins for the ONNX models.

use std::collections::HashSet;

use async_trait::async_trait;

use rag_core::{Embedder, RelevanceScorer, Result};

use crate::onnx::l2_normalize;

/// A mock embedder for testing that doesn't require actual models.
///
/// Texts sharing words land close together: every lowercase word is hashed
/// into one bucket of the vector.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    /// Create a new mock embedder with the default dimension.
    pub fn new() -> Self {
        Self { dimension: 384 }
    }

    /// Create a mock embedder with a custom dimension.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];
        for word in words(text) {
            let hash = word
                .bytes()
                .fold(0xcbf29ce484222325u64, |acc, b| (acc ^ b as u64).wrapping_mul(0x100000001b3));
            embedding[(hash % self.dimension as u64) as usize] += 1.0;
        }
        l2_normalize(embedding)
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Scores a passage by the share of query words it contains.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockScorer;

impl MockScorer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RelevanceScorer for MockScorer {
    async fn score(&self, query: &str, text: &str) -> Result<f32> {
        let query_words: HashSet<String> = words(query).collect();
        if query_words.is_empty() {
            return Ok(0.0);
        }

        let text_words: HashSet<String> = words(text).collect();
        let shared = query_words.intersection(&text_words).count();
        Ok(shared as f32 / query_words.len() as f32)
    }
}

/// Lowercase alphanumeric words.
fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_embedder() {
        let embedder = MockEmbedder::new();
        assert_eq!(embedder.dimension(), 384);

        let texts = ["Hello world", "Rust is great"];
        let embeddings = embedder.embed_documents(&texts).await.unwrap();

        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[0].len(), 384);

        // Check L2 normalization
        let norm: f32 = embeddings[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_deterministic_embeddings() {
        let embedder = MockEmbedder::with_dimension(64);

        let e1 = embedder.embed_query("consistent input").await.unwrap();
        let e2 = embedder.embed_query("consistent input").await.unwrap();
        assert_eq!(e1, e2);
        assert_eq!(e1.len(), 64);
    }

    #[tokio::test]
    async fn test_shared_words_are_closer() {
        let embedder = MockEmbedder::new();
        let query = embedder.embed_query("device voltage").await.unwrap();
        let docs = embedder
            .embed_documents(&["the device voltage is 5V", "warranty lasts two years"])
            .await
            .unwrap();

        let dot = |a: &[f32], b: &[f32]| a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
        assert!(dot(&query, &docs[0]) > dot(&query, &docs[1]));
    }

    #[tokio::test]
    async fn test_mock_scorer() {
        let scorer = MockScorer::new();

        let full = scorer.score("device voltage", "The device voltage is 5V.").await.unwrap();
        let half = scorer.score("device voltage", "The device weighs 2kg.").await.unwrap();
        let none = scorer.score("device voltage", "Warranty terms.").await.unwrap();

        assert_eq!(full, 1.0);
        assert_eq!(half, 0.5);
        assert_eq!(none, 0.0);
        assert_eq!(scorer.score("?!", "anything").await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_mock_scorer_batch() {
        let scorer = MockScorer::new();
        let scores = scorer
            .score_batch("device voltage", &["device", "voltage device", "other"])
            .await
            .unwrap();
        assert_eq!(scores, vec![0.5, 1.0, 0.0]);
    }
}
