//! Core traits defining the interfaces between components.
//!
//! Every external collaborator of the retrieval and generation pipeline sits
//! behind one of these traits. Implementations are built once at startup and
//! handed to the components that need them, so tests can substitute fakes.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Chunk, DocumentKind};

/// Term-overlap retrieval (BM25 style).
#[async_trait]
pub trait LexicalSource: Send + Sync {
    /// Return up to `k` chunks, most relevant first.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Chunk>>;
}

/// Embedding-similarity retrieval.
#[async_trait]
pub trait DenseSource: Send + Sync {
    /// Return up to `k` chunks, most similar first.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Chunk>>;
}

/// Cross-encoder relevance scoring of a (query, text) pair.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// Score a single pair. Higher means more relevant.
    async fn score(&self, query: &str, text: &str) -> Result<f32>;

    /// Score many texts against the same query, one score per text.
    async fn score_batch(&self, query: &str, texts: &[&str]) -> Result<Vec<f32>> {
        let mut scores = Vec::with_capacity(texts.len());
        for text in texts {
            scores.push(self.score(query, text).await?);
        }
        Ok(scores)
    }
}

/// A single chat completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System instruction.
    pub system: String,

    /// User message.
    pub user: String,

    /// Sampling temperature; 0.0 for deterministic decoding.
    pub temperature: f32,

    /// Upper bound on generated tokens.
    pub max_output_tokens: u32,
}

/// Answer-generation language model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete the request. A response without content is an empty string.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Model identifier for logging.
    fn model_name(&self) -> &str;
}

/// Embedding model trait.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of document texts.
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the embedding dimension.
    fn dimension(&self) -> usize;
}

/// Chunking configuration.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Maximum characters per chunk.
    pub chunk_size: usize,

    /// Characters carried over from the end of one chunk into the next.
    pub chunk_overlap: usize,

    /// Separators tried in order; the empty string means per-character.
    pub separators: Vec<String>,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 650,
            chunk_overlap: 120,
            separators: ["\n\n", "\n", ". ", " ", ""]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Chunking strategy trait.
pub trait Chunker: Send + Sync {
    /// Split text content into pieces.
    fn chunk(&self, content: &str, kind: DocumentKind, config: &ChunkConfig) -> Result<Vec<ChunkData>>;
}

/// Raw chunk data before it becomes a [`Chunk`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkData {
    /// Chunk text content.
    pub content: String,

    /// Length of the content in characters.
    pub char_count: usize,
}
