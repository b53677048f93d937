//! Candidate sources backed by the chunk index.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use rag_core::{Chunk, DenseSource, Embedder, LexicalSource, RagError, Result};

use crate::ChunkIndex;

/// BM25 keyword search over the FTS5 table.
pub struct KeywordSource {
    index: Arc<ChunkIndex>,
}

impl KeywordSource {
    pub fn new(index: Arc<ChunkIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl LexicalSource for KeywordSource {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        let hits = self
            .index
            .keyword_search(query, k)
            .map_err(|e| RagError::permanent("lexical search", e.to_string()))?;

        debug!(k, hits = hits.len(), "Keyword search");
        Ok(hits.into_iter().map(|(chunk, _)| chunk).collect())
    }
}

/// Embedding similarity search over the vec0 table.
pub struct VectorSource {
    index: Arc<ChunkIndex>,
    embedder: Arc<dyn Embedder>,
}

impl VectorSource {
    pub fn new(index: Arc<ChunkIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self { index, embedder }
    }
}

#[async_trait]
impl DenseSource for VectorSource {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        if !self.index.vec_enabled() {
            return Err(RagError::permanent(
                "dense search",
                "sqlite-vec extension not loaded",
            ));
        }

        if k == 0 {
            return Ok(Vec::new());
        }

        let embedding = self
            .embedder
            .embed_query(query)
            .await
            .map_err(|e| RagError::transient("dense search", e.to_string()))?;

        let hits = self
            .index
            .vector_search(&embedding, k)
            .map_err(|e| RagError::permanent("dense search", e.to_string()))?;

        debug!(k, hits = hits.len(), "Vector search");
        Ok(hits.into_iter().map(|(chunk, _)| chunk).collect())
    }
}

/// Embed chunk texts in batches and store the vectors.
///
/// Chunks must already be in the index.
pub async fn index_embeddings(
    index: &ChunkIndex,
    embedder: &dyn Embedder,
    chunks: &[Chunk],
    batch_size: usize,
) -> Result<usize> {
    let mut stored = 0;

    for batch in chunks.chunks(batch_size.max(1)) {
        let texts: Vec<&str> = batch.iter().map(|c| c.text()).collect();
        let embeddings = embedder.embed_documents(&texts).await?;
        let ids: Vec<_> = batch.iter().map(|c| c.id()).collect();
        index.insert_embeddings(&ids, &embeddings)?;
        stored += batch.len();
    }

    debug!(stored, "Indexed embeddings");
    Ok(stored)
}
