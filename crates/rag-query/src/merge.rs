//! Hybrid merge of lexical and dense candidates.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use rag_core::{
    with_retry, Chunk, DenseSource, LexicalSource, RetrievalMode, RetryPolicy, Result,
};

/// Stable union of two candidate lists, deduplicated by exact text.
///
/// Lexical candidates are scanned before dense ones, so a text found by both
/// sources keeps the position it earned in the lexical list. The result holds
/// at most `k` chunks; `k == 0` yields an empty list.
pub fn merge_candidates(lexical: Vec<Chunk>, dense: Vec<Chunk>, k: usize) -> Vec<Chunk> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged = Vec::with_capacity(k.min(lexical.len() + dense.len()));

    for chunk in lexical.into_iter().chain(dense) {
        if merged.len() == k {
            break;
        }
        if seen.insert(chunk.text().to_string()) {
            merged.push(chunk);
        }
    }

    merged
}

/// Queries the candidate sources and merges their results.
pub struct HybridRetriever {
    lexical: Arc<dyn LexicalSource>,
    dense: Arc<dyn DenseSource>,
    retry: RetryPolicy,
}

impl HybridRetriever {
    pub fn new(
        lexical: Arc<dyn LexicalSource>,
        dense: Arc<dyn DenseSource>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            lexical,
            dense,
            retry,
        }
    }

    /// Candidate pool for `query`, at most `k` chunks.
    ///
    /// In hybrid mode both sources are searched concurrently. A source that
    /// still fails after its retries is dropped with a warning and the other
    /// source's candidates are used; the query fails only if both fail.
    pub async fn retrieve(&self, query: &str, k: usize, mode: RetrievalMode) -> Result<Vec<Chunk>> {
        match mode {
            RetrievalMode::Dense => {
                let dense = self.search_dense(query, k).await?;
                debug!(dense = dense.len(), "Dense-only candidates");
                Ok(merge_candidates(Vec::new(), dense, k))
            }
            RetrievalMode::Hybrid => {
                let (lexical, dense) =
                    tokio::join!(self.search_lexical(query, k), self.search_dense(query, k));

                let (lexical, dense) = match (lexical, dense) {
                    (Ok(l), Ok(d)) => (l, d),
                    (Ok(l), Err(e)) => {
                        warn!(error = %e, "Dense search failed, continuing with lexical candidates");
                        (l, Vec::new())
                    }
                    (Err(e), Ok(d)) => {
                        warn!(error = %e, "Lexical search failed, continuing with dense candidates");
                        (Vec::new(), d)
                    }
                    (Err(lexical_err), Err(dense_err)) => {
                        warn!(error = %lexical_err, "Lexical search failed");
                        return Err(dense_err);
                    }
                };

                debug!(
                    lexical = lexical.len(),
                    dense = dense.len(),
                    "Hybrid candidates"
                );

                let merged = merge_candidates(lexical, dense, k);
                debug!(merged = merged.len(), "Merged candidates");
                Ok(merged)
            }
        }
    }

    async fn search_lexical(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        let lexical = &self.lexical;
        with_retry("lexical search", &self.retry, move || lexical.search(query, k)).await
    }

    async fn search_dense(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        let dense = &self.dense;
        with_retry("dense search", &self.retry, move || dense.search(query, k)).await
    }
}
