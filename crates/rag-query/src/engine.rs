//! Retrieval engine: merge, rerank, then slice to the top candidates.

use std::time::Instant;

use tracing::{debug, info, warn};

use rag_core::{RankedChunk, Result, RetrievalConfig, RetrievalMode};

use crate::merge::HybridRetriever;
use crate::rerank::Reranker;

/// Runs the retrieval half of the pipeline for one query.
pub struct RetrievalEngine {
    retriever: HybridRetriever,

    /// Absent when reranking is disabled; candidates then keep merge order.
    reranker: Option<Reranker>,

    config: RetrievalConfig,
}

impl RetrievalEngine {
    pub fn new(retriever: HybridRetriever, reranker: Option<Reranker>, config: RetrievalConfig) -> Self {
        Self {
            retriever,
            reranker,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// All merged candidates for `query`, ranked.
    ///
    /// A scorer failure is not fatal: the merged order is kept and every
    /// candidate gets a score of zero.
    pub async fn rank(&self, query: &str, mode: RetrievalMode) -> Result<Vec<RankedChunk>> {
        let start = Instant::now();

        let candidates = self.retriever.retrieve(query, self.config.k, mode).await?;

        let ranked = match &self.reranker {
            Some(reranker) => match reranker.rerank(query, candidates.clone()).await {
                Ok(ranked) => ranked,
                Err(e) => {
                    warn!(error = %e, "Reranking failed, keeping merged order");
                    unranked(candidates)
                }
            },
            None => unranked(candidates),
        };

        info!(
            "Retrieved {} candidates in {}ms",
            ranked.len(),
            start.elapsed().as_millis()
        );

        Ok(ranked)
    }

    /// The configured top-N of the ranked candidates.
    pub async fn top(&self, query: &str, mode: RetrievalMode) -> Result<Vec<RankedChunk>> {
        let mut ranked = self.rank(query, mode).await?;
        ranked.truncate(self.config.top_n);
        debug!(top_n = self.config.top_n, kept = ranked.len(), "Selected top candidates");
        Ok(ranked)
    }
}

fn unranked(candidates: Vec<rag_core::Chunk>) -> Vec<RankedChunk> {
    candidates
        .into_iter()
        .map(|chunk| RankedChunk::new(chunk, 0.0))
        .collect()
}
