//! rag-query - Candidate retrieval and ranking
//!
//! This crate turns a question into a ranked list of chunks:
//!
//! - [`merge_candidates`] / [`HybridRetriever`]: stable, deduplicated union of
//!   lexical and dense candidates, capped at `k`
//! - [`Reranker`]: cross-encoder scoring and a stable descending sort that
//!   never drops a candidate
//! - [`RetrievalEngine`]: merge, rerank and slice to the configured top-N
//!
//! # Example
//!
//! ```rust,ignore
//! use rag_query::{HybridRetriever, Reranker, RetrievalEngine};
//! use std::sync::Arc;
//!
//! let retriever = HybridRetriever::new(lexical, dense, config.retry.clone());
//! let reranker = Reranker::new(scorer, config.retry.clone());
//! let engine = RetrievalEngine::new(retriever, Some(reranker), config.retrieval.clone());
//! let top = engine.top("What voltage does the device use?", RetrievalMode::Hybrid).await?;
//! ```

mod engine;
mod merge;
mod rerank;

pub use engine::RetrievalEngine;
pub use merge::{merge_candidates, HybridRetriever};
pub use rerank::{rank_by_scores, Reranker};

// Re-export for convenience
pub use rag_core::{RankedChunk, RetrievalMode};
