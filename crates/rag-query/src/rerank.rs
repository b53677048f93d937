//! Cross-encoder reranking of the candidate pool.

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::debug;

use rag_core::{with_retry, Chunk, RagError, RankedChunk, RelevanceScorer, RetryPolicy, Result};

/// Attach scores to candidates and sort them by score, highest first.
///
/// The sort is stable, so equal scores keep their input order. NaN scores
/// sort after every real score. No candidate is added or dropped.
pub fn rank_by_scores(candidates: Vec<Chunk>, scores: &[f32]) -> Vec<RankedChunk> {
    let mut ranked: Vec<RankedChunk> = candidates
        .into_iter()
        .zip(scores.iter().copied())
        .map(|(chunk, score)| {
            let score = if score.is_nan() { f32::NEG_INFINITY } else { score };
            RankedChunk::new(chunk, score)
        })
        .collect();

    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    ranked
}

/// Reorders candidates by cross-encoder relevance.
pub struct Reranker {
    scorer: Arc<dyn RelevanceScorer>,
    retry: RetryPolicy,
}

impl Reranker {
    pub fn new(scorer: Arc<dyn RelevanceScorer>, retry: RetryPolicy) -> Self {
        Self { scorer, retry }
    }

    /// Score every candidate against `query` and return all of them ranked.
    ///
    /// Truncation to a top-N is left to the caller.
    pub async fn rerank(&self, query: &str, candidates: Vec<Chunk>) -> Result<Vec<RankedChunk>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = candidates.iter().map(|c| c.text()).collect();
        let scorer = &self.scorer;
        let texts_ref = texts.as_slice();
        let scores = with_retry("scorer", &self.retry, move || {
            scorer.score_batch(query, texts_ref)
        })
        .await?;

        if scores.len() != candidates.len() {
            return Err(RagError::permanent(
                "scorer",
                format!(
                    "returned {} scores for {} candidates",
                    scores.len(),
                    candidates.len()
                ),
            ));
        }

        let ranked = rank_by_scores(candidates, &scores);
        debug!(
            candidates = ranked.len(),
            best = ranked.first().map(|r| r.score),
            "Reranked candidates"
        );
        Ok(ranked)
    }
}
