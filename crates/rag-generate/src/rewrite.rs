//! Question to search-query rewriting.

use std::sync::Arc;

use tracing::debug;

use rag_core::{with_retry, CompletionRequest, LanguageModel, Result, RetryPolicy};

const REWRITE_PROMPT: &str = "You rewrite user questions to improve document retrieval.

Rules:
- Rewrite the question into a clear, explicit search query
- Expand abbreviations
- Add key technical terms
- DO NOT answer the question
- DO NOT add extra explanation
- Output ONE concise rewritten query
";

/// Short rewrites only need a handful of tokens.
const REWRITE_MAX_TOKENS: u32 = 64;

/// Rewrites a question into a retrieval query with the language model.
pub struct QueryRewriter {
    model: Arc<dyn LanguageModel>,
    retry: RetryPolicy,
}

impl QueryRewriter {
    pub fn new(model: Arc<dyn LanguageModel>, retry: RetryPolicy) -> Self {
        Self { model, retry }
    }

    /// The rewritten query, or `question` unchanged if the model returns
    /// nothing usable.
    pub async fn rewrite(&self, question: &str) -> Result<String> {
        let request = CompletionRequest {
            system: REWRITE_PROMPT.to_string(),
            user: question.to_string(),
            temperature: 0.0,
            max_output_tokens: REWRITE_MAX_TOKENS,
        };

        let model = &self.model;
        let request_ref = &request;
        let raw = with_retry("query rewriter", &self.retry, move || {
            model.complete(request_ref)
        })
        .await?;

        let rewritten = raw.trim();
        if rewritten.is_empty() {
            debug!("Rewrite was empty, keeping the original question");
            return Ok(question.to_string());
        }

        debug!(original = question, rewritten, "Query rewritten");
        Ok(rewritten.to_string())
    }
}
