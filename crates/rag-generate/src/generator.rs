//! Grounded answer generation.

use std::sync::Arc;

use tracing::{debug, info};

use rag_core::{
    with_retry, Answer, CompletionRequest, FallbackReason, GenerationConfig, LanguageModel,
    RetryPolicy, Result,
};

use crate::grounding::GroundingPolicy;

/// Instruction sent with every question. `{fallback}` is replaced by the
/// configured fallback sentence.
pub const SYSTEM_PROMPT: &str = "You are a technical assistant that answers questions about a document collection.

You MUST answer using ONLY the information given below the question.
Rules:
- Do not use prior knowledge.
- Do not infer missing details.
- If the answer is not explicitly stated, respond EXACTLY:
  {fallback}
- Keep the answer short (2-5 sentences).
- Do not include apologies, meta commentary, or speculation.
- Do not mention \"context\" in the answer.
";

/// User message carrying the question and the assembled context.
pub fn build_user_prompt(question: &str, context: &str) -> String {
    format!(
        "Question:\n{}\n\nContext:\n{}\n\nAnswer (follow the rules exactly):",
        question, context
    )
}

/// Answers a question from a context, and only from that context.
pub struct GroundedGenerator {
    model: Arc<dyn LanguageModel>,
    policy: GroundingPolicy,
    system_prompt: String,
    temperature: f32,
    max_output_tokens: u32,
    retry: RetryPolicy,
}

impl GroundedGenerator {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        policy: GroundingPolicy,
        config: &GenerationConfig,
        retry: RetryPolicy,
    ) -> Self {
        let system_prompt = SYSTEM_PROMPT.replace("{fallback}", policy.fallback_text());
        Self {
            model,
            policy,
            system_prompt,
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            retry,
        }
    }

    pub fn policy(&self) -> &GroundingPolicy {
        &self.policy
    }

    /// Answer `question` from `context`.
    ///
    /// An empty or whitespace-only context is answered with the fallback
    /// sentence without calling the model. Model output that is empty, leaks
    /// the context or echoes the fallback also ends in the fallback. A model
    /// call that still fails after its retries is returned as an error.
    pub async fn generate(&self, question: &str, context: &str) -> Result<Answer> {
        if context.trim().is_empty() {
            return Ok(self.policy.fallback(FallbackReason::EmptyContext));
        }

        let request = CompletionRequest {
            system: self.system_prompt.clone(),
            user: build_user_prompt(question, context),
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
        };

        let model = &self.model;
        let request_ref = &request;
        let raw = with_retry("language model", &self.retry, move || {
            model.complete(request_ref)
        })
        .await?;

        debug!(
            model = self.model.model_name(),
            raw_chars = raw.chars().count(),
            "Model responded"
        );

        let answer = self.policy.apply(&raw);
        info!(
            fallback = answer.is_fallback(),
            chars = answer.text().len(),
            "Answer generated"
        );
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rag_core::{GroundingConfig, RagError};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    const FALLBACK: &str = "The provided context does not specify this.";

    /// Replies with a fixed text and records every request it sees.
    struct ScriptedModel {
        reply: std::result::Result<String, ()>,
        failures: u32,
        calls: AtomicU32,
        last: Mutex<Option<CompletionRequest>>,
    }

    impl ScriptedModel {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                failures: 0,
                calls: AtomicU32::new(0),
                last: Mutex::new(None),
            })
        }

        fn flaky(failures: u32, text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                failures,
                calls: AtomicU32::new(0),
                last: Mutex::new(None),
            })
        }

        fn broken() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(()),
                failures: 0,
                calls: AtomicU32::new(0),
                last: Mutex::new(None),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(request.clone());
            if n < self.failures {
                return Err(RagError::transient("language model", "overloaded"));
            }
            self.reply
                .clone()
                .map_err(|_| RagError::permanent("language model", "invalid api key"))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn generator(model: Arc<ScriptedModel>) -> GroundedGenerator {
        let policy = GroundingPolicy::from_config(&GroundingConfig::default()).unwrap();
        let retry = RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 1,
            timeout_ms: 1_000,
        };
        GroundedGenerator::new(model, policy, &GenerationConfig::default(), retry)
    }

    #[tokio::test]
    async fn test_empty_context_skips_model() {
        let model = ScriptedModel::replying("It uses 5V.");
        let generator = generator(model.clone());

        for context in ["", "   ", "\n\t"] {
            let answer = generator.generate("What voltage?", context).await.unwrap();
            assert_eq!(answer.text(), FALLBACK);
            assert_eq!(answer.fallback_reason(), Some(FallbackReason::EmptyContext));
        }
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_grounded_answer() {
        let model = ScriptedModel::replying("  The device operates at 5V.\n");
        let generator = generator(model.clone());

        let answer = generator
            .generate("What voltage?", "The device operates at 5V and draws 200mA.")
            .await
            .unwrap();
        assert_eq!(answer, Answer::Grounded("The device operates at 5V.".to_string()));

        let request = model.last.lock().unwrap().clone().unwrap();
        assert_eq!(request.temperature, 0.0);
        assert_eq!(request.max_output_tokens, 220);
        assert!(request.system.contains(FALLBACK));
        assert!(!request.system.contains("{fallback}"));
        assert!(request.user.starts_with("Question:\nWhat voltage?\n\nContext:\nThe device"));
        assert!(request.user.ends_with("Answer (follow the rules exactly):"));
    }

    #[tokio::test]
    async fn test_leak_suppressed() {
        let generator = generator(ScriptedModel::replying("the provided context states X"));
        let answer = generator.generate("q", "some context").await.unwrap();
        assert_eq!(answer.text(), FALLBACK);
        assert_eq!(answer.fallback_reason(), Some(FallbackReason::ContextLeak));
    }

    #[tokio::test]
    async fn test_sentence_cap() {
        let generator = generator(ScriptedModel::replying(
            "S1. S2. S3. S4. S5. S6. S7.",
        ));
        let answer = generator.generate("q", "ctx").await.unwrap();
        assert_eq!(answer.text(), "S1. S2. S3. S4. S5.");
    }

    #[tokio::test]
    async fn test_empty_model_output_falls_back() {
        let generator = generator(ScriptedModel::replying(""));
        let answer = generator.generate("q", "ctx").await.unwrap();
        assert_eq!(answer.text(), FALLBACK);
        assert_eq!(
            answer.fallback_reason(),
            Some(FallbackReason::EmptyAfterSanitize)
        );
    }

    #[tokio::test]
    async fn test_transient_failure_retried() {
        let model = ScriptedModel::flaky(2, "It uses 5V.");
        let generator = generator(model.clone());

        let answer = generator.generate("q", "ctx").await.unwrap();
        assert_eq!(answer.text(), "It uses 5V.");
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn test_model_failure_surfaces() {
        let model = ScriptedModel::broken();
        let generator = generator(model.clone());

        let err = generator.generate("q", "ctx").await.unwrap_err();
        assert_eq!(err.error_code(), "EXTERNAL_SERVICE_FAILURE");
        assert_eq!(model.calls(), 1);
    }

    #[test]
    fn test_user_prompt() {
        assert_eq!(
            build_user_prompt("Q?", "C."),
            "Question:\nQ?\n\nContext:\nC.\n\nAnswer (follow the rules exactly):"
        );
    }
}
