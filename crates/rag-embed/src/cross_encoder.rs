//! ONNX cross-encoder relevance scorer.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ort::session::Session;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use rag_core::{RagError, RelevanceScorer, RerankerConfig, Result};

use crate::onnx::{
    build_session, load_tokenizer, run_blocking, BatchInputs, MODEL_FILE, TOKENIZER_FILE,
};

/// Scores (query, passage) pairs with a sequence-classification model such as
/// ms-marco-MiniLM-L-6-v2. The score is the raw first logit.
pub struct OnnxCrossEncoder {
    model: Arc<ScorerModel>,
}

struct ScorerModel {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    token_type_ids: bool,
}

impl OnnxCrossEncoder {
    /// Create a scorer from the model directory named in the configuration.
    pub fn from_config(config: &RerankerConfig) -> Result<Self> {
        if !Self::is_available(&config.model_dir) {
            return Err(RagError::embedding(format!(
                "Reranker model files not found in {:?}",
                config.model_dir
            )));
        }

        let session = build_session(&config.model_dir.join(MODEL_FILE), config.num_threads)?;
        let tokenizer = load_tokenizer(&config.model_dir.join(TOKENIZER_FILE), config.max_tokens)?;

        info!(max_tokens = config.max_tokens, "Cross-encoder initialized");

        Ok(Self {
            model: Arc::new(ScorerModel {
                session: Mutex::new(session),
                tokenizer,
                token_type_ids: config.token_type_ids,
            }),
        })
    }

    /// Whether the model files exist in `model_dir`.
    pub fn is_available(model_dir: &Path) -> bool {
        model_dir.join(MODEL_FILE).exists() && model_dir.join(TOKENIZER_FILE).exists()
    }

    /// Score pairs on the blocking pool.
    async fn score_pairs(&self, query: &str, texts: &[&str]) -> Result<Vec<f32>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = Arc::clone(&self.model);
        let pairs: Vec<(String, String)> = texts
            .iter()
            .map(|t| (query.to_string(), t.to_string()))
            .collect();
        run_blocking("scorer", move || model.score_pairs(pairs)).await
    }
}

impl ScorerModel {
    fn score_pairs(&self, pairs: Vec<(String, String)>) -> Result<Vec<f32>> {
        let expected = pairs.len();
        let encodings = self
            .tokenizer
            .encode_batch(pairs, true)
            .map_err(|e| RagError::permanent("scorer", format!("Tokenization failed: {}", e)))?;

        let inputs = BatchInputs::from_encodings(&encodings)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| RagError::internal(format!("Failed to lock session: {}", e)))?;

        let outputs = if self.token_type_ids {
            session.run(ort::inputs![
                "input_ids" => inputs.input_ids,
                "attention_mask" => inputs.attention_mask,
                "token_type_ids" => inputs.token_type_ids
            ])
        } else {
            session.run(ort::inputs![
                "input_ids" => inputs.input_ids,
                "attention_mask" => inputs.attention_mask
            ])
        }
        .map_err(|e| RagError::permanent("scorer", format!("Inference failed: {}", e)))?;

        let (_, logits) = outputs
            .iter()
            .next()
            .ok_or_else(|| RagError::permanent("scorer", "No output tensor found"))?;

        let view = logits
            .try_extract_array::<f32>()
            .map_err(|e| RagError::permanent("scorer", format!("Failed to extract tensor: {}", e)))?;

        let shape = view.shape().to_vec();
        debug!(pairs = expected, ?shape, "Scored pairs");

        let scores: Vec<f32> = match shape.len() {
            1 => (0..shape[0]).map(|i| view[[i]]).collect(),
            2 => (0..shape[0]).map(|i| view[[i, 0]]).collect(),
            _ => {
                return Err(RagError::permanent(
                    "scorer",
                    format!("Unexpected logits shape: {:?}", shape),
                ))
            }
        };

        if scores.len() != expected {
            return Err(RagError::permanent(
                "scorer",
                format!("Expected {} scores, got {}", expected, scores.len()),
            ));
        }

        Ok(scores)
    }
}

#[async_trait]
impl RelevanceScorer for OnnxCrossEncoder {
    async fn score(&self, query: &str, text: &str) -> Result<f32> {
        self.score_pairs(query, &[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::permanent("scorer", "No score returned"))
    }

    async fn score_batch(&self, query: &str, texts: &[&str]) -> Result<Vec<f32>> {
        self.score_pairs(query, texts).await
    }
}
