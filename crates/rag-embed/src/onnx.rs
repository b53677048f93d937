//! ONNX-based embedding model implementation.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::ArrayViewD;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{Encoding, Tokenizer, TruncationParams};
use tracing::{debug, info};

use rag_core::{Embedder, EmbeddingConfig, RagError, Result};

/// File names expected inside a model directory.
pub const MODEL_FILE: &str = "model.onnx";
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Run model work on the blocking pool so the caller's timeout can elapse.
pub(crate) async fn run_blocking<T, F>(service: &str, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| RagError::internal(format!("{} inference task failed: {}", service, e)))?
}

/// Build an inference session for `model_path`.
pub(crate) fn build_session(model_path: &Path, num_threads: usize) -> Result<Session> {
    info!("Loading ONNX model from {:?}", model_path);

    Session::builder()
        .map_err(|e| RagError::embedding(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| RagError::embedding(format!("Failed to set optimization level: {}", e)))?
        .with_intra_threads(num_threads.max(1))
        .map_err(|e| RagError::embedding(format!("Failed to set thread count: {}", e)))?
        .commit_from_file(model_path)
        .map_err(|e| RagError::embedding(format!("Failed to load model: {}", e)))
}

/// Load a tokenizer that truncates inputs to `max_tokens`.
pub(crate) fn load_tokenizer(tokenizer_path: &Path, max_tokens: usize) -> Result<Tokenizer> {
    info!("Loading tokenizer from {:?}", tokenizer_path);

    let mut tokenizer = Tokenizer::from_file(tokenizer_path)
        .map_err(|e| RagError::embedding(format!("Failed to load tokenizer: {}", e)))?;

    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: max_tokens,
            ..Default::default()
        }))
        .map_err(|e| RagError::embedding(format!("Failed to configure truncation: {}", e)))?;

    Ok(tokenizer)
}

/// Padded `[batch, seq]` input tensors for a batch of encodings.
pub(crate) struct BatchInputs {
    pub input_ids: Tensor<i64>,
    pub attention_mask: Tensor<i64>,
    pub token_type_ids: Tensor<i64>,
    pub max_len: usize,
}

impl BatchInputs {
    pub fn from_encodings(encodings: &[Encoding]) -> Result<Self> {
        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);
        let batch_size = encodings.len();

        let mut input_ids = vec![0i64; batch_size * max_len];
        let mut attention_mask = vec![0i64; batch_size * max_len];
        let mut token_type_ids = vec![0i64; batch_size * max_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            let types = encoding.get_type_ids();

            for j in 0..ids.len() {
                input_ids[i * max_len + j] = ids[j] as i64;
                attention_mask[i * max_len + j] = mask[j] as i64;
                token_type_ids[i * max_len + j] = types[j] as i64;
            }
        }

        let shape = vec![batch_size, max_len];
        let tensor = |data: Vec<i64>| {
            Tensor::from_array((shape.clone(), data))
                .map_err(|e| RagError::embedding(format!("Failed to create input tensor: {}", e)))
        };

        Ok(Self {
            input_ids: tensor(input_ids)?,
            attention_mask: tensor(attention_mask)?,
            token_type_ids: tensor(token_type_ids)?,
            max_len,
        })
    }
}

/// ONNX bi-encoder embedder (all-MiniLM-L6-v2 or a compatible export).
pub struct OnnxEmbedder {
    model: Arc<EmbeddingModel>,
}

/// Loaded model state, shared with blocking inference tasks.
struct EmbeddingModel {
    /// ONNX inference session (wrapped in Mutex for interior mutability).
    session: Mutex<Session>,

    /// Tokenizer for the model.
    tokenizer: Tokenizer,

    /// Embedding dimension.
    dimension: usize,

    /// Prefix for documents (asymmetric models).
    document_prefix: String,

    /// Prefix for queries (asymmetric models).
    query_prefix: String,

    /// Whether the model takes `token_type_ids`.
    token_type_ids: bool,
}

impl OnnxEmbedder {
    /// Create an embedder from the model directory named in the configuration.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        if !Self::is_available(&config.model_dir) {
            return Err(RagError::embedding(format!(
                "Model files not found in {:?}",
                config.model_dir
            )));
        }

        let session = build_session(&config.model_dir.join(MODEL_FILE), config.num_threads)?;
        let tokenizer = load_tokenizer(&config.model_dir.join(TOKENIZER_FILE), config.max_tokens)?;

        info!(
            "Embedder initialized: dim={}, max_tokens={}",
            config.dimension, config.max_tokens
        );

        Ok(Self {
            model: Arc::new(EmbeddingModel {
                session: Mutex::new(session),
                tokenizer,
                dimension: config.dimension,
                document_prefix: config.document_prefix.clone(),
                query_prefix: config.query_prefix.clone(),
                token_type_ids: config.token_type_ids,
            }),
        })
    }

    /// Whether the model files exist in `model_dir`.
    pub fn is_available(model_dir: &Path) -> bool {
        model_dir.join(MODEL_FILE).exists() && model_dir.join(TOKENIZER_FILE).exists()
    }

    /// Embed prefixed texts on the blocking pool.
    async fn embed(&self, prefixed: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if prefixed.is_empty() {
            return Ok(Vec::new());
        }

        let model = Arc::clone(&self.model);
        run_blocking("embedder", move || model.embed_batch(prefixed)).await
    }
}

impl EmbeddingModel {
    /// Embed a batch of already prefixed texts.
    fn embed_batch(&self, prefixed: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let encodings = self
            .tokenizer
            .encode_batch(prefixed, true)
            .map_err(|e| RagError::embedding(format!("Tokenization failed: {}", e)))?;

        let inputs = BatchInputs::from_encodings(&encodings)?;

        debug!(
            "Embedding batch: size={}, max_len={}",
            encodings.len(),
            inputs.max_len
        );

        let mut session = self
            .session
            .lock()
            .map_err(|e| RagError::embedding(format!("Failed to lock session: {}", e)))?;

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
        .map_err(|e| RagError::embedding(format!("Inference failed: {}", e)))?;

        // Models name their outputs differently; the first one holds the hidden states.
        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| RagError::embedding("No output tensor found"))?;

        let view = output
            .try_extract_array::<f32>()
            .map_err(|e| RagError::embedding(format!("Failed to extract tensor: {}", e)))?;

        let shape_dims: Vec<usize> = view.shape().to_vec();
        debug!("Output shape: {:?}", shape_dims);

        let embeddings = match shape_dims.len() {
            // (batch_size, seq_len, hidden_dim) - need mean pooling
            3 => mean_pool(&view, &encodings),
            // (batch_size, hidden_dim) - already pooled
            2 => (0..shape_dims[0])
                .map(|i| l2_normalize((0..shape_dims[1]).map(|j| view[[i, j]]).collect()))
                .collect(),
            _ => {
                return Err(RagError::embedding(format!(
                    "Unexpected output shape: {:?}",
                    shape_dims
                )))
            }
        };

        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.dimension) {
            return Err(RagError::embedding(format!(
                "Model produced dimension {}, configured {}",
                bad.len(),
                self.dimension
            )));
        }

        Ok(embeddings)
    }
}

/// Mean pooling over the sequence dimension, weighted by the attention mask.
fn mean_pool(tensor: &ArrayViewD<'_, f32>, encodings: &[Encoding]) -> Vec<Vec<f32>> {
    let shape = tensor.shape();
    let seq_len = shape[1];
    let hidden_dim = shape[2];

    encodings
        .iter()
        .enumerate()
        .map(|(i, encoding)| {
            let mask = encoding.get_attention_mask();
            let mut sum = vec![0.0f32; hidden_dim];
            let mut valid = 0usize;

            for (j, &m) in mask.iter().enumerate().take(seq_len) {
                if m == 1 {
                    valid += 1;
                    for (k, s) in sum.iter_mut().enumerate() {
                        *s += tensor[[i, j, k]];
                    }
                }
            }

            if valid == 0 {
                return sum;
            }

            l2_normalize(sum.iter().map(|s| s / valid as f32).collect())
        })
        .collect()
}

/// L2 normalize a vector.
pub(crate) fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let prefix = &self.model.document_prefix;
        self.embed(texts.iter().map(|t| format!("{}{}", prefix, t)).collect())
            .await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let prefixed = format!("{}{}", self.model.query_prefix, text);
        self.embed(vec![prefixed])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::embedding("No embedding returned"))
    }

    fn dimension(&self) -> usize {
        self.model.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_core::{with_retry, RetryPolicy};
    use std::time::{Duration, Instant};

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(vec![3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        assert_eq!(l2_normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_missing_model_reported() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!OnnxEmbedder::is_available(dir.path()));

        let config = EmbeddingConfig {
            model_dir: dir.path().to_path_buf(),
            ..EmbeddingConfig::default()
        };
        let err = OnnxEmbedder::from_config(&config).err().unwrap();
        assert_eq!(err.error_code(), "EMBEDDING_ERROR");
    }

    #[tokio::test]
    async fn test_blocking_inference_honours_timeout() {
        let policy = RetryPolicy {
            max_attempts: 1,
            base_delay_ms: 1,
            max_delay_ms: 1,
            timeout_ms: 50,
        };

        let started = Instant::now();
        let result = with_retry("embedder", &policy, || {
            run_blocking("embedder", || {
                std::thread::sleep(Duration::from_millis(400));
                Ok(vec![0.0f32])
            })
        })
        .await;

        assert!(started.elapsed() < Duration::from_millis(400));
        match result {
            Err(RagError::Timeout { service, timeout_ms }) => {
                assert_eq!(service, "embedder");
                assert_eq!(timeout_ms, 50);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_blocking_inference_returns_result() {
        let value = run_blocking("embedder", || Ok(7usize)).await.unwrap();
        assert_eq!(value, 7);

        let err = run_blocking::<usize, _>("embedder", || Err(RagError::embedding("bad input")))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "EMBEDDING_ERROR");
    }
}
