//! Configuration types for the RAG system.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{RagError, Result};
use crate::retry::RetryPolicy;
use crate::traits::ChunkConfig;

/// Directory name used under the platform config and data directories.
const APP_DIR: &str = "rag-ground";

/// Main configuration for the RAG system.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagConfig {
    /// Chunking configuration.
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Embedding configuration.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Reranker configuration.
    #[serde(default)]
    pub reranker: RerankerConfig,

    /// Retrieval configuration.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Language model configuration.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Answer grounding rules.
    #[serde(default)]
    pub grounding: GroundingConfig,

    /// Retry policy for external calls.
    #[serde(default)]
    pub retry: RetryPolicy,
}

/// Chunking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters of overlap between consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Separators tried in order.
    #[serde(default = "default_separators")]
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            separators: default_separators(),
        }
    }
}

impl ChunkingConfig {
    /// Convert into the chunker's runtime configuration.
    pub fn to_chunk_config(&self) -> ChunkConfig {
        ChunkConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            separators: self.separators.clone(),
        }
    }
}

/// Embedding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Directory holding `model.onnx` and `tokenizer.json`.
    #[serde(default = "default_embedding_model_dir")]
    pub model_dir: PathBuf,

    /// Embedding dimension.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Maximum tokens per input.
    #[serde(default = "default_embedding_max_tokens")]
    pub max_tokens: usize,

    /// Prefix prepended to queries (asymmetric models).
    #[serde(default)]
    pub query_prefix: String,

    /// Prefix prepended to documents (asymmetric models).
    #[serde(default)]
    pub document_prefix: String,

    /// Number of threads for CPU inference.
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,

    /// Feed a `token_type_ids` input (BERT-style exports).
    #[serde(default = "default_true")]
    pub token_type_ids: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_dir: default_embedding_model_dir(),
            dimension: default_dimension(),
            max_tokens: default_embedding_max_tokens(),
            query_prefix: String::new(),
            document_prefix: String::new(),
            num_threads: default_num_threads(),
            token_type_ids: true,
        }
    }
}

/// Cross-encoder reranker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    /// Rerank merged candidates before slicing to `top_n`.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory holding `model.onnx` and `tokenizer.json`.
    #[serde(default = "default_reranker_model_dir")]
    pub model_dir: PathBuf,

    /// Maximum tokens per (query, text) pair.
    #[serde(default = "default_reranker_max_tokens")]
    pub max_tokens: usize,

    /// Number of threads for CPU inference.
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,

    /// Feed a `token_type_ids` input (BERT-style exports).
    #[serde(default = "default_true")]
    pub token_type_ids: bool,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model_dir: default_reranker_model_dir(),
            max_tokens: default_reranker_max_tokens(),
            num_threads: default_num_threads(),
            token_type_ids: true,
        }
    }
}

/// Which candidate sources feed the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    /// Lexical and dense candidates merged.
    Hybrid,

    /// Dense candidates only.
    Dense,
}

impl std::str::FromStr for RetrievalMode {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "hybrid" => Ok(Self::Hybrid),
            "dense" | "baseline" => Ok(Self::Dense),
            other => Err(RagError::config(format!(
                "unknown retrieval mode '{}' (expected hybrid or dense)",
                other
            ))),
        }
    }
}

/// Retrieval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Candidate sources.
    #[serde(default = "default_mode")]
    pub mode: RetrievalMode,

    /// Candidates requested per source, and cap on the merged pool.
    #[serde(default = "default_k")]
    pub k: usize,

    /// Reranked candidates kept for context assembly.
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Character budget of the assembled context.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,

    /// Rewrite the question into a search query before retrieval.
    #[serde(default)]
    pub rewrite_query: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            k: default_k(),
            top_n: default_top_n(),
            max_context_chars: default_max_context_chars(),
            rewrite_query: false,
        }
    }
}

/// Language model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// OpenAI-compatible chat completions endpoint.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Sampling temperature.
    #[serde(default)]
    pub temperature: f32,

    /// Upper bound on generated tokens.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            temperature: 0.0,
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

/// Rules that keep answers grounded in the context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundingConfig {
    /// Sentence returned when the answer is not in the context.
    #[serde(default = "default_fallback")]
    pub fallback: String,

    /// Boilerplate phrases stripped, with everything after them.
    #[serde(default = "default_refusal_patterns")]
    pub refusal_patterns: Vec<String>,

    /// Phrases that mark an answer as talking about the context.
    #[serde(default = "default_leak_phrases")]
    pub leak_phrases: Vec<String>,

    /// Maximum sentences in an answer.
    #[serde(default = "default_max_sentences")]
    pub max_sentences: usize,
}

impl Default for GroundingConfig {
    fn default() -> Self {
        Self {
            fallback: default_fallback(),
            refusal_patterns: default_refusal_patterns(),
            leak_phrases: default_leak_phrases(),
            max_sentences: default_max_sentences(),
        }
    }
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_chunk_size() -> usize {
    650
}

fn default_chunk_overlap() -> usize {
    120
}

fn default_separators() -> Vec<String> {
    ChunkConfig::default().separators
}

fn default_dimension() -> usize {
    384
}

fn default_embedding_max_tokens() -> usize {
    256
}

fn default_num_threads() -> usize {
    4
}

fn default_reranker_max_tokens() -> usize {
    512
}

fn default_mode() -> RetrievalMode {
    RetrievalMode::Hybrid
}

fn default_k() -> usize {
    8
}

fn default_top_n() -> usize {
    3
}

fn default_max_context_chars() -> usize {
    3500
}

fn default_base_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_max_output_tokens() -> u32 {
    220
}

fn default_fallback() -> String {
    "The provided context does not specify this.".to_string()
}

fn default_refusal_patterns() -> Vec<String> {
    ["as an ai language model", "i can't", "i cannot", "i'm unable"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_leak_phrases() -> Vec<String> {
    vec!["provided context".to_string()]
}

fn default_max_sentences() -> usize {
    5
}

fn models_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("models")
}

fn default_embedding_model_dir() -> PathBuf {
    models_dir().join("all-MiniLM-L6-v2")
}

fn default_reranker_model_dir() -> PathBuf {
    models_dir().join("ms-marco-MiniLM-L-6-v2")
}

impl RagConfig {
    /// Load configuration from file.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| RagError::Config {
            message: format!("Failed to parse config: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default paths.
    pub fn load_default() -> Result<Self> {
        // Try user config first
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join(APP_DIR).join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        // Try local config
        let local_config = PathBuf::from(format!("{}.toml", APP_DIR));
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }

    /// Reject settings the pipeline cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.retrieval.top_n == 0 {
            return Err(RagError::config("retrieval.top_n must be at least 1"));
        }
        if self.grounding.max_sentences == 0 {
            return Err(RagError::config("grounding.max_sentences must be at least 1"));
        }
        if self.grounding.fallback.trim().is_empty() {
            return Err(RagError::config("grounding.fallback must not be empty"));
        }
        if self.chunking.chunk_size == 0 {
            return Err(RagError::config("chunking.chunk_size must be at least 1"));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(RagError::config(
                "chunking.chunk_overlap must be smaller than chunking.chunk_size",
            ));
        }
        Ok(())
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| RagError::config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RagConfig::default();
        assert_eq!(config.retrieval.k, 8);
        assert_eq!(config.retrieval.top_n, 3);
        assert_eq!(config.retrieval.max_context_chars, 3500);
        assert_eq!(config.retrieval.mode, RetrievalMode::Hybrid);
        assert_eq!(config.chunking.chunk_size, 650);
        assert_eq!(config.generation.temperature, 0.0);
        assert_eq!(
            config.grounding.fallback,
            "The provided context does not specify this."
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: RagConfig = toml::from_str(
            r#"
            [retrieval]
            top_n = 5
            mode = "dense"

            [grounding]
            refusal_patterns = ["as an assistant"]
            "#,
        )
        .unwrap();

        assert_eq!(config.retrieval.top_n, 5);
        assert_eq!(config.retrieval.k, 8);
        assert_eq!(config.retrieval.mode, RetrievalMode::Dense);
        assert_eq!(config.grounding.refusal_patterns, vec!["as an assistant"]);
        assert_eq!(config.grounding.max_sentences, 5);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = RagConfig::default();
        config.retrieval.top_n = 0;
        assert!(config.validate().is_err());

        let mut config = RagConfig::default();
        config.chunking.chunk_overlap = 650;
        assert!(config.validate().is_err());

        let mut config = RagConfig::default();
        config.retrieval.k = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[retrieval]\nmax_context_chars = 1200\n").unwrap();

        let config = RagConfig::load(&path).unwrap();
        assert_eq!(config.retrieval.max_context_chars, 1200);

        std::fs::write(&path, "[retrieval\n").unwrap();
        let err = RagConfig::load(&path).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_retrieval_mode_from_str() {
        assert_eq!("hybrid".parse::<RetrievalMode>().unwrap(), RetrievalMode::Hybrid);
        assert_eq!("baseline".parse::<RetrievalMode>().unwrap(), RetrievalMode::Dense);
        assert!("sparse".parse::<RetrievalMode>().is_err());
    }

    #[test]
    fn test_toml_roundtrip_of_defaults() {
        let rendered = RagConfig::default().to_toml().unwrap();
        let parsed: RagConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.retrieval.k, 8);
    }
}
