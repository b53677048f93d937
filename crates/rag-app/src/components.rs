//! Model collaborators built once from configuration.

use std::sync::Arc;

use tracing::{info, warn};

use rag_core::{
    EmbeddingConfig, GenerationConfig, LanguageModel, RelevanceScorer, RerankerConfig, Result,
};
use rag_embed::{Embedder, MockEmbedder, MockScorer, OnnxCrossEncoder, OnnxEmbedder};
use rag_generate::OpenAiChatModel;

/// The ONNX bi-encoder, or the mock embedder when its files are missing.
///
/// A model that is present but fails to load is an error.
pub fn load_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    if !OnnxEmbedder::is_available(&config.model_dir) {
        warn!(
            model_dir = %config.model_dir.display(),
            "Embedding model not found, using mock embeddings"
        );
        return Ok(Arc::new(MockEmbedder::with_dimension(config.dimension)));
    }

    let embedder = OnnxEmbedder::from_config(config)?;
    info!(dimension = embedder.dimension(), "Using ONNX embedder");
    Ok(Arc::new(embedder))
}

/// The ONNX cross-encoder, the mock scorer when its files are missing, or
/// nothing when reranking is disabled.
pub fn load_scorer(config: &RerankerConfig) -> Result<Option<Arc<dyn RelevanceScorer>>> {
    if !config.enabled {
        info!("Reranking disabled");
        return Ok(None);
    }

    if !OnnxCrossEncoder::is_available(&config.model_dir) {
        warn!(
            model_dir = %config.model_dir.display(),
            "Reranker model not found, using mock scorer"
        );
        return Ok(Some(Arc::new(MockScorer::new())));
    }

    Ok(Some(Arc::new(OnnxCrossEncoder::from_config(config)?)))
}

/// The chat model for generation. A missing API key is an error.
pub fn load_language_model(config: &GenerationConfig) -> Result<Arc<dyn LanguageModel>> {
    let model = OpenAiChatModel::from_config(config)?;
    info!(model = model.model_name(), "Using chat model");
    Ok(Arc::new(model))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_models_fall_back_to_mocks() {
        let dir = tempfile::tempdir().unwrap();

        let embedding = EmbeddingConfig {
            model_dir: dir.path().to_path_buf(),
            dimension: 16,
            ..EmbeddingConfig::default()
        };
        let embedder = load_embedder(&embedding).unwrap();
        assert_eq!(embedder.dimension(), 16);

        let reranker = RerankerConfig {
            model_dir: dir.path().to_path_buf(),
            ..RerankerConfig::default()
        };
        assert!(load_scorer(&reranker).unwrap().is_some());
    }

    #[test]
    fn test_reranking_disabled() {
        let reranker = RerankerConfig {
            enabled: false,
            ..RerankerConfig::default()
        };
        assert!(load_scorer(&reranker).unwrap().is_none());
    }
}
