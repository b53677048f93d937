//! rag-embed - ONNX model wrappers
//!
//! This crate provides the bi-encoder used for dense retrieval and the
//! cross-encoder used for reranking, both running on ONNX Runtime.
//!
//! # Features
//!
//! - ONNX Runtime integration for fast inference
//! - Support for asymmetric retrieval with document/query prefixes
//! - Mean pooling with attention mask and L2 normalization
//! - Batched (query, passage) scoring
//! - Deterministic mocks for running without model files

mod cross_encoder;
mod mock;
mod onnx;

pub use cross_encoder::OnnxCrossEncoder;
pub use mock::{MockEmbedder, MockScorer};
pub use onnx::{OnnxEmbedder, MODEL_FILE, TOKENIZER_FILE};

// Re-export the model traits for convenience
pub use rag_core::{Embedder, RelevanceScorer};
