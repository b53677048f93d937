//! rag-core - Core types and traits for the RAG system
//!
//! This crate provides the foundational types, traits, error handling,
//! configuration and retry policy shared by the retrieval and grounded
//! generation pipeline.

pub mod config;
pub mod error;
pub mod retry;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::{RagError, Result};
pub use retry::{with_retry, RetryPolicy};
pub use traits::*;
pub use types::*;
