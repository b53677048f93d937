//! rag-chunk - Document loading and chunking
//!
//! This crate turns files on disk into the ordered sequence of [`Chunk`]s the
//! retrieval pipeline works on.
//!
//! # Example
//!
//! ```rust
//! use rag_chunk::{Chunker, RecursiveChunker};
//! use rag_core::{ChunkConfig, DocumentKind};
//!
//! let chunker = RecursiveChunker::new();
//! let config = ChunkConfig::default();
//! let chunks = chunker.chunk("Hello world", DocumentKind::PlainText, &config).unwrap();
//! assert_eq!(chunks.len(), 1);
//! ```

mod loader;
mod recursive;

pub use loader::{chunk_documents, load_document, load_documents, Page, SourceDocument};
pub use recursive::RecursiveChunker;

// Re-export types for convenience
pub use rag_core::{Chunk, ChunkConfig, ChunkData, Chunker, DocumentKind};
