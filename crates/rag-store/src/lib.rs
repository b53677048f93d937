//! rag-store - In-memory chunk index with SQLite FTS5 and sqlite-vec
//!
//! This crate holds the chunk store built at ingestion and the lexical and
//! dense candidate sources that search it.

mod schema;
mod sources;
mod sqlite;

pub use sources::{index_embeddings, KeywordSource, VectorSource};
pub use sqlite::ChunkIndex;

// Re-export schema for testing
pub use schema::{vec_schema, SCHEMA};
