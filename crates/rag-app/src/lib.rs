//! rag-app - Question answering over an ingested corpus
//!
//! This crate wires the pipeline together behind one caller-facing type:
//!
//! - [`RagSession`]: ingest a corpus once, then answer questions with the
//!   texts of the chunks used as context
//! - [`components`]: build the model collaborators from configuration
//! - [`eval`]: read evaluation questions and write records for external
//!   scoring tools

pub mod components;
pub mod eval;
mod session;

pub use session::RagSession;

pub use rag_core::{EvalQuestion, EvalRecord, QueryOutcome, RagConfig, RetrievalMode};
