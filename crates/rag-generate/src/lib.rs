//! Grounded generation for rag-ground.
//!
//! Turns the reranked chunks of one query into a bounded context and asks a
//! language model for an answer that may only use that context:
//!
//! - [`assemble`] builds the character-budgeted context and
//!   [`select_within_budget`] reports which texts it kept
//! - [`GroundingPolicy`] sanitizes and checks the model output
//! - [`GroundedGenerator`] runs the guard, call and check pipeline
//! - [`OpenAiChatModel`] talks to an OpenAI-compatible endpoint
//! - [`QueryRewriter`] turns a question into a search query

pub mod context;
pub mod generator;
pub mod grounding;
pub mod openai;
pub mod rewrite;

pub use context::{assemble, select_within_budget, CONTEXT_SEPARATOR};
pub use generator::{build_user_prompt, GroundedGenerator, SYSTEM_PROMPT};
pub use grounding::GroundingPolicy;
pub use openai::OpenAiChatModel;
pub use rewrite::QueryRewriter;

pub use rag_core::{Answer, CompletionRequest, FallbackReason, LanguageModel};
