//! Core domain types for the RAG system.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use ulid::Ulid;

/// Metadata key holding the source file name.
pub const META_DOC_NAME: &str = "doc_name";

/// Metadata key holding the 1-based page number.
pub const META_PAGE: &str = "page";

/// Source document format, determines loading and splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Markdown,
    PlainText,
}

impl DocumentKind {
    /// Detect the kind from a file extension, if supported.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "md" | "markdown" => Some(Self::Markdown),
            "txt" | "text" => Some(Self::PlainText),
            _ => None,
        }
    }

    /// Detect the kind from a file path, if supported.
    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pdf => "PDF",
            Self::Markdown => "Markdown",
            Self::PlainText => "Plain Text",
        };
        write!(f, "{}", s)
    }
}

/// A span of source-document text plus provenance, the unit of retrieval.
///
/// Chunks are created once at ingestion and never mutated afterwards, so the
/// fields are private and only exposed through accessors. Two chunks are the
/// same candidate when their text is byte-for-byte identical; the `id` is a
/// storage key, not an identity for deduplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    id: Ulid,
    text: String,
    source_doc: String,
    page: Option<u32>,
    chunk_index: u32,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
}

impl Chunk {
    /// Create a new chunk from text and its source document name.
    pub fn new(text: impl Into<String>, source_doc: impl Into<String>) -> Self {
        let source_doc = source_doc.into();
        let mut metadata = HashMap::new();
        metadata.insert(
            META_DOC_NAME.to_string(),
            serde_json::Value::String(source_doc.clone()),
        );

        Self {
            id: Ulid::new(),
            text: text.into(),
            source_doc,
            page: None,
            chunk_index: 0,
            metadata,
        }
    }

    /// Set the page the chunk was taken from.
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self.metadata
            .insert(META_PAGE.to_string(), serde_json::Value::from(page));
        self
    }

    /// Set the position of the chunk within its source document.
    pub fn with_index(mut self, chunk_index: u32) -> Self {
        self.chunk_index = chunk_index;
        self
    }

    /// Attach an extra metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Rebuild a chunk from stored parts, keeping its id.
    pub fn from_parts(
        id: Ulid,
        text: String,
        source_doc: String,
        page: Option<u32>,
        chunk_index: u32,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            id,
            text,
            source_doc,
            page,
            chunk_index,
            metadata,
        }
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn source_doc(&self) -> &str {
        &self.source_doc
    }

    pub fn page(&self) -> Option<u32> {
        self.page
    }

    pub fn chunk_index(&self) -> u32 {
        self.chunk_index
    }

    pub fn metadata(&self) -> &HashMap<String, serde_json::Value> {
        &self.metadata
    }

    /// Whether the chunk carries any non-whitespace text.
    pub fn has_content(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// A chunk with the relevance score assigned by the reranker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedChunk {
    /// The scored chunk.
    pub chunk: Chunk,

    /// Cross-encoder relevance score (higher is better).
    pub score: f32,
}

impl RankedChunk {
    pub fn new(chunk: Chunk, score: f32) -> Self {
        Self { chunk, score }
    }
}

/// Why the generator answered with the fallback sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// The assembled context was empty or whitespace-only.
    EmptyContext,

    /// Nothing was left of the model output after sanitation.
    EmptyAfterSanitize,

    /// The model referred to the context instead of answering from it.
    ContextLeak,

    /// The model itself answered with the fallback sentence.
    NotFound,
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::EmptyContext => "empty context",
            Self::EmptyAfterSanitize => "empty after sanitize",
            Self::ContextLeak => "context leak",
            Self::NotFound => "not found in context",
        };
        write!(f, "{}", s)
    }
}

/// The result of grounded generation.
///
/// Either a sanitized, length-bounded model answer, or the fallback sentence.
/// The fallback sentence itself is configuration, so it is carried alongside
/// the reason rather than hard-coded here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Model output that passed every grounding check.
    Grounded(String),

    /// The configured fallback sentence.
    Fallback {
        reason: FallbackReason,
        text: String,
    },
}

impl Answer {
    /// The text handed back to the caller.
    pub fn text(&self) -> &str {
        match self {
            Self::Grounded(text) => text,
            Self::Fallback { text, .. } => text,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }

    pub fn fallback_reason(&self) -> Option<FallbackReason> {
        match self {
            Self::Grounded(_) => None,
            Self::Fallback { reason, .. } => Some(*reason),
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Grounded(text) => text,
            Self::Fallback { text, .. } => text,
        }
    }
}

impl std::fmt::Display for Answer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text())
    }
}

/// Caller-facing result of answering one question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutcome {
    /// The question as asked.
    pub question: String,

    /// The final answer text.
    pub answer: String,

    /// Texts of the chunks handed to the context assembler, in rank order.
    pub contexts: Vec<String>,

    /// Set when the answer is the fallback sentence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackReason>,

    /// End-to-end latency in milliseconds.
    #[serde(default)]
    pub latency_ms: u64,
}

/// An evaluation question with its reference answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalQuestion {
    pub question: String,
    pub ground_truth: String,
}

/// One row of evaluation output, consumed by external scoring tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalRecord {
    pub question: String,
    pub answer: String,
    pub contexts: Vec<String>,
    pub ground_truth: String,
}

/// Statistics about the indexed corpus.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {
    /// Number of distinct source documents.
    pub documents: u64,

    /// Number of chunks.
    pub chunks: u64,

    /// Number of stored embeddings.
    pub embeddings: u64,
}
