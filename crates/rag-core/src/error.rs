//! Error types for the RAG system.

use thiserror::Error;

/// Result type alias using RagError.
pub type Result<T> = std::result::Result<T, RagError>;

/// Errors that can occur in the RAG system.
#[derive(Error, Debug)]
pub enum RagError {
    /// No chunks are indexed, so nothing can be retrieved.
    #[error("No documents indexed")]
    EmptyCorpus,

    /// An external collaborator (search index, scorer, model) failed.
    #[error("{service} failed: {message}")]
    ExternalService {
        service: String,
        message: String,
        retryable: bool,
    },

    /// A scoped timeout elapsed around an external call.
    #[error("{service} timed out after {timeout_ms}ms")]
    Timeout { service: String, timeout_ms: u64 },

    /// Invalid argument provided.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Failed to load documents from disk.
    #[error("Failed to load {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    /// Database error.
    #[error("Database error: {message}")]
    Database { message: String },

    /// Embedding or scoring model error.
    #[error("Embedding error: {message}")]
    Embedding { message: String },

    /// Chunking error.
    #[error("Chunking error: {message}")]
    Chunking { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RagError {
    /// Create an external service error that is worth retrying.
    pub fn transient(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
            retryable: true,
        }
    }

    /// Create an external service error that retrying will not fix.
    pub fn permanent(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
            retryable: false,
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create an embedding error.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Create a chunking error.
    pub fn chunking(message: impl Into<String>) -> Self {
        Self::Chunking {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether a retry of the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ExternalService { retryable, .. } => *retryable,
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Get a stable error code for reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyCorpus => "EMPTY_CORPUS",
            Self::ExternalService { .. } => "EXTERNAL_SERVICE_FAILURE",
            Self::Timeout { .. } => "TIMEOUT",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::LoadFailed { .. } => "LOAD_FAILED",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Embedding { .. } => "EMBEDDING_ERROR",
            Self::Chunking { .. } => "CHUNKING_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}
