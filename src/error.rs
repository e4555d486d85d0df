//! Error types for the indexing and retrieval engine
//!
//! This module provides structured error types using thiserror for better
//! error handling and actionable error messages.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for index and search operations
#[derive(Error, Debug)]
pub enum SearchError {
    /// Malformed query input: invalid regex pattern or filter predicate.
    /// Surfaced directly to the caller, never retried internally.
    #[error("Invalid query: {reason}")]
    InvalidQuery { reason: String },

    /// The external embedding provider failed or timed out
    #[error(
        "Embedding provider unavailable: {reason}. Semantic results were excluded from this query."
    )]
    EmbeddingUnavailable { reason: String },

    /// Structural mismatch between the text index, vector index, and document store
    #[error("Index appears to be corrupted: {reason}")]
    IndexCorrupted { reason: String },

    /// Saved search lookup miss
    #[error("No saved search named '{name}'")]
    NotFound { name: String },

    /// Failed to persist or load index state
    #[error("Failed to persist index state at '{path}': {source}")]
    Persistence {
        path: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Vector dimensionality did not match the index
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}. Ensure all vectors come from the same embedding model."
    )]
    DimensionMismatch { expected: usize, actual: usize },

    /// Embedding model identity did not match the index
    #[error(
        "Embedding model mismatch: index was built with '{expected}', got '{actual}'. Mixing models requires a full reindex."
    )]
    ModelMismatch { expected: String, actual: String },

    /// Persisted index format is from an incompatible version
    #[error("Unsupported index format version: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },

    /// Configuration errors
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    /// General errors for cases where no structured variant applies
    #[error("{0}")]
    General(String),
}

impl SearchError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::InvalidQuery { .. } => "INVALID_QUERY",
            Self::EmbeddingUnavailable { .. } => "EMBEDDING_UNAVAILABLE",
            Self::IndexCorrupted { .. } => "INDEX_CORRUPTED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Persistence { .. } => "PERSISTENCE_ERROR",
            Self::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            Self::ModelMismatch { .. } => "MODEL_MISMATCH",
            Self::VersionMismatch { .. } => "VERSION_MISMATCH",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::General(_) => "GENERAL_ERROR",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::IndexCorrupted { .. } => vec![
                "Run a full reindex to rebuild the text and vector indexes",
                "Check for disk errors or filesystem corruption",
            ],
            Self::EmbeddingUnavailable { .. } => vec![
                "Check that the embedding provider is reachable",
                "Retry the query, or select only the text/regex providers",
            ],
            Self::ModelMismatch { .. } | Self::DimensionMismatch { .. } => vec![
                "Run a full reindex after changing the embedding model",
                "Mixed-model vector indexes are not supported",
            ],
            Self::Persistence { .. } => vec![
                "Check disk space and permissions in the index directory",
                "The in-memory index is still consistent; retry the save",
            ],
            Self::VersionMismatch { .. } => vec!["Rebuild the index with the current version"],
            Self::InvalidQuery { .. } => vec!["Fix the query pattern or filter and retry"],
            _ => vec![],
        }
    }
}

/// Result type alias for index and search operations
pub type SearchResult<T> = Result<T, SearchError>;

/// Helper trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T, SearchError>;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, msg: &str) -> Result<T, SearchError> {
        self.map_err(|e| SearchError::General(format!("{msg}: {e}")))
    }
}
