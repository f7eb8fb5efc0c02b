//! Error types for the forage engine
//!
//! Provides a single error enum covering the failure classes the engine
//! distinguishes:
//! - Schema/configuration errors (fatal, raised at construction or open time)
//! - Document validation errors (single-document insert path)
//! - Backend/transport errors (database, embedding/completion/ranking services)
//! - Fan-out timeouts
//! - Contract violations signalled by upstream models
//!
//! Bulk operations do not route per-document failures through this enum; those
//! travel in `UpdateResult::failed_documents` so one bad document cannot abort
//! a batch.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    BlankText,

    // Schema / configuration errors (2xxx)
    ConfigurationError,
    UnknownFieldType,
    DimensionMismatch,

    // Database errors (3xxx)
    DatabaseError,
    TransactionError,

    // External model errors (4xxx)
    EmbeddingError,
    CompletionError,
    RankingError,
    UpstreamError,

    // Timeouts (5xxx)
    FanoutTimeout,

    // Contract violations (6xxx)
    ContractViolation,

    // Internal errors (9xxx)
    InternalError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::BlankText => 1002,

            // Schema / configuration (2xxx)
            ErrorCode::ConfigurationError => 2001,
            ErrorCode::UnknownFieldType => 2002,
            ErrorCode::DimensionMismatch => 2003,

            // Database (3xxx)
            ErrorCode::DatabaseError => 3001,
            ErrorCode::TransactionError => 3002,

            // External models (4xxx)
            ErrorCode::EmbeddingError => 4001,
            ErrorCode::CompletionError => 4002,
            ErrorCode::RankingError => 4003,
            ErrorCode::UpstreamError => 4004,

            // Timeouts (5xxx)
            ErrorCode::FanoutTimeout => 5001,

            // Contract violations (6xxx)
            ErrorCode::ContractViolation => 6001,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::SerializationError => 9002,
        }
    }
}

/// Engine error types
#[derive(Error, Debug)]
pub enum EngineError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Document text must not be blank")]
    BlankText,

    // Schema / configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Unknown metadata field type: {name}")]
    UnknownFieldType { name: String },

    #[error("Embedding dimension mismatch: store expects {expected}, embedder produces {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Transaction failed: {message}")]
    Transaction { message: String },

    // External model errors
    #[error("Embedding service error: {message}")]
    EmbeddingError { message: String },

    #[error("Completion service error: {message}")]
    CompletionError { message: String },

    #[error("Ranking service error: {message}")]
    RankingError { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Timeouts
    #[error("Fan-out timed out after {seconds}s")]
    FanoutTimeout { seconds: u64 },

    // Contract violations
    #[error("Contract violation: {message}")]
    ContractViolation { message: String },

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Validation { .. } => ErrorCode::ValidationError,
            EngineError::BlankText => ErrorCode::BlankText,
            EngineError::Configuration { .. } => ErrorCode::ConfigurationError,
            EngineError::UnknownFieldType { .. } => ErrorCode::UnknownFieldType,
            EngineError::DimensionMismatch { .. } => ErrorCode::DimensionMismatch,
            EngineError::Database(_) => ErrorCode::DatabaseError,
            EngineError::Transaction { .. } => ErrorCode::TransactionError,
            EngineError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            EngineError::CompletionError { .. } => ErrorCode::CompletionError,
            EngineError::RankingError { .. } => ErrorCode::RankingError,
            EngineError::HttpClient(_) => ErrorCode::UpstreamError,
            EngineError::FanoutTimeout { .. } => ErrorCode::FanoutTimeout,
            EngineError::ContractViolation { .. } => ErrorCode::ContractViolation,
            EngineError::Internal { .. } => ErrorCode::InternalError,
            EngineError::Serialization(_) => ErrorCode::SerializationError,
        }
    }

    /// Whether retrying the same call can reasonably succeed.
    ///
    /// Configuration, validation, and contract errors are terminal; transport
    /// and model errors may be transient.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Database(_)
                | EngineError::Transaction { .. }
                | EngineError::EmbeddingError { .. }
                | EngineError::CompletionError { .. }
                | EngineError::RankingError { .. }
                | EngineError::HttpClient(_)
        )
    }

    /// Whether this error was raised at construction/open time and indicates
    /// a misconfigured engine rather than bad data.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            EngineError::Configuration { .. }
                | EngineError::UnknownFieldType { .. }
                | EngineError::DimensionMismatch { .. }
        )
    }
}
