//! Error types for Smriti

use thiserror::Error;
use uuid::Uuid;

/// Main error type for Smriti operations
#[derive(Error, Debug)]
pub enum SmritiError {
    /// Malformed or missing required input (empty session id, empty content, etc.)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation references an unknown memory id
    #[error("Memory not found: {0}")]
    NotFound(Uuid),

    /// An injected capability (embedding, summarization) failed or timed out
    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// A configured record cap was reached; includes guidance for the caller
    #[error("Quota exceeded: {current} of {limit} records stored for this session")]
    QuotaExceeded { current: usize, limit: usize },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for Smriti operations
pub type Result<T> = std::result::Result<T, SmritiError>;
