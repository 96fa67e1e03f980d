//! Error types for memory retrieval.

/// Errors returned by memory retrievers.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Memory id cannot name a collection.
    #[error("invalid memory id: {0}")]
    InvalidMemoryId(String),
    /// Backend could not serve the query.
    #[error("memory backend unavailable: {0}")]
    Unavailable(String),
}
