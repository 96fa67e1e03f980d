//! Memory retrieval for prompt context in Parley.

pub mod context;
pub mod error;
pub mod model;
pub mod retriever;

/// Context block formatting.
pub use context::fill_context;
/// Memory error type.
pub use error::MemoryError;
/// Stored memory snippet.
pub use model::MemoryRecord;
/// Retriever interface and default file implementation.
pub use retriever::{FileMemoryRetriever, MemoryRetriever, RecallOptions};
