//! Memory record model used by retrievers.

use chrono::{DateTime, Utc};
use parley_rs_protocol::{MemoryId, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Snippet stored in a memory collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryRecord {
    /// Record identifier.
    pub id: Uuid,
    /// Collection the record belongs to.
    pub memory_id: MemoryId,
    /// Owner of the collection.
    pub user_id: UserId,
    /// Snippet text.
    pub content: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// Build a record stamped with a fresh id and the current time.
    pub fn new(
        memory_id: impl Into<MemoryId>,
        user_id: impl Into<UserId>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            memory_id: memory_id.into(),
            user_id: user_id.into(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}
