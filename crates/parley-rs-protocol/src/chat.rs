//! Chat, prompt and memory records exchanged with storage collaborators.

use crate::{ChatId, MemoryId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A conversation owned by a single user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chat {
    /// Chat identifier.
    pub id: ChatId,
    /// Owner of the chat.
    pub user_id: UserId,
    /// System prompt stored with the chat.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Stored prompt the system prompt was resolved from.
    #[serde(default)]
    pub system_prompt_id: Option<String>,
}

/// Message stored in a chat transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    /// True for human turns, false for assistant turns.
    pub is_user_message: bool,
    /// Message content.
    pub content: String,
    /// Chat the message belongs to.
    pub chat_id: ChatId,
    /// Creation timestamp; transcripts are ordered by it.
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Build a human message stamped with the current time.
    pub fn user(chat_id: impl Into<ChatId>, content: impl Into<String>) -> Self {
        Self {
            is_user_message: true,
            content: content.into(),
            chat_id: chat_id.into(),
            created_at: Utc::now(),
        }
    }

    /// Build an assistant message stamped with the current time.
    pub fn assistant(chat_id: impl Into<ChatId>, content: impl Into<String>) -> Self {
        Self {
            is_user_message: false,
            content: content.into(),
            chat_id: chat_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// Reusable system prompt stored by the prompt collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Prompt {
    /// Prompt identifier (UUID).
    pub id: String,
    /// URL-friendly alternative identifier.
    pub slug: String,
    /// Prompt text.
    pub prompt: String,
    /// Number of times the prompt was used.
    #[serde(default)]
    pub use_count: u64,
}

/// Retrieval result returned by the memory collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryMatch {
    /// Retrieved snippet.
    pub content: String,
    /// Relevance score, higher is better.
    pub score: f32,
    /// Memory collection the snippet came from.
    pub source_id: MemoryId,
}

/// Boundary request for creating a chat.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CreateChatRequest {
    /// Literal system prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Stored prompt id or slug.
    #[serde(default)]
    pub system_prompt_id: Option<String>,
}
