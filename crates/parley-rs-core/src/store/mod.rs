//! Storage collaborators consumed by the core.
//!
//! Persistence itself lives outside the gateway; these traits are the narrow
//! surface the core calls. `InMemoryStore` implements all of them and
//! `JsonlChatStore` persists chats for local deployments.

mod jsonl;
mod memory;

pub use jsonl::JsonlChatStore;
pub use memory::InMemoryStore;

use crate::usage::RequestLog;
use parley_rs_protocol::{Chat, ChatId, ChatMessage, ProjectId, Prompt, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by storage collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unsupported schema version: {0}")]
    UnsupportedSchema(u32),
    #[error("missing chat metadata")]
    MissingMetadata,
    #[error("unknown chat: {0}")]
    UnknownChat(ChatId),
    #[error("unknown prompt: {0}")]
    UnknownPrompt(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Chats and their append-only transcripts.
///
/// Implementations serialize appends per chat.
pub trait ChatStore: Send + Sync {
    fn create_chat(
        &self,
        user_id: &UserId,
        system_prompt: Option<String>,
        system_prompt_id: Option<String>,
    ) -> Result<Chat, StoreError>;

    fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>, StoreError>;

    /// Messages of a chat owned by `user_id`, oldest first. Empty when the
    /// chat is unknown or owned by someone else.
    fn chat_messages(&self, user_id: &UserId, chat_id: &str)
    -> Result<Vec<ChatMessage>, StoreError>;

    fn append_message(
        &self,
        chat_id: &str,
        is_user_message: bool,
        content: &str,
    ) -> Result<ChatMessage, StoreError>;
}

/// Stored system prompts.
pub trait PromptStore: Send + Sync {
    /// Look a prompt up by UUID or slug.
    fn prompt_by_id_or_slug(&self, id: &str) -> Result<Option<Prompt>, StoreError>;
    fn update_prompt_use(&self, id: &str, use_count: u64) -> Result<(), StoreError>;
}

/// Sink for billed requests.
pub trait UsageRecorder: Send + Sync {
    fn log_request(&self, entry: &RequestLog) -> Result<(), StoreError>;
}

/// Provider/model pair registered under a project alias.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelAlias {
    pub provider: String,
    pub model: String,
}

/// Per-project custom aliases.
pub trait AliasStore: Send + Sync {
    fn model_by_alias(
        &self,
        alias: &str,
        project_id: &ProjectId,
    ) -> Result<Option<ModelAlias>, StoreError>;
}
