//! Wire types for Parley chats, generation requests and streamed results.

mod chat;
mod generation;

pub use chat::{Chat, ChatMessage, CreateChatRequest, MemoryMatch, Prompt};
pub use generation::{
    ErrorKind, GenerateRequest, GenerateResponse, MemoryIds, PartialResult, ProviderOptions,
    RateLimitStatus, TokenUsage,
};

/// Identifier of a chat.
pub type ChatId = String;
/// Identifier of an end user.
pub type UserId = String;
/// Identifier of the project a user belongs to.
pub type ProjectId = String;
/// Identifier of a memory collection.
pub type MemoryId = String;
