//! Generation requests, streamed partial results and usage counters.

use crate::{ChatId, MemoryId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Input/output token counters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt.
    pub input: u32,
    /// Tokens produced by the model.
    pub output: u32,
}

impl TokenUsage {
    /// Create a usage value.
    pub fn new(input: u32, output: u32) -> Self {
        Self { input, output }
    }

    /// Add another usage value to this one.
    pub fn add(&mut self, other: TokenUsage) {
        self.input = self.input.saturating_add(other.input);
        self.output = self.output.saturating_add(other.output);
    }

    /// Fold a streamed chunk into a running total.
    ///
    /// Chunks repeat the attempt's input count, so input is kept at its
    /// maximum while output is summed.
    pub fn absorb_chunk(&mut self, chunk: TokenUsage) {
        self.input = self.input.max(chunk.input);
        self.output = self.output.saturating_add(chunk.output);
    }
}

/// Stable error classification visible at the boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or missing request fields.
    InputInvalid,
    /// Chat or prompt absent, or not owned by the caller.
    NotFound,
    /// Alias resolves to no known provider.
    UnknownModelProvider,
    /// The user's quota is exhausted.
    RateLimitReached,
    /// The project's quota is exhausted.
    ProjectRateLimitReached,
    /// Quota status was missing or unrecognized.
    UnknownError,
    /// Generation retries were exhausted.
    GenerationFailed,
    /// Any lower-layer failure not otherwise classified.
    InternalError,
}

impl ErrorKind {
    /// HTTP-equivalent status code for this kind.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::UnknownModelProvider | ErrorKind::InputInvalid => 400,
            _ => 500,
        }
    }

    /// Return the kind as a snake_case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InputInvalid => "input_invalid",
            ErrorKind::NotFound => "not_found",
            ErrorKind::UnknownModelProvider => "unknown_model_provider",
            ErrorKind::RateLimitReached => "rate_limit_reached",
            ErrorKind::ProjectRateLimitReached => "project_rate_limit_reached",
            ErrorKind::UnknownError => "unknown_error",
            ErrorKind::GenerationFailed => "generation_failed",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

/// Quota decision computed upstream for a request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitStatus {
    /// Usage is under every limit.
    Ok,
    /// The user reached their limit.
    UserReached,
    /// The project reached its limit.
    ProjectReached,
    /// Status could not be determined.
    Unknown,
}

/// Options forwarded verbatim to a provider adapter.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ProviderOptions {
    /// Sequences at which the provider must stop generating.
    #[serde(default)]
    pub stop_words: Option<Vec<String>>,
}

/// One item of a generation stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartialResult {
    /// Text delta for this chunk.
    pub text: String,
    /// Usage attributed to this chunk.
    pub token_usage: TokenUsage,
    /// True for the final item of the stream.
    pub terminal: bool,
    /// Set only on a terminal failure marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

impl PartialResult {
    /// A non-terminal content chunk.
    pub fn chunk(text: impl Into<String>, token_usage: TokenUsage) -> Self {
        Self {
            text: text.into(),
            token_usage,
            terminal: false,
            error: None,
        }
    }

    /// The terminal marker of a successful stream.
    pub fn completed() -> Self {
        Self {
            text: String::new(),
            token_usage: TokenUsage::default(),
            terminal: true,
            error: None,
        }
    }

    /// The terminal marker of a failed stream.
    pub fn failed(kind: ErrorKind) -> Self {
        Self {
            text: String::new(),
            token_usage: TokenUsage::default(),
            terminal: true,
            error: Some(kind),
        }
    }

    /// True when this item terminates the stream with an error.
    pub fn is_failure(&self) -> bool {
        self.terminal && self.error.is_some()
    }
}

/// Memory ids may be sent as a single string or as an array.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum MemoryIds {
    /// A single memory id.
    One(MemoryId),
    /// Several memory ids.
    Many(Vec<MemoryId>),
}

impl MemoryIds {
    /// Flatten into a list, dropping empty ids.
    pub fn into_ids(self) -> Vec<MemoryId> {
        let ids = match self {
            MemoryIds::One(id) => vec![id],
            MemoryIds::Many(ids) => ids,
        };
        ids.into_iter().filter(|id| !id.trim().is_empty()).collect()
    }
}

/// Boundary request for a generation.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GenerateRequest {
    /// The user's task or message.
    pub task: String,
    /// Model alias; empty selects the default model.
    #[serde(default, rename = "provider")]
    pub model_alias: String,
    /// Chat to continue.
    #[serde(default)]
    pub chat_id: Option<ChatId>,
    /// Memory collections to retrieve context from.
    #[serde(default, rename = "memory_id")]
    pub memory_ids: Option<MemoryIds>,
    /// Caller-supplied stop words.
    #[serde(default, rename = "stop")]
    pub stop_words: Option<Vec<String>>,
    /// Stream partial results instead of aggregating.
    #[serde(default)]
    pub stream: bool,
    /// Literal system prompt for this call.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Stored prompt id or slug for this call.
    #[serde(default)]
    pub system_prompt_id: Option<String>,
    /// Type format the answer must conform to.
    #[serde(default)]
    pub type_schema: Option<Value>,
}

impl GenerateRequest {
    /// Create a request for a task with defaults for everything else.
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            ..Self::default()
        }
    }

    /// Continue the given chat.
    pub fn with_chat(mut self, chat_id: impl Into<ChatId>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    /// Select a model alias.
    pub fn with_model(mut self, alias: impl Into<String>) -> Self {
        self.model_alias = alias.into();
        self
    }

    /// Retrieve context from the given memory collections.
    pub fn with_memory(mut self, ids: Vec<MemoryId>) -> Self {
        self.memory_ids = Some(MemoryIds::Many(ids));
        self
    }

    /// Memory ids with empties removed; empty when none were given.
    pub fn memory_id_list(&self) -> Vec<MemoryId> {
        self.memory_ids
            .clone()
            .map(MemoryIds::into_ids)
            .unwrap_or_default()
    }
}

/// Aggregated response for non-streaming generations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerateResponse {
    /// Generated text, or the parsed value for typed generations.
    pub result: Value,
    /// Usage for the whole request.
    pub token_usage: TokenUsage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn generate_request_accepts_single_and_many_memory_ids() {
        let single: GenerateRequest =
            serde_json::from_value(json!({ "task": "hi", "memory_id": "m1" })).expect("single");
        assert_eq!(single.memory_id_list(), vec!["m1".to_string()]);

        let many: GenerateRequest = serde_json::from_value(json!({
            "task": "hi",
            "memory_id": ["m1", "", "m2"],
            "provider": "best",
            "stop": ["\n"]
        }))
        .expect("many");
        assert_eq!(
            many.memory_id_list(),
            vec!["m1".to_string(), "m2".to_string()]
        );
        assert_eq!(many.model_alias, "best");
        assert_eq!(many.stop_words, Some(vec!["\n".to_string()]));
        assert_eq!(many.stream, false);
    }

    #[test]
    fn error_kinds_map_to_stable_statuses() {
        assert_eq!(ErrorKind::NotFound.http_status(), 404);
        assert_eq!(ErrorKind::UnknownModelProvider.http_status(), 400);
        assert_eq!(ErrorKind::InputInvalid.http_status(), 400);
        assert_eq!(ErrorKind::GenerationFailed.http_status(), 500);
        assert_eq!(ErrorKind::RateLimitReached.http_status(), 500);
        assert_eq!(ErrorKind::InternalError.as_str(), "internal_error");
    }

    #[test]
    fn absorbing_chunks_keeps_input_fixed() {
        let mut total = TokenUsage::default();
        total.absorb_chunk(TokenUsage::new(12, 3));
        total.absorb_chunk(TokenUsage::new(12, 4));
        assert_eq!(total, TokenUsage::new(12, 7));
    }

    #[test]
    fn failure_marker_is_terminal() {
        let marker = PartialResult::failed(ErrorKind::GenerationFailed);
        assert!(marker.is_failure());
        assert_eq!(PartialResult::completed().is_failure(), false);
        let encoded = serde_json::to_value(PartialResult::completed()).expect("encode");
        assert_eq!(encoded.get("error"), None);
    }
}
