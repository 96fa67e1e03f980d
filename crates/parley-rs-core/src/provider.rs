//! Provider adapter seam and the closed set of provider kinds.

use async_trait::async_trait;
use futures_util::Stream;
use parley_rs_protocol::ProviderOptions;
use std::fmt;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Text deltas streamed by a provider for one attempt.
pub type ProviderStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// Failures reported by a provider adapter. All of them are retryable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// The backend could not be reached or the connection dropped.
    #[error("transport error: {0}")]
    Transport(String),
    /// The backend answered with an error status.
    #[error("provider returned {status}: {message}")]
    Api { status: u16, message: String },
    /// The backend answered with something unreadable.
    #[error("malformed provider response: {0}")]
    Malformed(String),
    /// The call was abandoned through its cancellation token.
    #[error("provider call cancelled")]
    Cancelled,
}

/// Known backend families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderKind {
    OpenAI,
    Cohere,
    LLaMa,
    Replicate,
    OpenRouter,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::OpenAI,
        ProviderKind::Cohere,
        ProviderKind::LLaMa,
        ProviderKind::Replicate,
        ProviderKind::OpenRouter,
    ];

    /// Lowercase name used in alias tables and request logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Cohere => "cohere",
            ProviderKind::LLaMa => "llama",
            ProviderKind::Replicate => "replicate",
            ProviderKind::OpenRouter => "openrouter",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a provider name is not one of [`ProviderKind::ALL`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown provider kind: {0}")]
pub struct UnknownProviderKind(pub String);

impl FromStr for ProviderKind {
    type Err = UnknownProviderKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| UnknownProviderKind(value.to_string()))
    }
}

/// Uniform capability over one backend model.
///
/// Adapters are created per request and hold no state across calls. They
/// truncate at stop words themselves.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider name, e.g. `openai`.
    fn name(&self) -> &str;

    /// Concrete model served by this adapter.
    fn model(&self) -> &str;

    /// Start a streamed completion. The adapter should stop early once
    /// `cancel` fires.
    async fn stream(
        &self,
        prompt: &str,
        options: &ProviderOptions,
        cancel: CancellationToken,
    ) -> Result<ProviderStream, ProviderError>;

    /// One-shot completion used by typed generation.
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Token count for `text` under this model's tokenizer.
    fn count_tokens(&self, text: &str) -> u32 {
        approximate_tokens(text)
    }

    /// False when the caller brings their own credentials and quota does not apply.
    fn follows_rate_limit(&self) -> bool {
        true
    }
}

/// Builds an adapter for a resolved model name.
pub trait ProviderFactory: Send + Sync {
    fn create(&self, model: &str) -> Result<Arc<dyn ProviderAdapter>, ProviderError>;
}

impl<F> ProviderFactory for F
where
    F: Fn(&str) -> Result<Arc<dyn ProviderAdapter>, ProviderError> + Send + Sync,
{
    fn create(&self, model: &str) -> Result<Arc<dyn ProviderAdapter>, ProviderError> {
        self(model)
    }
}

/// Roughly four characters per token, never zero for non-empty text.
pub fn approximate_tokens(text: &str) -> u32 {
    let chars = text.chars().count();
    if chars == 0 {
        return 0;
    }
    u32::try_from(chars.div_ceil(4)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn provider_kind_round_trips_names() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.as_str().parse::<ProviderKind>(), Ok(kind));
        }
        assert_eq!("OpenAI".parse::<ProviderKind>(), Ok(ProviderKind::OpenAI));
        assert_eq!(
            "anthropic".parse::<ProviderKind>(),
            Err(UnknownProviderKind("anthropic".to_string()))
        );
    }

    #[test]
    fn approximate_tokens_rounds_up() {
        assert_eq!(approximate_tokens(""), 0);
        assert_eq!(approximate_tokens("Hi"), 1);
        assert_eq!(approximate_tokens("Hello!!!"), 2);
        assert_eq!(approximate_tokens("Hello!!!!"), 3);
    }
}
