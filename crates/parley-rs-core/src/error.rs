//! Error surface of the generation core.

use log::error;
use parley_rs_protocol::{ErrorKind, TokenUsage};
use serde_json::{Value, json};
use std::fmt::Display;
use thiserror::Error;

/// Retry exhaustion details.
///
/// The sentinel payload only ever travels inside this value so it cannot be
/// mistaken for a successful result.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationFailure {
    /// Always `{"error":"generation_failed"}`.
    pub payload: Value,
    /// Attempts made before giving up.
    pub attempts: u32,
    /// Usage consumed by the attempts that reached the provider.
    pub usage: TokenUsage,
}

impl GenerationFailure {
    pub fn new(attempts: u32, usage: TokenUsage) -> Self {
        Self {
            payload: json!({ "error": "generation_failed" }),
            attempts,
            usage,
        }
    }
}

/// Errors returned by orchestrator operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Request fields are missing or malformed.
    #[error("invalid input: {0}")]
    InputInvalid(String),
    /// Chat or prompt is absent or owned by someone else.
    #[error("not found: {0}")]
    NotFound(String),
    /// The alias maps to no known provider.
    #[error("unknown model provider: {0}")]
    UnknownModelProvider(String),
    /// The user's quota is exhausted.
    #[error("rate limit reached")]
    RateLimitReached,
    /// The project's quota is exhausted.
    #[error("project rate limit reached")]
    ProjectRateLimitReached,
    /// Quota status was missing or unrecognized.
    #[error("unknown error: {0}")]
    UnknownError(String),
    /// Every attempt failed.
    #[error("generation failed after {} attempts", .0.attempts)]
    GenerationFailed(GenerationFailure),
    /// A collaborator failed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Log a collaborator failure and wrap it.
    pub fn internal(operation: &str, err: impl Display) -> Self {
        error!("collaborator failed (operation={}, error={})", operation, err);
        GatewayError::Internal(format!("{operation}: {err}"))
    }

    /// Stable classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::InputInvalid(_) => ErrorKind::InputInvalid,
            GatewayError::NotFound(_) => ErrorKind::NotFound,
            GatewayError::UnknownModelProvider(_) => ErrorKind::UnknownModelProvider,
            GatewayError::RateLimitReached => ErrorKind::RateLimitReached,
            GatewayError::ProjectRateLimitReached => ErrorKind::ProjectRateLimitReached,
            GatewayError::UnknownError(_) => ErrorKind::UnknownError,
            GatewayError::GenerationFailed(_) => ErrorKind::GenerationFailed,
            GatewayError::Internal(_) => ErrorKind::InternalError,
        }
    }

    /// HTTP-equivalent status for the boundary layer.
    pub fn http_status(&self) -> u16 {
        self.kind().http_status()
    }

    /// Message safe to show a caller.
    ///
    /// Outside development mode internal detail is replaced by a generic
    /// message for the error's kind.
    pub fn public_message(&self, development_mode: bool) -> String {
        if development_mode {
            return self.to_string();
        }
        match self.kind() {
            ErrorKind::InputInvalid => "Bad Request",
            ErrorKind::NotFound => "Not Found",
            ErrorKind::UnknownModelProvider => "Unknown model provider",
            ErrorKind::RateLimitReached => "Rate limit reached",
            ErrorKind::ProjectRateLimitReached => "Project rate limit reached",
            ErrorKind::GenerationFailed => "Generation failed",
            ErrorKind::UnknownError | ErrorKind::InternalError => "Internal Server Error",
        }
        .to_string()
    }

    /// Sentinel payload paired with a generation failure.
    pub fn failure_payload(&self) -> Option<&Value> {
        match self {
            GatewayError::GenerationFailed(failure) => Some(&failure.payload),
            _ => None,
        }
    }
}
