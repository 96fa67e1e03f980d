//! Generation orchestration for Parley.
//!
//! This crate owns provider resolution, the retrying stream and typed
//! engines, prompt assembly, the rate limit gate and usage accounting, wired
//! together by the `Orchestrator`.

pub mod context;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod provider;
pub mod rate_limit;
pub mod schema;
pub mod store;
pub mod system_prompt;
pub mod usage;

pub use engine::{GenerationHooks, GenerationStream, TypedGeneration};
pub use error::{GatewayError, GenerationFailure};
/// Orchestrator facade and request-scoped state.
pub use orchestrator::{Collaborators, GenerateReply, Orchestrator, RequestContext};
pub use orchestrator::registry::{ProviderRegistry, ResolvedModel};
/// Provider adapter seam.
pub use provider::{ProviderAdapter, ProviderError, ProviderFactory, ProviderKind, ProviderStream};
pub use rate_limit::QuotaSource;
pub use schema::{SchemaError, TypeSchema};
/// Storage collaborators.
pub use store::{
    AliasStore, ChatStore, InMemoryStore, JsonlChatStore, ModelAlias, PromptStore, StoreError,
    UsageRecorder,
};
pub use usage::{RequestKind, RequestLog, UsageCallback};
