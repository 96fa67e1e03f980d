//! Orchestrator Core

pub mod registry;

use crate::context::ContextAssembler;
use crate::engine::{
    GenerationHooks, GenerationParams, GenerationStream, TypedGeneration, generate_typed,
    spawn_generation,
};
use crate::error::GatewayError;
use crate::provider::{ProviderAdapter, ProviderFactory, ProviderKind};
use crate::rate_limit::{self, QuotaSource};
use crate::schema::TypeSchema;
use crate::store::{AliasStore, ChatStore, InMemoryStore, JsonlChatStore, PromptStore, UsageRecorder};
use crate::system_prompt::resolve_system_prompt;
use crate::usage::completion_callback;
use directories::BaseDirs;
use log::{debug, info, warn};
use parley_rs_config::{GatewayConfig, RateLimitStage};
use parley_rs_memory::{FileMemoryRetriever, MemoryRetriever};
use parley_rs_protocol::{
    Chat, ChatMessage, CreateChatRequest, GenerateRequest, GenerateResponse, ProjectId,
    RateLimitStatus, UserId,
};
use registry::{ProviderRegistry, ResolvedModel};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

/// Request-scoped state threaded through every pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: UserId,
    pub project_id: ProjectId,
    /// Quota status computed once when the request entered the gateway.
    pub rate_limit_status: Option<RateLimitStatus>,
}

impl RequestContext {
    pub fn new(
        user_id: impl Into<UserId>,
        project_id: impl Into<ProjectId>,
        rate_limit_status: Option<RateLimitStatus>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            project_id: project_id.into(),
            rate_limit_status,
        }
    }
}

/// External collaborators consumed by the orchestrator.
#[derive(Clone)]
pub struct Collaborators {
    pub chats: Arc<dyn ChatStore>,
    pub prompts: Arc<dyn PromptStore>,
    pub usage: Arc<dyn UsageRecorder>,
    pub aliases: Option<Arc<dyn AliasStore>>,
    pub memory: Option<Arc<dyn MemoryRetriever>>,
    pub quota: Option<Arc<dyn QuotaSource>>,
}

impl Collaborators {
    /// Back every storage collaborator with one in-memory store.
    pub fn in_memory(store: Arc<InMemoryStore>) -> Self {
        Self {
            chats: store.clone(),
            prompts: store.clone(),
            usage: store.clone(),
            aliases: Some(store),
            memory: None,
            quota: None,
        }
    }

    pub fn with_chats(mut self, chats: Arc<dyn ChatStore>) -> Self {
        self.chats = chats;
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryRetriever>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_quota(mut self, quota: Arc<dyn QuotaSource>) -> Self {
        self.quota = Some(quota);
        self
    }

    /// Local collaborators described by `config`: JSONL chats when storage
    /// is enabled and a file memory retriever when a memory path is set.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let mut collaborators = Self::in_memory(Arc::new(InMemoryStore::new()));
        if config.storage.enabled {
            let root = resolve_default_root(config.storage.path.as_ref(), "chats")?;
            info!("using JSONL chat storage (root={})", root.display());
            let store = JsonlChatStore::new(&root)
                .map_err(|err| GatewayError::internal("open chat store", err))?;
            collaborators = collaborators.with_chats(Arc::new(store));
        }
        if let Some(path) = config.memory.path.as_ref() {
            let root = resolve_default_root(Some(path), "memory")?;
            info!("using file memory retriever (root={})", root.display());
            let retriever = FileMemoryRetriever::new(&root)
                .map_err(|err| GatewayError::internal("open memory store", err))?;
            collaborators = collaborators.with_memory(Arc::new(retriever));
        }
        Ok(collaborators)
    }
}

/// Reply to a boundary generate call, shaped by the request's `stream` flag.
pub enum GenerateReply {
    Aggregated(GenerateResponse),
    Streaming(GenerationStream),
}

/// Composition root: resolves providers, assembles context, gates on quota
/// and runs the generation engines.
pub struct Orchestrator {
    config: Arc<GatewayConfig>,
    registry: ProviderRegistry,
    assembler: ContextAssembler,
    chats: Arc<dyn ChatStore>,
    prompts: Arc<dyn PromptStore>,
    usage: Arc<dyn UsageRecorder>,
    quota: Option<Arc<dyn QuotaSource>>,
}

impl Orchestrator {
    /// Build an orchestrator over validated configuration.
    pub fn new(config: GatewayConfig, collaborators: Collaborators) -> Result<Self, GatewayError> {
        config
            .validate()
            .map_err(|err| GatewayError::internal("validate config", err))?;
        let Collaborators {
            chats,
            prompts,
            usage,
            aliases,
            memory,
            quota,
        } = collaborators;
        let registry = ProviderRegistry::new(config.models.clone(), aliases);
        let assembler = ContextAssembler::new(
            chats.clone(),
            prompts.clone(),
            memory,
            config.history.clone(),
            config.memory.clone(),
        );
        info!(
            "orchestrator ready (max_attempts={}, stream_buffer={}, rate_limit_stage={:?})",
            config.generation.max_attempts,
            config.generation.stream_buffer,
            config.generation.rate_limit_stage
        );
        Ok(Self {
            config: Arc::new(config),
            registry,
            assembler,
            chats,
            prompts,
            usage,
            quota,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn register_provider(&self, kind: ProviderKind, factory: Arc<dyn ProviderFactory>) {
        self.registry.register(kind, factory);
    }

    /// Compute the request's quota status once and build its context.
    ///
    /// Without a quota collaborator every request passes the gate.
    pub async fn request_context(
        &self,
        user_id: impl Into<UserId>,
        project_id: impl Into<ProjectId>,
    ) -> Result<RequestContext, GatewayError> {
        let user_id = user_id.into();
        let project_id = project_id.into();
        let status = match &self.quota {
            Some(quota) => quota
                .current_status(&user_id, &project_id)
                .await
                .map_err(|err| GatewayError::internal("compute rate limit status", err))?,
            None => RateLimitStatus::Ok,
        };
        debug!(
            "computed rate limit status (user_id={}, project_id={}, status={:?})",
            user_id, project_id, status
        );
        Ok(RequestContext::new(user_id, project_id, Some(status)))
    }

    /// Create a chat, resolving a stored system prompt when one is named.
    pub fn create_chat(
        &self,
        ctx: &RequestContext,
        request: CreateChatRequest,
    ) -> Result<Chat, GatewayError> {
        let system_prompt = resolve_system_prompt(
            self.prompts.as_ref(),
            request.system_prompt.as_deref(),
            request.system_prompt_id.as_deref(),
        )?;
        let prompt_id = request.system_prompt_id.filter(|id| !id.trim().is_empty());
        let chat = self
            .chats
            .create_chat(&ctx.user_id, system_prompt, prompt_id)
            .map_err(|err| GatewayError::internal("create chat", err))?;
        info!("created chat (chat_id={}, user_id={})", chat.id, ctx.user_id);
        Ok(chat)
    }

    /// Transcript of a chat owned by the caller.
    pub fn chat_history(
        &self,
        ctx: &RequestContext,
        chat_id: &str,
    ) -> Result<Vec<ChatMessage>, GatewayError> {
        self.chats
            .get_chat(chat_id)
            .map_err(|err| GatewayError::internal("get chat", err))?
            .filter(|chat| chat.user_id == ctx.user_id)
            .ok_or_else(|| GatewayError::NotFound(format!("chat {chat_id}")))?;
        self.chats
            .chat_messages(&ctx.user_id, chat_id)
            .map_err(|err| GatewayError::internal("get chat messages", err))
    }

    pub fn resolve_model(
        &self,
        ctx: &RequestContext,
        alias: &str,
    ) -> Result<ResolvedModel, GatewayError> {
        self.registry.resolve(alias, &ctx.project_id)
    }

    fn adapter_for(
        &self,
        ctx: &RequestContext,
        alias: &str,
    ) -> Result<Arc<dyn ProviderAdapter>, GatewayError> {
        let resolved = self.resolve_model(ctx, alias)?;
        self.registry.instantiate(&resolved)
    }

    fn gate(
        &self,
        ctx: &RequestContext,
        adapter: &dyn ProviderAdapter,
        stage: RateLimitStage,
    ) -> Result<(), GatewayError> {
        if stage != self.config.generation.rate_limit_stage {
            return Ok(());
        }
        if !adapter.follows_rate_limit() {
            debug!(
                "provider bypasses rate limit (provider={}, user_id={})",
                adapter.name(),
                ctx.user_id
            );
            return Ok(());
        }
        rate_limit::check(ctx.rate_limit_status).inspect_err(|err| {
            warn!(
                "request rejected by rate limit (user_id={}, project_id={}, error={})",
                ctx.user_id, ctx.project_id, err
            );
        })
    }

    /// Start a streamed free-text generation.
    ///
    /// In chat mode the user message is recorded before the provider is
    /// called and the reply is appended once the stream succeeds.
    pub async fn generate_stream(
        &self,
        ctx: &RequestContext,
        request: GenerateRequest,
    ) -> Result<GenerationStream, GatewayError> {
        if request.task.trim().is_empty() {
            return Err(GatewayError::InputInvalid("task is required".to_string()));
        }
        if request.type_schema.is_some() {
            return Err(GatewayError::InputInvalid(
                "typed generation cannot be streamed".to_string(),
            ));
        }
        let adapter = self.adapter_for(ctx, &request.model_alias)?;
        self.gate(ctx, adapter.as_ref(), RateLimitStage::BeforeContext)?;
        let assembled = self.assembler.assemble(&ctx.user_id, &request).await?;
        self.gate(ctx, adapter.as_ref(), RateLimitStage::BeforeProvider)?;

        let mut hooks = GenerationHooks::new();
        if let Some(chat_id) = assembled.chat_id {
            let chats = self.chats.clone();
            let reply_chat = chat_id.clone();
            hooks = hooks
                .on_success(move |output| {
                    chats
                        .append_message(&reply_chat, false, output)
                        .map(|_| ())
                        .map_err(|err| GatewayError::internal("append assistant message", err))
                })
                .on_failure(move |kind| {
                    warn!(
                        "generation ended without a reply (chat_id={}, error={})",
                        chat_id,
                        kind.as_str()
                    );
                });
        }

        Ok(spawn_generation(GenerationParams {
            adapter,
            prompt: assembled.prompt,
            options: assembled.options,
            max_attempts: self.config.generation.max_attempts,
            buffer: self.config.generation.stream_buffer,
            usage: Some(completion_callback(self.usage.clone(), ctx.user_id.clone())),
            hooks,
        }))
    }

    /// Generate and aggregate the full result.
    ///
    /// Requests carrying a `type_schema` run typed generation on the task
    /// alone; chat and memory fields are ignored for them.
    pub async fn generate(
        &self,
        ctx: &RequestContext,
        request: GenerateRequest,
    ) -> Result<GenerateResponse, GatewayError> {
        if let Some(schema) = request.type_schema.as_ref() {
            let typed = self
                .typed(ctx, &request.model_alias, schema, &request.task)
                .await?;
            return Ok(GenerateResponse {
                result: typed.value,
                token_usage: typed.token_usage,
            });
        }
        let (text, token_usage) = self.generate_stream(ctx, request).await?.collect().await?;
        Ok(GenerateResponse {
            result: Value::String(text),
            token_usage,
        })
    }

    /// Stream or aggregate as the request asks.
    pub async fn respond(
        &self,
        ctx: &RequestContext,
        request: GenerateRequest,
    ) -> Result<GenerateReply, GatewayError> {
        if request.stream {
            return self
                .generate_stream(ctx, request)
                .await
                .map(GenerateReply::Streaming);
        }
        self.generate(ctx, request)
            .await
            .map(GenerateReply::Aggregated)
    }

    /// Caller-facing text for `err`; detail only in development mode.
    pub fn public_message(&self, err: &GatewayError) -> String {
        err.public_message(self.config.server.development_mode)
    }

    /// Typed generation against the default model.
    pub async fn generate_typed(
        &self,
        ctx: &RequestContext,
        schema: &Value,
        task: &str,
    ) -> Result<TypedGeneration, GatewayError> {
        self.typed(ctx, "", schema, task).await
    }

    async fn typed(
        &self,
        ctx: &RequestContext,
        alias: &str,
        schema: &Value,
        task: &str,
    ) -> Result<TypedGeneration, GatewayError> {
        if task.trim().is_empty() {
            return Err(GatewayError::InputInvalid("task is required".to_string()));
        }
        let schema = TypeSchema::parse(schema)
            .map_err(|err| GatewayError::InputInvalid(err.to_string()))?;
        let adapter = self.adapter_for(ctx, alias)?;
        self.gate(ctx, adapter.as_ref(), RateLimitStage::BeforeContext)?;
        self.gate(ctx, adapter.as_ref(), RateLimitStage::BeforeProvider)?;
        let usage = completion_callback(self.usage.clone(), ctx.user_id.clone());
        generate_typed(
            adapter.as_ref(),
            &schema,
            task,
            self.config.generation.max_attempts,
            Some(&usage),
        )
        .await
    }
}

/// Resolve an absolute storage root for config-specified paths.
fn resolve_default_root(path: Option<&String>, fallback_dir: &str) -> Result<PathBuf, GatewayError> {
    let cwd = std::env::current_dir().map_err(|err| GatewayError::internal("read cwd", err))?;
    if let Some(path) = path {
        let path = PathBuf::from(path);
        if path.is_absolute() {
            return Ok(path);
        }
        debug!("resolving storage root relative to cwd: {}", cwd.join(&path).display());
        return Ok(cwd.join(path));
    }
    if let Some(home) = BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf()) {
        return Ok(home.join(".parley").join(fallback_dir));
    }
    Ok(cwd.join(".parley").join(fallback_dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_rs_protocol::{ErrorKind, Prompt};
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn orchestrator(store: Arc<InMemoryStore>) -> Orchestrator {
        Orchestrator::new(GatewayConfig::default(), Collaborators::in_memory(store))
            .expect("orchestrator")
    }

    #[test]
    fn resolve_default_root_respects_absolute_and_relative_paths() {
        let temp = tempdir().expect("tempdir");
        let absolute = temp.path().join("chats");
        let absolute_str = absolute.to_string_lossy().to_string();
        let resolved = resolve_default_root(Some(&absolute_str), "chats").expect("absolute");
        assert_eq!(resolved, absolute);

        let relative = "tmp/chats".to_string();
        let cwd = std::env::current_dir().expect("cwd");
        let resolved = resolve_default_root(Some(&relative), "chats").expect("relative");
        assert_eq!(resolved, cwd.join(&relative));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = GatewayConfig::default();
        config.generation.max_attempts = 0;
        let result = Orchestrator::new(
            config,
            Collaborators::in_memory(Arc::new(InMemoryStore::new())),
        );
        assert!(result.is_err());
    }

    #[test]
    fn public_message_follows_development_mode() {
        let err = GatewayError::Internal("append user message: disk full".to_string());
        let production = orchestrator(Arc::new(InMemoryStore::new()));
        assert_eq!(production.public_message(&err), "Internal Server Error");

        let mut config = GatewayConfig::default();
        config.server.development_mode = true;
        let development = Orchestrator::new(
            config,
            Collaborators::in_memory(Arc::new(InMemoryStore::new())),
        )
        .expect("orchestrator");
        assert_eq!(
            development.public_message(&err),
            "internal error: append user message: disk full"
        );
    }

    #[tokio::test]
    async fn missing_quota_source_passes_gate() {
        let orchestrator = orchestrator(Arc::new(InMemoryStore::new()));
        let ctx = orchestrator.request_context("u1", "p1").await.expect("ctx");
        assert_eq!(ctx.rate_limit_status, Some(RateLimitStatus::Ok));
    }

    #[test]
    fn chat_created_from_stored_prompt() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_prompt(Prompt {
            id: "9b2c7f0e-3d4a-4e8b-a1f6-5c0d2e7b8a94".to_string(),
            slug: "haiku".to_string(),
            prompt: "Answer in haiku.".to_string(),
            use_count: 0,
        });
        let orchestrator = orchestrator(store.clone());
        let ctx = RequestContext::new("u1", "p1", Some(RateLimitStatus::Ok));
        let chat = orchestrator
            .create_chat(
                &ctx,
                CreateChatRequest {
                    system_prompt: Some("ignored".to_string()),
                    system_prompt_id: Some("haiku".to_string()),
                },
            )
            .expect("chat");
        assert_eq!(chat.system_prompt.as_deref(), Some("Answer in haiku."));
        assert_eq!(chat.system_prompt_id.as_deref(), Some("haiku"));
        assert_eq!(
            store
                .prompt("9b2c7f0e-3d4a-4e8b-a1f6-5c0d2e7b8a94")
                .map(|p| p.use_count),
            Some(1)
        );
    }

    #[test]
    fn history_of_foreign_chat_is_not_found() {
        let orchestrator = orchestrator(Arc::new(InMemoryStore::new()));
        let owner = RequestContext::new("owner", "p1", Some(RateLimitStatus::Ok));
        let chat = orchestrator
            .create_chat(&owner, CreateChatRequest::default())
            .expect("chat");
        assert_eq!(orchestrator.chat_history(&owner, &chat.id).expect("history"), Vec::new());
        let intruder = RequestContext::new("intruder", "p1", Some(RateLimitStatus::Ok));
        assert_eq!(
            orchestrator
                .chat_history(&intruder, &chat.id)
                .map_err(|err| err.kind()),
            Err(ErrorKind::NotFound)
        );
    }

    #[tokio::test]
    async fn empty_task_and_streamed_schema_are_invalid() {
        let orchestrator = orchestrator(Arc::new(InMemoryStore::new()));
        let ctx = RequestContext::new("u1", "p1", Some(RateLimitStatus::Ok));
        let empty = orchestrator.generate_stream(&ctx, GenerateRequest::new("  ")).await;
        assert_eq!(empty.map(|_| ()).map_err(|err| err.kind()), Err(ErrorKind::InputInvalid));

        let mut typed = GenerateRequest::new("Invent a person");
        typed.type_schema = Some(serde_json::json!({ "name": "string" }));
        let streamed = orchestrator.generate_stream(&ctx, typed).await;
        assert_eq!(
            streamed.map(|_| ()).map_err(|err| err.kind()),
            Err(ErrorKind::InputInvalid)
        );
    }

    #[tokio::test]
    async fn malformed_schema_fails_before_provider_lookup() {
        let orchestrator = orchestrator(Arc::new(InMemoryStore::new()));
        let ctx = RequestContext::new("u1", "p1", Some(RateLimitStatus::Ok));
        let result = orchestrator
            .generate_typed(&ctx, &serde_json::json!({ "when": "date" }), "Pick a day")
            .await;
        assert_eq!(result.map_err(|err| err.kind()), Err(ErrorKind::InputInvalid));
    }
}
