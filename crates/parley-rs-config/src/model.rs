//! Configuration schema for the Parley gateway.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root config for the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GatewayConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl GatewayConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::new()
    }
}

/// Builder for assembling a `GatewayConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    /// Create a new builder seeded with default config values.
    pub fn new() -> Self {
        Self {
            config: GatewayConfig::default(),
        }
    }

    /// Replace the model alias configuration.
    pub fn models(mut self, models: ModelsConfig) -> Self {
        self.config.models = models;
        self
    }

    /// Add a single deployment-wide alias.
    pub fn alias(
        mut self,
        alias: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        self.config.models.aliases.insert(
            alias.into(),
            ModelAliasConfig {
                provider: provider.into(),
                model: model.into(),
            },
        );
        self
    }

    /// Replace the retry and streaming configuration.
    pub fn generation(mut self, generation: GenerationConfig) -> Self {
        self.config.generation = generation;
        self
    }

    /// Replace the chat history configuration.
    pub fn history(mut self, history: HistoryConfig) -> Self {
        self.config.history = history;
        self
    }

    /// Replace the memory retrieval configuration.
    pub fn memory(mut self, memory: MemoryConfig) -> Self {
        self.config.memory = memory;
        self
    }

    /// Replace the local storage configuration.
    pub fn storage(mut self, storage: StorageConfig) -> Self {
        self.config.storage = storage;
        self
    }

    /// Toggle development mode error reporting.
    pub fn development_mode(mut self, enabled: bool) -> Self {
        self.config.server.development_mode = enabled;
        self
    }

    /// Finalize and return the built `GatewayConfig`.
    pub fn build(self) -> GatewayConfig {
        self.config
    }
}

/// Model alias resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ModelsConfig {
    /// Alias used when a request names no model.
    #[serde(default)]
    pub default_alias: String,
    /// Extra aliases consulted after the built-in table.
    #[serde(default)]
    pub aliases: BTreeMap<String, ModelAliasConfig>,
}

/// Provider/model pair an alias points to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModelAliasConfig {
    pub provider: String,
    pub model: String,
}

/// When the rate limit gate runs relative to context assembly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitStage {
    /// Check quota before any chat side effect happens.
    BeforeContext,
    /// Check quota after the user message was appended.
    #[default]
    BeforeProvider,
}

/// Retry and streaming settings for the generation engines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
    #[serde(default)]
    pub rate_limit_stage: RateLimitStage,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            stream_buffer: default_stream_buffer(),
            rate_limit_stage: RateLimitStage::default(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_stream_buffer() -> usize {
    64
}

/// Chat history rendering settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryConfig {
    /// Character budget for prior messages.
    #[serde(default = "default_history_budget")]
    pub budget: usize,
    /// Stop words added to provider options in chat mode.
    #[serde(default = "default_chat_stop_words")]
    pub stop_words: Vec<String>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            budget: default_history_budget(),
            stop_words: default_chat_stop_words(),
        }
    }
}

fn default_history_budget() -> usize {
    1000
}

fn default_chat_stop_words() -> Vec<String> {
    vec!["AI:".to_string(), "Human:".to_string()]
}

/// Memory retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoryConfig {
    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
    /// Directory of the JSONL memory collections.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            recall_limit: default_recall_limit(),
            max_context_chars: default_max_context_chars(),
            path: None,
        }
    }
}

fn default_recall_limit() -> usize {
    5
}

fn default_max_context_chars() -> usize {
    4000
}

/// Local chat storage settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct StorageConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub path: Option<String>,
}

/// Boundary behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ServerConfig {
    /// Expose full error diagnostics to callers.
    #[serde(default)]
    pub development_mode: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_gateway_policy() {
        let config = GatewayConfig::default();
        assert_eq!(config.generation.max_attempts, 5);
        assert_eq!(config.generation.stream_buffer, 64);
        assert_eq!(
            config.generation.rate_limit_stage,
            RateLimitStage::BeforeProvider
        );
        assert_eq!(config.history.budget, 1000);
        assert_eq!(
            config.history.stop_words,
            vec!["AI:".to_string(), "Human:".to_string()]
        );
        assert_eq!(config.memory.max_context_chars, 4000);
        assert_eq!(config.server.development_mode, false);
    }

    #[test]
    fn builder_adds_aliases() {
        let config = GatewayConfig::builder()
            .alias("fast", "openai", "gpt-4o-mini")
            .development_mode(true)
            .build();
        assert_eq!(
            config.models.aliases.get("fast"),
            Some(&ModelAliasConfig {
                provider: "openai".to_string(),
                model: "gpt-4o-mini".to_string(),
            })
        );
        assert!(config.server.development_mode);
    }
}
