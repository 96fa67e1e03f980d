//! Model alias resolution and adapter construction.

use crate::error::GatewayError;
use crate::provider::{ProviderAdapter, ProviderFactory, ProviderKind};
use crate::store::AliasStore;
use log::{debug, info};
use parking_lot::RwLock;
use parley_rs_config::ModelsConfig;
use parley_rs_protocol::ProjectId;
use std::collections::HashMap;
use std::sync::Arc;

/// Built-in aliases. The empty alias is the hard-coded default.
const STATIC_ALIASES: &[(&str, ProviderKind, &str)] = &[
    ("", ProviderKind::OpenAI, "gpt-3.5-turbo"),
    ("cheap", ProviderKind::LLaMa, "llama2"),
    ("regular", ProviderKind::OpenAI, "gpt-3.5-turbo"),
    ("best", ProviderKind::OpenAI, "gpt-4"),
    ("uncensored", ProviderKind::Replicate, "wizard-mega-13b-awq"),
    ("gpt-3.5-turbo", ProviderKind::OpenAI, "gpt-3.5-turbo"),
    ("gpt-3.5-turbo-16k", ProviderKind::OpenAI, "gpt-3.5-turbo"),
    ("gpt-4", ProviderKind::OpenAI, "gpt-4"),
    ("gpt-4-32k", ProviderKind::OpenAI, "gpt-4-32k"),
    ("gpt-4o", ProviderKind::OpenAI, "gpt-4o"),
    ("gpt-4o-mini", ProviderKind::OpenAI, "gpt-4o-mini"),
    ("gpt-4-turbo", ProviderKind::OpenAI, "gpt-4-turbo"),
    ("cohere", ProviderKind::Cohere, "cohere_command"),
    ("llama-2-70b-chat", ProviderKind::Replicate, "llama-2-70b-chat"),
    ("replit-code-v1-3b", ProviderKind::Replicate, "replit-code-v1-3b"),
    ("wizard-mega-13b-awq", ProviderKind::Replicate, "wizard-mega-13b-awq"),
    ("airoboros-llama-2-70b", ProviderKind::Replicate, "airoboros-llama-2-70b"),
];

/// Concrete provider and model an alias points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    pub kind: ProviderKind,
    pub model: String,
}

impl ResolvedModel {
    fn new(kind: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            kind,
            model: model.into(),
        }
    }
}

/// Maps aliases to providers and builds adapters through registered factories.
pub struct ProviderRegistry {
    factories: RwLock<HashMap<ProviderKind, Arc<dyn ProviderFactory>>>,
    models: ModelsConfig,
    aliases: Option<Arc<dyn AliasStore>>,
}

impl ProviderRegistry {
    pub fn new(models: ModelsConfig, aliases: Option<Arc<dyn AliasStore>>) -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
            models,
            aliases,
        }
    }

    /// Register or replace the factory for `kind`.
    pub fn register(&self, kind: ProviderKind, factory: Arc<dyn ProviderFactory>) {
        debug!("registering provider factory (kind={})", kind);
        self.factories.write().insert(kind, factory);
    }

    /// Resolve `alias` for `project_id`.
    ///
    /// Lookup order: built-in table, configured aliases, OpenRouter-style
    /// `vendor/model` names, then the project's custom aliases.
    pub fn resolve(
        &self,
        alias: &str,
        project_id: &ProjectId,
    ) -> Result<ResolvedModel, GatewayError> {
        let alias = alias.trim();
        let alias = if alias.is_empty() {
            self.models.default_alias.trim()
        } else {
            alias
        };
        let resolved = self.resolve_alias(alias, project_id)?;
        info!(
            "resolved model alias (alias={}, project_id={}, provider={}, model={})",
            alias, project_id, resolved.kind, resolved.model
        );
        Ok(resolved)
    }

    fn resolve_alias(
        &self,
        alias: &str,
        project_id: &ProjectId,
    ) -> Result<ResolvedModel, GatewayError> {
        if let Some((_, kind, model)) = STATIC_ALIASES.iter().find(|(name, ..)| *name == alias) {
            return Ok(ResolvedModel::new(*kind, *model));
        }
        if let Some(entry) = self.models.aliases.get(alias) {
            return parse_kind(&entry.provider).map(|kind| ResolvedModel::new(kind, &entry.model));
        }
        if is_openrouter_model(alias) {
            return Ok(ResolvedModel::new(ProviderKind::OpenRouter, alias));
        }
        let custom = match &self.aliases {
            Some(store) => store
                .model_by_alias(alias, project_id)
                .map_err(|err| GatewayError::internal("get model by alias", err))?,
            None => None,
        };
        match custom {
            Some(entry) => parse_kind(&entry.provider).map(|kind| ResolvedModel::new(kind, entry.model)),
            None => Err(GatewayError::UnknownModelProvider(alias.to_string())),
        }
    }

    /// Build an adapter for a resolved model.
    pub fn instantiate(
        &self,
        resolved: &ResolvedModel,
    ) -> Result<Arc<dyn ProviderAdapter>, GatewayError> {
        let factory = self
            .factories
            .read()
            .get(&resolved.kind)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownModelProvider(resolved.kind.to_string()))?;
        factory
            .create(&resolved.model)
            .map_err(|err| GatewayError::internal("create provider", err))
    }
}

fn parse_kind(provider: &str) -> Result<ProviderKind, GatewayError> {
    provider
        .parse()
        .map_err(|_| GatewayError::UnknownModelProvider(provider.to_string()))
}

/// OpenRouter names models as `vendor/model`.
fn is_openrouter_model(alias: &str) -> bool {
    alias
        .split_once('/')
        .is_some_and(|(vendor, model)| !vendor.is_empty() && !model.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, ModelAlias};
    use parley_rs_config::ModelAliasConfig;
    use parley_rs_protocol::ErrorKind;
    use pretty_assertions::assert_eq;

    fn project() -> ProjectId {
        "p1".to_string()
    }

    #[test]
    fn builtin_aliases_resolve() {
        let registry = ProviderRegistry::new(ModelsConfig::default(), None);
        assert_eq!(
            registry.resolve("best", &project()).expect("best"),
            ResolvedModel::new(ProviderKind::OpenAI, "gpt-4")
        );
        assert_eq!(
            registry.resolve("", &project()).expect("default"),
            ResolvedModel::new(ProviderKind::OpenAI, "gpt-3.5-turbo")
        );
        assert_eq!(
            registry.resolve("cheap", &project()).expect("cheap"),
            ResolvedModel::new(ProviderKind::LLaMa, "llama2")
        );
        assert_eq!(
            registry
                .resolve("mistralai/mistral-7b-instruct", &project())
                .expect("openrouter"),
            ResolvedModel::new(ProviderKind::OpenRouter, "mistralai/mistral-7b-instruct")
        );
    }

    #[test]
    fn unknown_alias_fails() {
        let registry = ProviderRegistry::new(ModelsConfig::default(), None);
        let result = registry.resolve("nonexistent", &project());
        assert_eq!(
            result.map_err(|err| err.kind()),
            Err(ErrorKind::UnknownModelProvider)
        );
    }

    #[test]
    fn configured_default_and_aliases_apply() {
        let mut models = ModelsConfig {
            default_alias: "house".to_string(),
            ..ModelsConfig::default()
        };
        models.aliases.insert(
            "house".to_string(),
            ModelAliasConfig {
                provider: "cohere".to_string(),
                model: "command-r".to_string(),
            },
        );
        let registry = ProviderRegistry::new(models, None);
        assert_eq!(
            registry.resolve("", &project()).expect("default"),
            ResolvedModel::new(ProviderKind::Cohere, "command-r")
        );
    }

    #[test]
    fn project_aliases_are_consulted_last() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_alias(
            "p1",
            "team-model",
            ModelAlias {
                provider: "replicate".to_string(),
                model: "llama-2-70b-chat".to_string(),
            },
        );
        store.insert_alias(
            "p1",
            "broken",
            ModelAlias {
                provider: "mystery".to_string(),
                model: "m".to_string(),
            },
        );
        let registry = ProviderRegistry::new(ModelsConfig::default(), Some(store));
        assert_eq!(
            registry.resolve("team-model", &project()).expect("custom"),
            ResolvedModel::new(ProviderKind::Replicate, "llama-2-70b-chat")
        );
        assert_eq!(
            registry
                .resolve("team-model", &"p2".to_string())
                .map_err(|err| err.kind()),
            Err(ErrorKind::UnknownModelProvider)
        );
        assert_eq!(
            registry.resolve("broken", &project()).map_err(|err| err.kind()),
            Err(ErrorKind::UnknownModelProvider)
        );
    }

    #[test]
    fn missing_factory_is_unknown_provider() {
        let registry = ProviderRegistry::new(ModelsConfig::default(), None);
        let resolved = registry.resolve("best", &project()).expect("best");
        assert_eq!(
            registry.instantiate(&resolved).map(|_| ()).map_err(|err| err.kind()),
            Err(ErrorKind::UnknownModelProvider)
        );
    }
}
