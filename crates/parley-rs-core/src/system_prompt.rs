//! System prompt resolution from literal text or a stored prompt.

use crate::error::GatewayError;
use crate::store::PromptStore;
use log::debug;
use regex::Regex;
use std::sync::LazyLock;
use uuid::Uuid;

static SLUG_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").ok());

/// True for identifiers shaped like a UUID or a lowercase-dash slug.
pub fn is_prompt_identifier(id: &str) -> bool {
    if Uuid::parse_str(id).is_ok() {
        return true;
    }
    SLUG_PATTERN
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(id))
}

/// Resolve the system prompt for a call.
///
/// A stored prompt named by `prompt_id` wins over `explicit` text and has its
/// use counter bumped. Empty values count as absent.
pub fn resolve_system_prompt(
    prompts: &dyn PromptStore,
    explicit: Option<&str>,
    prompt_id: Option<&str>,
) -> Result<Option<String>, GatewayError> {
    let explicit = explicit
        .filter(|text| !text.is_empty())
        .map(str::to_string);
    let Some(prompt_id) = prompt_id.map(str::trim).filter(|id| !id.is_empty()) else {
        return Ok(explicit);
    };
    if !is_prompt_identifier(prompt_id) {
        return Err(GatewayError::InputInvalid(format!(
            "invalid system prompt id: {prompt_id}"
        )));
    }
    let prompt = prompts
        .prompt_by_id_or_slug(prompt_id)
        .map_err(|err| GatewayError::internal("get prompt", err))?
        .ok_or_else(|| GatewayError::NotFound(format!("prompt {prompt_id}")))?;
    prompts
        .update_prompt_use(&prompt.id, prompt.use_count.saturating_add(1))
        .map_err(|err| GatewayError::internal("update prompt use", err))?;
    debug!(
        "resolved stored system prompt (prompt_id={}, use_count={})",
        prompt.id,
        prompt.use_count + 1
    );
    Ok(Some(prompt.prompt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use parley_rs_protocol::{ErrorKind, Prompt};
    use pretty_assertions::assert_eq;

    const PROMPT_ID: &str = "0d3f6c9a-5b7e-4a21-8f4e-2c1b9d7a6e50";

    fn store() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.insert_prompt(Prompt {
            id: PROMPT_ID.to_string(),
            slug: "terse-reviewer".to_string(),
            prompt: "Review tersely.".to_string(),
            use_count: 2,
        });
        store
    }

    #[test]
    fn explicit_text_used_without_prompt_id() {
        let store = store();
        assert_eq!(
            resolve_system_prompt(&store, Some("Be kind."), None).expect("resolve"),
            Some("Be kind.".to_string())
        );
        assert_eq!(
            resolve_system_prompt(&store, Some(""), Some("")).expect("resolve"),
            None
        );
    }

    #[test]
    fn stored_prompt_overrides_explicit_text_and_counts_use() {
        let store = store();
        let resolved = resolve_system_prompt(&store, Some("Be kind."), Some("terse-reviewer"))
            .expect("resolve");
        assert_eq!(resolved, Some("Review tersely.".to_string()));
        assert_eq!(store.prompt(PROMPT_ID).map(|p| p.use_count), Some(3));
    }

    #[test]
    fn malformed_and_missing_ids_fail() {
        let store = store();
        let malformed = resolve_system_prompt(&store, None, Some("Not A Slug!"));
        assert_eq!(malformed.map_err(|err| err.kind()), Err(ErrorKind::InputInvalid));
        let missing = resolve_system_prompt(&store, None, Some("unknown-slug"));
        assert_eq!(missing.map_err(|err| err.kind()), Err(ErrorKind::NotFound));
    }
}
