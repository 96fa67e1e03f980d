//! Typed generation: one-shot completions retried until the answer parses
//! and conforms to the requested type.

use crate::error::{GatewayError, GenerationFailure};
use crate::provider::ProviderAdapter;
use crate::schema::TypeSchema;
use crate::usage::UsageCallback;
use log::{debug, error, info, warn};
use parley_rs_protocol::TokenUsage;
use serde_json::Value;

/// Conforming value produced by typed generation.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedGeneration {
    pub value: Value,
    /// Usage summed over every attempt that reached the provider.
    pub token_usage: TokenUsage,
    pub attempts: u32,
}

/// Instruction prompt asking for a single-line JSON answer of `rendered_type`.
pub fn typed_prompt(rendered_type: &str, task: &str) -> String {
    format!(
        "Your goal is to write a JSON object that will accomplish a specific task.\n\
         The string inside the JSON must be plain text, and not contain any markdown or HTML unless explicitely mentionned in the task.\n\
         The JSON object should follow this type:\n```\n{rendered_type}\n``` The task you must accomplish:\n{task}\n\n\
         Please only provide the JSON in a single json markdown code block with the keys described above. Do not include any other text.\n\
         Please make sure the JSON is a single line and does not contain any newlines outside of the strings. \
         The type must be strictly respected. Do not skip any of the fields. \
         If a field is not relevant, use an empty string, a 0 or an empty array."
    )
}

/// Remove a surrounding markdown code fence and its `json` tag.
pub fn strip_code_fence(text: &str) -> &str {
    let inner = text.trim().trim_matches('`');
    inner.strip_prefix("json").unwrap_or(inner)
}

/// Ask `adapter` for a value of `schema`, retrying up to `max_attempts`.
///
/// Transport errors, unparseable JSON and shape mismatches all consume an
/// attempt. `usage` fires once per completion that reached the provider.
pub async fn generate_typed(
    adapter: &dyn ProviderAdapter,
    schema: &TypeSchema,
    task: &str,
    max_attempts: u32,
    usage: Option<&UsageCallback>,
) -> Result<TypedGeneration, GatewayError> {
    let prompt = typed_prompt(&schema.render(), task);
    let input = adapter.count_tokens(&prompt);
    let mut total = TokenUsage::default();
    info!(
        "starting typed generation (model={}, prompt_len={}, max_attempts={})",
        adapter.model(),
        prompt.len(),
        max_attempts
    );

    for attempt in 1..=max_attempts {
        let answer = match adapter.complete(&prompt).await {
            Ok(answer) => answer,
            Err(err) => {
                warn!(
                    "typed completion failed (model={}, attempt={}/{}, error={})",
                    adapter.model(),
                    attempt,
                    max_attempts,
                    err
                );
                continue;
            }
        };
        let attempt_usage = TokenUsage::new(input, adapter.count_tokens(&answer));
        if let Some(callback) = usage {
            callback(adapter.model(), attempt_usage);
        }
        total.add(attempt_usage);

        let value: Value = match serde_json::from_str(strip_code_fence(&answer)) {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    "typed answer is not JSON (model={}, attempt={}/{}, error={})",
                    adapter.model(),
                    attempt,
                    max_attempts,
                    err
                );
                continue;
            }
        };
        if !schema.matches(&value) {
            warn!(
                "typed answer does not match type (model={}, attempt={}/{})",
                adapter.model(),
                attempt,
                max_attempts
            );
            continue;
        }
        debug!(
            "typed generation succeeded (model={}, attempt={}, input={}, output={})",
            adapter.model(),
            attempt,
            total.input,
            total.output
        );
        return Ok(TypedGeneration {
            value,
            token_usage: total,
            attempts: attempt,
        });
    }

    error!(
        "typed generation exhausted attempts (model={}, attempts={})",
        adapter.model(),
        max_attempts
    );
    Err(GatewayError::GenerationFailed(GenerationFailure::new(
        max_attempts,
        total,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn strips_fences_and_language_tag() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "\n{\"a\":1}\n");
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
        assert_eq!(strip_code_fence("```{\"a\":1}```"), "{\"a\":1}");
    }

    #[test]
    fn prompt_embeds_type_and_task() {
        let prompt = typed_prompt("{\n  name: string,\n}", "Invent a person");
        assert!(prompt.contains("```\n{\n  name: string,\n}\n``` The task you must accomplish:\nInvent a person\n\n"));
        assert!(prompt.starts_with("Your goal is to write a JSON object"));
        assert!(prompt.ends_with("use an empty string, a 0 or an empty array."));
    }
}
