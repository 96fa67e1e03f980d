//! Structural checks for gateway JSON5 layers.
//!
//! Every layer is checked before merging so that a typo in one file is
//! reported with the layer it came from, not against the merged result.

use super::SchemaMode;
use crate::ConfigError;
use serde_json::{Map, Value};

const TOP_LEVEL_KEYS: &[&str] = &[
    "$schema",
    "models",
    "generation",
    "history",
    "memory",
    "storage",
    "server",
];

const RATE_LIMIT_STAGES: &[&str] = &["before_context", "before_provider"];

/// Validate a single config layer.
pub(super) fn validate_layer_schema(
    value: &Value,
    mode: SchemaMode,
    layer: &str,
) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, "")?;
    ensure_allowed_keys(map, TOP_LEVEL_KEYS, layer, "")?;

    if let Some(value) = map.get("$schema") {
        expect_string(value, layer, "$schema")?;
    }
    if let Some(value) = map.get("models") {
        validate_models(value, mode, layer, "models")?;
    }
    if let Some(value) = map.get("generation") {
        validate_generation(value, layer, "generation")?;
    }
    if let Some(value) = map.get("history") {
        validate_history(value, layer, "history")?;
    }
    if let Some(value) = map.get("memory") {
        validate_memory(value, layer, "memory")?;
    }
    if let Some(value) = map.get("storage") {
        validate_storage(value, layer, "storage")?;
    }
    if let Some(value) = map.get("server") {
        let server = expect_object(value, layer, "server")?;
        ensure_allowed_keys(server, &["development_mode"], layer, "server")?;
        if let Some(value) = server.get("development_mode") {
            expect_bool(value, layer, "server.development_mode")?;
        }
    }
    Ok(())
}

/// Validate the "models" block.
///
/// Partial layers may override only one half of an alias; the effective
/// config must carry both.
fn validate_models(
    value: &Value,
    mode: SchemaMode,
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["default_alias", "aliases"], layer, path)?;
    if let Some(value) = map.get("default_alias") {
        expect_string(value, layer, &join_path(path, "default_alias"))?;
    }
    let Some(aliases) = map.get("aliases") else {
        return Ok(());
    };
    let aliases_path = join_path(path, "aliases");
    for (alias, entry) in expect_object(aliases, layer, &aliases_path)? {
        let entry_path = join_path(&aliases_path, alias);
        let entry = expect_object(entry, layer, &entry_path)?;
        ensure_allowed_keys(entry, &["provider", "model"], layer, &entry_path)?;
        for key in ["provider", "model"] {
            match entry.get(key) {
                Some(value) => expect_string(value, layer, &join_path(&entry_path, key))?,
                None if matches!(mode, SchemaMode::Full) => {
                    return Err(invalid_field(
                        layer,
                        &join_path(&entry_path, key),
                        "missing field",
                    ));
                }
                None => {}
            }
        }
    }
    Ok(())
}

/// Validate the "generation" block.
fn validate_generation(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(
        map,
        &["max_attempts", "stream_buffer", "rate_limit_stage"],
        layer,
        path,
    )?;
    for key in ["max_attempts", "stream_buffer"] {
        if let Some(value) = map.get(key) {
            expect_u64(value, layer, &join_path(path, key))?;
        }
    }
    if let Some(value) = map.get("rate_limit_stage") {
        let stage_path = join_path(path, "rate_limit_stage");
        let stage = value
            .as_str()
            .ok_or_else(|| invalid_field(layer, &stage_path, "expected string"))?;
        if !RATE_LIMIT_STAGES.contains(&stage) {
            return Err(invalid_field(
                layer,
                &stage_path,
                "expected before_context or before_provider",
            ));
        }
    }
    Ok(())
}

/// Validate the "history" block.
fn validate_history(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["budget", "stop_words"], layer, path)?;
    if let Some(value) = map.get("budget") {
        expect_u64(value, layer, &join_path(path, "budget"))?;
    }
    if let Some(value) = map.get("stop_words") {
        validate_string_array(value, layer, &join_path(path, "stop_words"))?;
    }
    Ok(())
}

/// Validate the "memory" block.
fn validate_memory(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(
        map,
        &["recall_limit", "max_context_chars", "path"],
        layer,
        path,
    )?;
    for key in ["recall_limit", "max_context_chars"] {
        if let Some(value) = map.get(key) {
            expect_u64(value, layer, &join_path(path, key))?;
        }
    }
    if let Some(value) = map.get("path") {
        expect_string(value, layer, &join_path(path, "path"))?;
    }
    Ok(())
}

/// Validate the "storage" block.
fn validate_storage(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["enabled", "path"], layer, path)?;
    if let Some(value) = map.get("enabled") {
        expect_bool(value, layer, &join_path(path, "enabled"))?;
    }
    if let Some(value) = map.get("path") {
        expect_string(value, layer, &join_path(path, "path"))?;
    }
    Ok(())
}

fn expect_object<'a>(
    value: &'a Value,
    layer: &str,
    path: &str,
) -> Result<&'a Map<String, Value>, ConfigError> {
    value
        .as_object()
        .ok_or_else(|| invalid_field(layer, path, "expected object"))
}

fn expect_string(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    match value {
        Value::String(_) => Ok(()),
        _ => Err(invalid_field(layer, path, "expected string")),
    }
}

fn expect_bool(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    match value {
        Value::Bool(_) => Ok(()),
        _ => Err(invalid_field(layer, path, "expected bool")),
    }
}

/// Non-negative integers only; counts and budgets cannot be negative.
fn expect_u64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_u64() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected non-negative integer"))
    }
}

fn validate_string_array(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let Value::Array(items) = value else {
        return Err(invalid_field(layer, path, "expected array"));
    };
    match items.iter().position(|item| !item.is_string()) {
        Some(idx) => Err(invalid_field(
            layer,
            &format!("{path}[{idx}]"),
            "expected string",
        )),
        None => Ok(()),
    }
}

fn ensure_allowed_keys(
    map: &Map<String, Value>,
    allowed: &[&str],
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    match map.keys().find(|key| !allowed.contains(&key.as_str())) {
        Some(key) => Err(invalid_field(layer, &join_path(path, key), "unknown key")),
        None => Ok(()),
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn invalid_field(layer: &str, path: &str, message: &str) -> ConfigError {
    let path = if path.is_empty() { "root" } else { path };
    ConfigError::InvalidField {
        path: format!("{layer}:{path}"),
        message: message.to_string(),
    }
}
