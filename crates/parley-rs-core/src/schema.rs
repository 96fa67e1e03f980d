//! Type formats for typed generation.
//!
//! A type format is a JSON value describing the expected answer:
//! `"string"`, `"number"`, `"boolean"`, a one-element array for lists, or an
//! object mapping field names to nested formats.

use serde_json::Value;
use thiserror::Error;

/// Errors raised while parsing a type format.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("unsupported type at {path}: {found}")]
    Unsupported { path: String, found: String },
    #[error("array type at {path} must have exactly one element")]
    ArrayArity { path: String },
}

/// Parsed type format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSchema {
    String,
    Number,
    Boolean,
    Array(Box<TypeSchema>),
    /// Fields in declaration order.
    Object(Vec<(String, TypeSchema)>),
}

impl TypeSchema {
    /// Parse a type format value.
    pub fn parse(value: &Value) -> Result<Self, SchemaError> {
        parse_at(value, "$")
    }

    /// TypeScript-like rendering embedded in the typed prompt.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        match self {
            TypeSchema::String => out.push_str("string"),
            TypeSchema::Number => out.push_str("number"),
            TypeSchema::Boolean => out.push_str("boolean"),
            TypeSchema::Array(item) => {
                item.render_into(out, depth);
                out.push_str("[]");
            }
            TypeSchema::Object(fields) => {
                out.push_str("{\n");
                for (name, field) in fields {
                    out.push_str(&"  ".repeat(depth + 1));
                    out.push_str(name);
                    out.push_str(": ");
                    field.render_into(out, depth + 1);
                    out.push_str(",\n");
                }
                out.push_str(&"  ".repeat(depth));
                out.push('}');
            }
        }
    }

    /// Structural check of a parsed value.
    ///
    /// Every declared field must be present with a matching type, recursively.
    /// Extra fields are tolerated.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (TypeSchema::String, Value::String(_)) => true,
            (TypeSchema::Number, Value::Number(_)) => true,
            (TypeSchema::Boolean, Value::Bool(_)) => true,
            (TypeSchema::Array(item), Value::Array(values)) => {
                values.iter().all(|value| item.matches(value))
            }
            (TypeSchema::Object(fields), Value::Object(map)) => fields
                .iter()
                .all(|(name, field)| map.get(name).is_some_and(|value| field.matches(value))),
            _ => false,
        }
    }
}

fn parse_at(value: &Value, path: &str) -> Result<TypeSchema, SchemaError> {
    match value {
        Value::String(name) => match name.as_str() {
            "string" => Ok(TypeSchema::String),
            "number" => Ok(TypeSchema::Number),
            "boolean" => Ok(TypeSchema::Boolean),
            other => Err(SchemaError::Unsupported {
                path: path.to_string(),
                found: other.to_string(),
            }),
        },
        Value::Array(items) => match items.as_slice() {
            [item] => Ok(TypeSchema::Array(Box::new(parse_at(
                item,
                &format!("{path}[]"),
            )?))),
            _ => Err(SchemaError::ArrayArity {
                path: path.to_string(),
            }),
        },
        Value::Object(map) => map
            .iter()
            .map(|(name, field)| Ok((name.clone(), parse_at(field, &format!("{path}.{name}"))?)))
            .collect::<Result<Vec<_>, _>>()
            .map(TypeSchema::Object),
        other => Err(SchemaError::Unsupported {
            path: path.to_string(),
            found: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn person() -> TypeSchema {
        TypeSchema::parse(&json!({
            "name": "string",
            "age": "number",
            "tags": ["string"],
            "address": { "city": "string" }
        }))
        .expect("schema")
    }

    #[test]
    fn renders_nested_objects() {
        let rendered = TypeSchema::parse(&json!({ "ok": "boolean", "items": [{ "id": "number" }] }))
            .expect("schema")
            .render();
        assert_eq!(
            rendered,
            "{\n  items: {\n    id: number,\n  }[],\n  ok: boolean,\n}"
        );
    }

    #[test]
    fn accepts_conforming_values_with_extra_fields() {
        let value = json!({
            "name": "Ada",
            "age": 36,
            "tags": ["math"],
            "address": { "city": "London", "zip": "N1" },
            "extra": true
        });
        assert!(person().matches(&value));
    }

    #[test]
    fn rejects_missing_or_mistyped_fields() {
        let missing = json!({ "name": "Ada", "tags": [], "address": { "city": "London" } });
        assert!(!person().matches(&missing));
        let mistyped = json!({ "name": "Ada", "age": "36", "tags": [], "address": { "city": "x" } });
        assert!(!person().matches(&mistyped));
        let bad_item = json!({ "name": "Ada", "age": 1, "tags": [1], "address": { "city": "x" } });
        assert!(!person().matches(&bad_item));
    }

    #[test]
    fn rejects_unknown_types() {
        assert_eq!(
            TypeSchema::parse(&json!({ "when": "date" })),
            Err(SchemaError::Unsupported {
                path: "$.when".to_string(),
                found: "date".to_string(),
            })
        );
        assert_eq!(
            TypeSchema::parse(&json!(["string", "number"])),
            Err(SchemaError::ArrayArity {
                path: "$".to_string()
            })
        );
        assert!(TypeSchema::parse(&json!(42)).is_err());
    }
}
