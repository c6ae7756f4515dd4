use serde_json::Value;

use crate::domain::types::{Collection, Environment};
use crate::error::ParseError;

/// Accept a collection document. Only the top level is validated; malformed
/// nested nodes are deliberately tolerated so the valid requests in a
/// partially broken collection still execute.
pub fn parse_collection(raw: Value) -> Result<Collection, ParseError> {
    if !raw.is_object() {
        return Err(ParseError::NotAnObject("collection"));
    }

    if let Some(schema) = raw.pointer("/info/schema").and_then(Value::as_str) {
        if !schema.contains("collection") {
            return Err(ParseError::SchemaMismatch(schema.to_string()));
        }
    }

    serde_json::from_value(raw).map_err(|source| ParseError::Invalid {
        kind: "collection",
        source,
    })
}

/// Accept an environment document: must be an object with a non-empty `name`
/// and a `values` array.
pub fn parse_environment(raw: Value) -> Result<Environment, ParseError> {
    if !raw.is_object() {
        return Err(ParseError::NotAnObject("environment"));
    }

    match raw.get("name").and_then(Value::as_str) {
        Some(name) if !name.is_empty() => {}
        _ => return Err(ParseError::MissingEnvironmentName),
    }

    if !raw.get("values").is_some_and(Value::is_array) {
        return Err(ParseError::InvalidEnvironmentValues);
    }

    serde_json::from_value(raw).map_err(|source| ParseError::Invalid {
        kind: "environment",
        source,
    })
}

pub fn parse_collection_text(raw: &str) -> Result<Collection, ParseError> {
    parse_collection(serde_json::from_str(raw).map_err(ParseError::Json)?)
}

pub fn parse_environment_text(raw: &str) -> Result<Environment, ParseError> {
    parse_environment(serde_json::from_str(raw).map_err(ParseError::Json)?)
}
