//! Embedded OpenAPI document describing the shared API models.
//!
//! The document is compiled into the binary and decoded at most once per
//! process. Startup calls [`api_schema`] so a broken document stops the
//! server before it binds.

use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;

const RAW_SCHEMA: &str = include_str!("api_schema.json");

/// Errors from decoding the embedded document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiSchemaError {
    #[error("failed to decode API schema: {0}")]
    Decode(String),

    #[error("API schema is missing {0}")]
    MissingField(&'static str),
}

/// Returns the decoded schema, decoding it on first use.
///
/// A decode failure is memoized too: every caller sees the same error.
pub fn api_schema() -> Result<&'static Value, ApiSchemaError> {
    static SCHEMA: OnceLock<Result<Value, ApiSchemaError>> = OnceLock::new();
    SCHEMA
        .get_or_init(|| decode(RAW_SCHEMA))
        .as_ref()
        .map_err(Clone::clone)
}

/// `info.version` of the embedded document.
pub fn api_schema_version() -> Result<&'static str, ApiSchemaError> {
    api_schema()?["info"]["version"]
        .as_str()
        .ok_or(ApiSchemaError::MissingField("info.version"))
}

fn decode(raw: &str) -> Result<Value, ApiSchemaError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ApiSchemaError::Decode(e.to_string()))?;

    if !value["openapi"].is_string() {
        return Err(ApiSchemaError::MissingField("openapi"));
    }
    if !value["info"]["version"].is_string() {
        return Err(ApiSchemaError::MissingField("info.version"));
    }
    if !value["components"]["schemas"].is_object() {
        return Err(ApiSchemaError::MissingField("components.schemas"));
    }

    Ok(value)
}
