//! Resource-config codec
//!
//! Users write the backend-specific part of a queue's resource configuration
//! (for Kubernetes, a Job spec). The server stores it inside an envelope keyed
//! by the backend type:
//!
//! ```text
//! {"resource_args": {"kubernetes": { ...user config... }}}
//! ```
//!
//! This module adds and removes that envelope, canonicalises template
//! variable documents, and converts external links and template variables
//! between the server's list shapes and the client's map shapes. Everything
//! here is pure.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::types::{
    ExternalLinks, TemplateVariable, TemplateVariableSchema, TemplateVariableWithName,
};

/// Top-level key of the resource-config envelope
pub const ENVELOPE_KEY: &str = "resource_args";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("expected a JSON object")]
    NotAnObject,

    #[error(
        "invalid resource_config: provide the arguments for the resource \
         (or a Kubernetes job spec) directly, without a top-level 'resource_args' key"
    )]
    AlreadyEnveloped,

    #[error("resource_args not found in resource config")]
    MissingEnvelope,

    #[error("resource_args is not a map")]
    MalformedEnvelope,

    #[error("resource type '{0}' not found in resource_args")]
    UnknownResourceType(String),

    #[error("invalid schema for template variable '{name}': {message}")]
    InvalidSchemaJson { name: String, message: String },
}

fn parse_object(text: &str) -> Result<Map<String, Value>, CodecError> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(CodecError::NotAnObject),
        Err(e) => Err(CodecError::InvalidJson(e.to_string())),
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// Wrap a user resource configuration in the backend envelope.
///
/// An empty configuration becomes an empty parameter object for the backend.
/// Input that already carries the envelope is rejected rather than wrapped
/// twice.
pub fn inject_envelope(user_config: &str, resource_type: &str) -> Result<String, CodecError> {
    if user_config.trim().is_empty() {
        return Ok(json!({ ENVELOPE_KEY: { resource_type: {} } }).to_string());
    }

    let config = parse_object(user_config)?;
    if config.contains_key(ENVELOPE_KEY) {
        return Err(CodecError::AlreadyEnveloped);
    }

    Ok(json!({ ENVELOPE_KEY: { resource_type: config } }).to_string())
}

/// Return the backend parameters held inside an enveloped configuration
pub fn strip_envelope(server_config: &str, resource_type: &str) -> Result<String, CodecError> {
    let config = parse_object(server_config)?;
    envelope_contents(&config, resource_type).map(Value::to_string)
}

/// Borrow the backend parameters out of an already-parsed configuration
pub fn envelope_contents<'a>(
    config: &'a Map<String, Value>,
    resource_type: &str,
) -> Result<&'a Value, CodecError> {
    let args = config
        .get(ENVELOPE_KEY)
        .ok_or(CodecError::MissingEnvelope)?
        .as_object()
        .ok_or(CodecError::MalformedEnvelope)?;
    args.get(resource_type)
        .ok_or_else(|| CodecError::UnknownResourceType(resource_type.to_string()))
}

/// Whether `config` is a JSON object enveloped for `resource_type`. Never fails.
pub fn has_envelope(config: &str, resource_type: &str) -> bool {
    parse_object(config)
        .map(|config| envelope_contents(&config, resource_type).is_ok())
        .unwrap_or(false)
}

/// Whether a server configuration carries no parameters at all.
///
/// The server stores an empty user configuration either as `{}` or as an
/// envelope around an empty object.
pub fn is_empty_config(config: &Map<String, Value>, resource_type: &str) -> bool {
    if config.is_empty() {
        return true;
    }
    config.len() == 1
        && matches!(
            envelope_contents(config, resource_type),
            Ok(Value::Object(params)) if params.is_empty()
        )
}

// =============================================================================
// Template Variables
// =============================================================================

/// Re-serialise a template variable document with canonical key order and
/// whitespace so that equivalent documents compare equal as text.
pub fn normalize_template_variables(raw: Option<&str>) -> Result<Option<String>, CodecError> {
    match raw {
        None => Ok(None),
        Some(raw) => Ok(Some(Value::Object(parse_object(raw)?).to_string())),
    }
}

/// Convert the server's template variable list into a map keyed by name,
/// decoding each variable's schema. Duplicate names keep the last entry.
pub fn template_vars_list_to_map(
    list: &[TemplateVariableWithName],
) -> Result<BTreeMap<String, TemplateVariable>, CodecError> {
    let mut result = BTreeMap::new();
    for tv in list {
        let schema: TemplateVariableSchema =
            serde_json::from_str(&tv.schema).map_err(|e| CodecError::InvalidSchemaJson {
                name: tv.name.clone(),
                message: e.to_string(),
            })?;
        result.insert(
            tv.name.clone(),
            TemplateVariable {
                description: tv.description.clone(),
                schema,
            },
        );
    }
    Ok(result)
}

// =============================================================================
// External Links
// =============================================================================

/// Encode a label→URL map as the server's `{"links": [...]}` document.
///
/// Returns `None` for an empty map. Links are emitted in label order.
pub fn external_links_map_to_envelope(links: &BTreeMap<String, String>) -> Option<String> {
    if links.is_empty() {
        return None;
    }
    let links: Vec<Value> = links
        .iter()
        .map(|(label, url)| json!({"label": label, "url": url}))
        .collect();
    Some(json!({ "links": links }).to_string())
}

/// Decode the server's link list into a label→URL map.
///
/// Labels are not unique on the server; a repeated label keeps the last URL.
pub fn external_links_list_to_map(links: &ExternalLinks) -> BTreeMap<String, String> {
    links
        .links
        .iter()
        .map(|link| (link.label.clone(), link.url.clone()))
        .collect()
}

// =============================================================================
// Comparison
// =============================================================================

/// Whether two JSON texts describe the same value, ignoring key order and
/// whitespace. Unparseable text is compared verbatim.
pub fn json_equivalent(a: &str, b: &str) -> bool {
    match (
        serde_json::from_str::<Value>(a),
        serde_json::from_str::<Value>(b),
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
