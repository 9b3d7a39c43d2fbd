//! Wire types exchanged with the W&B GraphQL API

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Project that hosts every run queue of an entity
pub const RUN_QUEUE_PROJECT: &str = "model-registry";

// =============================================================================
// Run Queues
// =============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQueue {
    /// Server-internal ID, required for deletion
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub entity_name: String,
    #[serde(default)]
    pub prioritization_mode: Option<String>,
    #[serde(default, deserialize_with = "embedded_json")]
    pub external_links: ExternalLinks,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    pub default_resource_config: DefaultResourceConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultResourceConfig {
    #[serde(default)]
    pub id: Option<String>,
    pub resource: String,
    /// Enveloped configuration as stored by the server
    #[serde(default, deserialize_with = "embedded_json")]
    pub config: serde_json::Map<String, serde_json::Value>,
    #[serde(default, deserialize_with = "embedded_json")]
    pub template_variables: Vec<TemplateVariableWithName>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalLink {
    pub label: String,
    pub url: String,
}

/// Server-side shape of a run queue's external links: `{"links": [...]}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalLinks {
    #[serde(default)]
    pub links: Vec<ExternalLink>,
}

/// Template variable as returned by the server, schema still encoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateVariableWithName {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub schema: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateVariableSchema {
    #[serde(rename = "type")]
    pub var_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<serde_json::Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<serde_json::Number>,
}

/// Client-facing template variable, keyed by name in a map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateVariable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub schema: TemplateVariableSchema,
}

/// Variables of the `UpsertRunQueue` mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertRunQueueInput {
    pub entity_name: String,
    pub project_name: String,
    pub queue_name: String,
    pub resource_type: String,
    /// Enveloped resource configuration (JSON text)
    pub resource_config: String,
    pub template_variables: Option<String>,
    pub prioritization_mode: Option<String>,
    /// `{"links": [...]}` as JSON text, or null when there are none
    pub external_links: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UpsertRunQueueResult {
    pub success: bool,
    #[serde(
        default,
        rename = "configSchemaValidationErrors",
        deserialize_with = "embedded_json"
    )]
    pub validation_errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DeleteResult {
    pub success: bool,
}

// =============================================================================
// Teams
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageBucketInfo {
    pub name: String,
    pub provider: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OrganizationRef {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub organization: Option<OrganizationRef>,
    #[serde(default)]
    pub storage_bucket_info: Option<StorageBucketInfo>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Organization {
    pub id: String,
    /// Whether the organization still has room for another team
    #[serde(default = "available_by_default")]
    pub available: bool,
}

fn available_by_default() -> bool {
    true
}

/// Variables of the `CreateTeam` mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamInput {
    pub team_name: String,
    pub organization_id: Option<String>,
    pub storage_bucket_info: Option<StorageBucketInfo>,
}

// =============================================================================
// Serde helpers
// =============================================================================

/// Accept a field either as embedded JSON or as a JSON-encoded string.
///
/// `null` and the empty string decode to the type's default.
fn embedded_json<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    match raw {
        serde_json::Value::Null => Ok(T::default()),
        serde_json::Value::String(s) if s.trim().is_empty() => Ok(T::default()),
        serde_json::Value::String(s) => {
            serde_json::from_str(&s).map_err(serde::de::Error::custom)
        }
        other => serde_json::from_value(other).map_err(serde::de::Error::custom),
    }
}
