//! Resource type definitions for the W&B provider
//!
//! This module defines:
//! - Resource type definitions (implementing ResourceType trait)
//! - Attribute names and enum domains shared by the controllers

use wandb_core::provider::{ProviderError, ProviderResult, ResourceType};
use wandb_core::resource::{Resource, Value};
use wandb_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

pub const RUN_QUEUE: &str = "wandb_run_queue";
pub const TEAM: &str = "wandb_team";

/// Execution backends a run queue can target
pub const RESOURCE_KINDS: &[&str] = &["local-container", "kubernetes", "vertex", "sagemaker"];

pub const PRIORITIZATION_DISABLED: &str = "disabled";
pub const PRIORITIZATION_V0: &str = "V0";

// =============================================================================
// Resource Type Definitions
// =============================================================================

macro_rules! define_resource_type {
    ($name:ident, $type_name:expr, $schema:ident) => {
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                $type_name
            }
            fn schema(&self) -> ResourceSchema {
                $schema()
            }
        }
    };
}

define_resource_type!(RunQueueType, RUN_QUEUE, run_queue_schema);
define_resource_type!(TeamType, TEAM, team_schema);

/// Returns all resource types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![Box::new(RunQueueType), Box::new(TeamType)]
}

/// Apply schema defaults and reject the resource if any attribute is invalid
pub fn validated(schema: &ResourceSchema, resource: &Resource) -> ProviderResult<Resource> {
    let mut attributes = resource.attributes.clone();
    schema.apply_defaults(&mut attributes);
    schema.validate(&attributes).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        ProviderError::configuration(format!(
            "Invalid {} configuration: {}",
            schema.resource_type,
            messages.join("; ")
        ))
        .for_resource(resource.id.clone())
    })?;
    Ok(Resource {
        id: resource.id.clone(),
        attributes,
    })
}

fn enum_of(values: &[&str]) -> AttributeType {
    AttributeType::Enum(values.iter().map(|v| v.to_string()).collect())
}

// =============================================================================
// Schemas
// =============================================================================

pub fn run_queue_schema() -> ResourceSchema {
    ResourceSchema::new(RUN_QUEUE)
        .with_description("A launch run queue owned by a W&B entity")
        .attribute(
            AttributeSchema::new("id", AttributeType::String)
                .computed()
                .with_description("Composite identifier '<entity_name>:<name>'"),
        )
        .attribute(AttributeSchema::new("name", AttributeType::String).required())
        .attribute(
            AttributeSchema::new("entity_name", AttributeType::String)
                .required()
                .with_description("Entity that owns the queue"),
        )
        .attribute(
            AttributeSchema::new("resource", enum_of(RESOURCE_KINDS))
                .required()
                .with_description("Execution backend"),
        )
        .attribute(
            AttributeSchema::new("resource_config", types::json_object())
                .with_description("Backend parameters as a JSON object, without 'resource_args'"),
        )
        .attribute(
            AttributeSchema::new("template_variables", types::json_object())
                .with_description("Template variables keyed by name, as a JSON object"),
        )
        .attribute(
            AttributeSchema::new(
                "prioritization_mode",
                enum_of(&[PRIORITIZATION_DISABLED, PRIORITIZATION_V0]),
            )
            .with_default(Value::String(PRIORITIZATION_V0.to_string())),
        )
        .attribute(
            AttributeSchema::new("external_links", types::string_map())
                .with_description("Links shown on the queue page, keyed by label"),
        )
        .attribute(AttributeSchema::new("created_at", AttributeType::String).computed())
        .attribute(AttributeSchema::new("updated_at", AttributeType::String).computed())
}

pub fn team_schema() -> ResourceSchema {
    ResourceSchema::new(TEAM)
        .with_description("A W&B team")
        .attribute(AttributeSchema::new("id", AttributeType::String).computed())
        .attribute(AttributeSchema::new("team_name", AttributeType::String).required())
        .attribute(
            AttributeSchema::new("organization_name", AttributeType::String)
                .with_description("Organization the team belongs to"),
        )
        .attribute(AttributeSchema::new("storage_bucket_name", AttributeType::String))
        .attribute(AttributeSchema::new("storage_bucket_provider", AttributeType::String))
        .attribute(AttributeSchema::new("created_at", AttributeType::String).computed())
        .attribute(AttributeSchema::new("updated_at", AttributeType::String).computed())
}
