//! Lifecycle controller for `wandb_run_queue`
//!
//! Create and Update are the same upsert keyed by `(entity_name, name)`; the
//! server has no patch verb. Read reconciles the server's enveloped,
//! list-shaped representation back into the attribute shapes users write,
//! keeping the prior text whenever it already means the same thing.

use std::collections::{BTreeMap, HashMap};

use log::{debug, trace, warn};
use tokio_util::sync::CancellationToken;
use wandb_core::diagnostic::{Applied, Diagnostic};
use wandb_core::provider::{ProviderError, ProviderResult};
use wandb_core::resource::{Resource, ResourceId, State, Value};

use crate::codec::{self, ENVELOPE_KEY};
use crate::gateway::LaunchApi;
use crate::identifier;
use crate::resources::{PRIORITIZATION_DISABLED, PRIORITIZATION_V0, run_queue_schema, validated};
use crate::types::{DefaultResourceConfig, RUN_QUEUE_PROJECT, RunQueue, UpsertRunQueueInput};

#[derive(Debug, Clone, Copy)]
enum Action {
    Create,
    Update,
}

impl Action {
    fn verb(self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
        }
    }

    fn noun(self) -> &'static str {
        match self {
            Action::Create => "creation",
            Action::Update => "update",
        }
    }
}

/// Desired run queue after defaults and validation
#[derive(Debug, Clone, PartialEq)]
struct RunQueuePlan {
    name: String,
    entity_name: String,
    resource: String,
    resource_config: Option<String>,
    template_variables: Option<String>,
    prioritization_mode: String,
    external_links: BTreeMap<String, String>,
}

impl RunQueuePlan {
    fn from_resource(resource: &Resource) -> ProviderResult<Self> {
        let resource = validated(&run_queue_schema(), resource)?;
        let string = |key: &str| resource.get_string(key).unwrap_or_default().to_string();
        let external_links = resource
            .attributes
            .get("external_links")
            .and_then(Value::as_map)
            .map(|links| {
                links
                    .iter()
                    .filter_map(|(label, url)| {
                        url.as_str().map(|url| (label.clone(), url.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            name: string("name"),
            entity_name: string("entity_name"),
            resource: string("resource"),
            resource_config: resource.get_string("resource_config").map(str::to_string),
            template_variables: resource.get_string("template_variables").map(str::to_string),
            prioritization_mode: string("prioritization_mode"),
            external_links,
        })
    }

    fn identifier(&self) -> String {
        identifier::encode(&self.entity_name, &self.name)
    }

    /// Attributes persisted after a successful upsert
    fn into_attributes(self, template_variables: Option<String>) -> HashMap<String, Value> {
        let mut attributes = HashMap::new();
        attributes.insert("id".to_string(), Value::String(self.identifier()));
        attributes.insert("name".to_string(), Value::String(self.name));
        attributes.insert("entity_name".to_string(), Value::String(self.entity_name));
        attributes.insert("resource".to_string(), Value::String(self.resource));
        attributes.insert(
            "prioritization_mode".to_string(),
            Value::String(self.prioritization_mode),
        );
        if let Some(config) = self.resource_config {
            attributes.insert("resource_config".to_string(), Value::String(config));
        }
        if let Some(variables) = template_variables {
            attributes.insert("template_variables".to_string(), Value::String(variables));
        }
        if !self.external_links.is_empty() {
            attributes.insert("external_links".to_string(), links_value(self.external_links));
        }
        attributes
    }
}

fn links_value(links: BTreeMap<String, String>) -> Value {
    Value::Map(
        links
            .into_iter()
            .map(|(label, url)| (label, Value::String(url)))
            .collect(),
    )
}

/// Keep the prior text when it is the same JSON document as the server's
fn keep_equivalent(prior: Option<&str>, server: String) -> String {
    match prior {
        Some(prior) if codec::json_equivalent(prior, &server) => prior.to_string(),
        _ => server,
    }
}

/// Reconstruct `resource_config` from the server's stored configuration
fn read_resource_config(
    config: &DefaultResourceConfig,
    prior: Option<&str>,
) -> ProviderResult<Option<String>> {
    if codec::is_empty_config(&config.config, &config.resource) {
        return Ok(prior.map(str::to_string));
    }

    let prior_enveloped = prior.is_some_and(|p| codec::has_envelope(p, &config.resource));
    let server = if prior_enveloped || !config.config.contains_key(ENVELOPE_KEY) {
        serde_json::Value::Object(config.config.clone()).to_string()
    } else {
        codec::envelope_contents(&config.config, &config.resource)
            .map_err(|e| {
                ProviderError::configuration("Unexpected resource config returned by the API")
                    .with_cause(e)
            })?
            .to_string()
    };
    Ok(Some(keep_equivalent(prior, server)))
}

/// Reconstruct `template_variables` from the server's variable list
fn read_template_variables(
    config: &DefaultResourceConfig,
    prior: Option<&str>,
) -> ProviderResult<Option<String>> {
    if config.template_variables.is_empty() {
        return Ok(prior.map(str::to_string));
    }

    let decode_error = |e: codec::CodecError| {
        ProviderError::configuration("Could not decode template variables returned by the API")
            .with_cause(e)
    };
    let variables =
        codec::template_vars_list_to_map(&config.template_variables).map_err(decode_error)?;
    let text = serde_json::to_string(&variables).map_err(|e| {
        ProviderError::configuration("Could not encode template variables").with_cause(e)
    })?;
    let normalized = codec::normalize_template_variables(Some(&text)).map_err(decode_error)?;
    Ok(Some(keep_equivalent(prior, normalized.unwrap_or(text))))
}

/// Map a server run queue onto resource attributes
fn queue_attributes(
    queue: &RunQueue,
    entity: &str,
    prior: Option<&State>,
) -> ProviderResult<HashMap<String, Value>> {
    let entity_name = if queue.entity_name.is_empty() {
        entity
    } else {
        queue.entity_name.as_str()
    };
    let prior_text = |key: &str| prior.and_then(|state| state.get_string(key));
    let config = &queue.default_resource_config;

    let mut attributes = HashMap::new();
    attributes.insert(
        "id".to_string(),
        Value::String(identifier::encode(entity_name, &queue.name)),
    );
    attributes.insert("name".to_string(), Value::String(queue.name.clone()));
    attributes.insert(
        "entity_name".to_string(),
        Value::String(entity_name.to_string()),
    );
    attributes.insert(
        "resource".to_string(),
        Value::String(config.resource.clone()),
    );
    if let Some(mode) = queue.prioritization_mode.as_deref().filter(|m| !m.is_empty()) {
        attributes.insert(
            "prioritization_mode".to_string(),
            Value::String(mode.to_string()),
        );
    }
    if let Some(text) = read_resource_config(config, prior_text("resource_config"))? {
        attributes.insert("resource_config".to_string(), Value::String(text));
    }
    if let Some(text) = read_template_variables(config, prior_text("template_variables"))? {
        attributes.insert("template_variables".to_string(), Value::String(text));
    }

    let links = codec::external_links_list_to_map(&queue.external_links);
    let prior_had_links =
        prior.is_some_and(|state| state.attributes.contains_key("external_links"));
    if !links.is_empty() || prior_had_links {
        attributes.insert("external_links".to_string(), links_value(links));
    }

    for (key, value) in [
        ("created_at", &queue.created_at),
        ("updated_at", &queue.updated_at),
    ] {
        if let Some(value) = value {
            attributes.insert(key.to_string(), Value::String(value.clone()));
        }
    }
    Ok(attributes)
}

/// Run queue lifecycle over a `LaunchApi`
pub struct RunQueueController<'a> {
    api: &'a dyn LaunchApi,
    cancel: &'a CancellationToken,
}

impl<'a> RunQueueController<'a> {
    pub fn new(api: &'a dyn LaunchApi, cancel: &'a CancellationToken) -> Self {
        Self { api, cancel }
    }

    pub async fn create(&self, resource: &Resource) -> ProviderResult<Applied> {
        let plan = RunQueuePlan::from_resource(resource)?;
        self.upsert(&resource.id, plan, Action::Create).await
    }

    pub async fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<Applied> {
        let plan = RunQueuePlan::from_resource(to)?;

        if from.get_string("prioritization_mode") == Some(PRIORITIZATION_V0)
            && plan.prioritization_mode == PRIORITIZATION_DISABLED
        {
            return Err(ProviderError::configuration(
                "prioritization_mode cannot be changed from V0 back to disabled",
            )
            .for_resource(id.clone()));
        }

        if let Ok((_, current)) = identifier::decode(identifier)
            && current != plan.name
        {
            warn!(
                "{}: renaming run queue '{}' to '{}' creates a new queue; '{}' is left in place",
                id, current, plan.name, current
            );
        }

        self.upsert(id, plan, Action::Update).await
    }

    async fn upsert(
        &self,
        id: &ResourceId,
        plan: RunQueuePlan,
        action: Action,
    ) -> ProviderResult<Applied> {
        let template_variables =
            codec::normalize_template_variables(plan.template_variables.as_deref()).map_err(|e| {
                ProviderError::configuration("Invalid template_variables")
                    .for_resource(id.clone())
                    .with_cause(e)
            })?;
        let resource_config =
            codec::inject_envelope(plan.resource_config.as_deref().unwrap_or(""), &plan.resource)
                .map_err(|e| {
                    ProviderError::configuration("Invalid resource_config")
                        .for_resource(id.clone())
                        .with_cause(e)
                })?;

        let input = UpsertRunQueueInput {
            entity_name: plan.entity_name.clone(),
            project_name: RUN_QUEUE_PROJECT.to_string(),
            queue_name: plan.name.clone(),
            resource_type: plan.resource.clone(),
            resource_config,
            template_variables: template_variables.clone(),
            prioritization_mode: Some(plan.prioritization_mode.clone()),
            external_links: codec::external_links_map_to_envelope(&plan.external_links),
        };

        debug!("{}: upserting run queue {}", id, plan.identifier());
        let result = self
            .api
            .upsert_run_queue(input, self.cancel)
            .await
            .map_err(|e| {
                ProviderError::remote(format!("Could not {} run queue", action.verb()))
                    .for_resource(id.clone())
                    .with_cause(e)
            })?;

        if !result.success {
            return Err(ProviderError::business_failure(format!(
                "Failed to {} run queue: the API did not confirm the {} of the run queue",
                action.verb(),
                action.noun()
            ))
            .for_resource(id.clone()));
        }

        let identifier = plan.identifier();
        let state = State::existing(id.clone(), plan.into_attributes(template_variables))
            .with_identifier(identifier.clone());
        let mut applied = Applied::new(state);

        if !result.validation_errors.is_empty() {
            let detail = result.validation_errors.join(", ");
            warn!("{}: config schema validation errors: {}", id, detail);
            applied = applied.with_warning(Diagnostic::warning(
                "Config schema validation errors",
                detail,
            ));
        }

        trace!("{}: {} of run queue {} complete", id, action.noun(), identifier);
        Ok(applied)
    }

    /// Refresh state; `State::not_found` when the queue was deleted remotely
    pub async fn read(
        &self,
        id: &ResourceId,
        identifier: &str,
        prior: Option<&State>,
    ) -> ProviderResult<State> {
        let (entity, name) = decode(id, identifier)?;

        let queue = self
            .api
            .get_run_queue(entity, name, self.cancel)
            .await
            .map_err(|e| {
                ProviderError::remote("Could not read run queue")
                    .for_resource(id.clone())
                    .with_cause(e)
            })?;

        let Some(queue) = queue else {
            debug!("{}: run queue {} no longer exists", id, identifier);
            return Ok(State::not_found(id.clone()));
        };

        let attributes =
            queue_attributes(&queue, entity, prior).map_err(|e| e.for_resource(id.clone()))?;
        let identifier = identifier::encode(
            attributes
                .get("entity_name")
                .and_then(Value::as_str)
                .unwrap_or(entity),
            &queue.name,
        );
        trace!("{}: read run queue {}", id, identifier);
        Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
    }

    /// Delete by resolving the server-internal ID first. An already-absent
    /// queue is an error.
    pub async fn delete(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        let (entity, name) = decode(id, identifier)?;

        let queue = self
            .api
            .get_run_queue(entity, name, self.cancel)
            .await
            .map_err(|e| {
                ProviderError::remote("Could not read run queue before deletion")
                    .for_resource(id.clone())
                    .with_cause(e)
            })?
            .ok_or_else(|| {
                ProviderError::not_found(format!("Run queue '{}' not found", identifier))
                    .for_resource(id.clone())
            })?;

        debug!("{}: deleting run queue {} ({})", id, identifier, queue.id);
        let result = self
            .api
            .delete_run_queues(vec![queue.id.clone()], self.cancel)
            .await
            .map_err(|e| {
                ProviderError::remote("Could not delete run queue")
                    .for_resource(id.clone())
                    .with_cause(e)
            })?;

        if !result.success {
            return Err(ProviderError::business_failure(
                "Failed to delete run queue: the API did not confirm the deletion of the run queue",
            )
            .for_resource(id.clone()));
        }

        trace!("{}: deleted run queue {}", id, identifier);
        Ok(())
    }

    /// Adopt an existing queue by its composite identifier
    pub async fn import(&self, id: &ResourceId, identifier: &str) -> ProviderResult<State> {
        let state = self.read(id, identifier, None).await?;
        if !state.exists {
            return Err(ProviderError::not_found(format!(
                "Cannot import run queue '{}': it does not exist",
                identifier
            ))
            .for_resource(id.clone()));
        }
        Ok(state)
    }
}

fn decode<'i>(id: &ResourceId, identifier: &'i str) -> ProviderResult<(&'i str, &'i str)> {
    identifier::decode(identifier).map_err(|e| {
        ProviderError::configuration("Invalid run queue ID")
            .for_resource(id.clone())
            .with_cause(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeApi;
    use crate::types::{ExternalLink, ExternalLinks, TemplateVariableWithName};
    use wandb_core::provider::ErrorKind;

    const ENTITY: &str = "terraform-acceptance-test";
    const QUEUE: &str = "example-queue";

    fn queue_resource() -> Resource {
        Resource::new("wandb_run_queue", "example")
            .with_attribute("name", Value::String(QUEUE.to_string()))
            .with_attribute("entity_name", Value::String(ENTITY.to_string()))
            .with_attribute("resource", Value::String("kubernetes".to_string()))
    }

    fn str_attr(value: &str) -> Value {
        Value::String(value.to_string())
    }

    fn parse(text: &str) -> serde_json::Value {
        serde_json::from_str(text).unwrap()
    }

    #[tokio::test]
    async fn create_defaults_prioritization_and_sets_composite_id() {
        let api = FakeApi::new();
        let cancel = CancellationToken::new();
        let controller = RunQueueController::new(&api, &cancel);

        let resource = queue_resource().with_attribute("resource_config", str_attr(""));
        let applied = controller.create(&resource).await.unwrap();

        assert!(applied.warnings.is_empty());
        let state = applied.state;
        assert_eq!(
            state.identifier.as_deref(),
            Some("terraform-acceptance-test:example-queue")
        );
        assert_eq!(
            state.get_string("id"),
            Some("terraform-acceptance-test:example-queue")
        );
        assert_eq!(state.get_string("prioritization_mode"), Some("V0"));
        assert!(!state.attributes.contains_key("resource_config"));

        let upserts = api.upserts();
        assert_eq!(upserts.len(), 1);
        assert_eq!(upserts[0].project_name, "model-registry");
        assert_eq!(
            parse(&upserts[0].resource_config),
            serde_json::json!({"resource_args": {"kubernetes": {}}})
        );
        assert_eq!(upserts[0].prioritization_mode.as_deref(), Some("V0"));
        assert_eq!(upserts[0].template_variables, None);
        assert_eq!(upserts[0].external_links, None);
    }

    #[tokio::test]
    async fn create_sends_enveloped_config_and_links() {
        let api = FakeApi::new();
        let cancel = CancellationToken::new();
        let controller = RunQueueController::new(&api, &cancel);

        let mut links = HashMap::new();
        links.insert("dashboard".to_string(), str_attr("https://grafana.example.com"));
        let resource = queue_resource()
            .with_attribute(
                "resource_config",
                str_attr(
                    r#"{"apiVersion":"batch/v1","kind":"Job","metadata":{"name":"example-job"}}"#,
                ),
            )
            .with_attribute(
                "template_variables",
                str_attr(r#"{"gpus": {"schema": {"type": "integer", "minimum": 0}}}"#),
            )
            .with_attribute("prioritization_mode", str_attr("disabled"))
            .with_attribute("external_links", Value::Map(links));

        let applied = controller.create(&resource).await.unwrap();
        let upserts = api.upserts();
        let upsert = &upserts[0];
        assert_eq!(
            parse(&upsert.resource_config),
            serde_json::json!({"resource_args": {"kubernetes": {
                "apiVersion": "batch/v1",
                "kind": "Job",
                "metadata": {"name": "example-job"}
            }}})
        );
        assert_eq!(
            upsert.template_variables.as_deref(),
            Some(r#"{"gpus":{"schema":{"minimum":0,"type":"integer"}}}"#)
        );
        assert_eq!(
            upsert.external_links.as_deref(),
            Some(r#"{"links":[{"label":"dashboard","url":"https://grafana.example.com"}]}"#)
        );
        assert_eq!(upsert.prioritization_mode.as_deref(), Some("disabled"));

        // state keeps the canonical template variables
        assert_eq!(
            applied.state.get_string("template_variables"),
            upsert.template_variables.as_deref()
        );
    }

    #[tokio::test]
    async fn create_surfaces_validation_errors_as_warning() {
        let api = FakeApi::new().with_validation_errors(vec![
            "spec.template: required".to_string(),
            "metadata.name: invalid".to_string(),
        ]);
        let cancel = CancellationToken::new();
        let controller = RunQueueController::new(&api, &cancel);

        let applied = controller.create(&queue_resource()).await.unwrap();
        assert!(applied.state.exists);
        assert_eq!(applied.warnings.len(), 1);
        assert!(!applied.warnings[0].is_error());
        assert_eq!(applied.warnings[0].summary, "Config schema validation errors");
        assert_eq!(
            applied.warnings[0].detail,
            "spec.template: required, metadata.name: invalid"
        );
    }

    #[tokio::test]
    async fn create_unconfirmed_is_business_failure() {
        let api = FakeApi::new().rejecting_upserts();
        let cancel = CancellationToken::new();
        let controller = RunQueueController::new(&api, &cancel);

        let err = controller.create(&queue_resource()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::BusinessFailure);
        assert!(err.message.contains("did not confirm the creation"));
    }

    #[tokio::test]
    async fn create_transport_failure_is_remote() {
        let api = FakeApi::new().failing("connection refused");
        let cancel = CancellationToken::new();
        let controller = RunQueueController::new(&api, &cancel);

        let err = controller.create(&queue_resource()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Remote);
        assert_eq!(
            err.to_string(),
            "[wandb_run_queue.example] Could not create run queue: graphql: connection refused"
        );
    }

    #[tokio::test]
    async fn create_rejects_enveloped_config_before_calling_api() {
        let api = FakeApi::new();
        let cancel = CancellationToken::new();
        let controller = RunQueueController::new(&api, &cancel);

        let resource = queue_resource().with_attribute(
            "resource_config",
            str_attr(r#"{"resource_args":{"kubernetes":{"kind":"Job"}}}"#),
        );
        let err = controller.create(&resource).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
        assert!(api.upserts().is_empty());
    }

    #[tokio::test]
    async fn create_requires_entity_name() {
        let api = FakeApi::new();
        let cancel = CancellationToken::new();
        let controller = RunQueueController::new(&api, &cancel);

        let mut resource = queue_resource();
        resource.attributes.remove("entity_name");
        let err = controller.create(&resource).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
        assert!(err.message.contains("entity_name"));
        assert!(api.upserts().is_empty());
    }

    #[tokio::test]
    async fn read_after_create_keeps_user_text() {
        let api = FakeApi::new();
        let cancel = CancellationToken::new();
        let controller = RunQueueController::new(&api, &cancel);

        let config = r#"{ "kind": "Job", "apiVersion": "batch/v1" }"#;
        let resource = queue_resource().with_attribute("resource_config", str_attr(config));
        let created = controller.create(&resource).await.unwrap().state;

        let identifier = created.identifier.clone().unwrap();
        let read = controller
            .read(&created.id, &identifier, Some(&created))
            .await
            .unwrap();

        assert!(read.exists);
        assert_eq!(read.get_string("resource_config"), Some(config));
        assert_eq!(read.get_string("name"), Some(QUEUE));
        assert_eq!(read.get_string("entity_name"), Some(ENTITY));
        assert_eq!(read.get_string("resource"), Some("kubernetes"));
        assert_eq!(read.get_string("prioritization_mode"), Some("V0"));
        assert_eq!(read.identifier, created.identifier);
        assert!(!read.attributes.contains_key("external_links"));
    }

    #[tokio::test]
    async fn read_strips_envelope_without_prior_state() {
        let api = FakeApi::new();
        api.insert_queue(RunQueue {
            id: "UnVuUXVldWU6MQ==".to_string(),
            name: QUEUE.to_string(),
            entity_name: ENTITY.to_string(),
            prioritization_mode: Some("V0".to_string()),
            external_links: ExternalLinks {
                links: vec![
                    ExternalLink {
                        label: "docs".to_string(),
                        url: "https://old.example.com".to_string(),
                    },
                    ExternalLink {
                        label: "docs".to_string(),
                        url: "https://new.example.com".to_string(),
                    },
                ],
            },
            created_at: Some("2024-05-01T10:00:00".to_string()),
            updated_at: None,
            default_resource_config: DefaultResourceConfig {
                id: None,
                resource: "vertex".to_string(),
                config: parse(
                    r#"{"resource_args":{"vertex":{"spec":{"staging_bucket":"gs://b"}}}}"#,
                )
                .as_object()
                .unwrap()
                .clone(),
                template_variables: vec![TemplateVariableWithName {
                    name: "machine".to_string(),
                    description: Some("Machine type".to_string()),
                    schema: r#"{"type":"string","enum":["n1","a2"],"default":"n1"}"#.to_string(),
                }],
            },
        });
        let cancel = CancellationToken::new();
        let controller = RunQueueController::new(&api, &cancel);
        let id = ResourceId::new("wandb_run_queue", "imported");

        let state = controller
            .read(&id, "terraform-acceptance-test:example-queue", None)
            .await
            .unwrap();

        assert_eq!(
            parse(state.get_string("resource_config").unwrap()),
            serde_json::json!({"spec": {"staging_bucket": "gs://b"}})
        );
        assert_eq!(
            state.get_string("template_variables"),
            Some(concat!(
                r#"{"machine":{"description":"Machine type","#,
                r#""schema":{"default":"n1","enum":["n1","a2"],"type":"string"}}}"#
            ))
        );
        let links = state.attributes.get("external_links").and_then(Value::as_map).unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links.get("docs"), Some(&str_attr("https://new.example.com")));
        assert_eq!(state.get_string("created_at"), Some("2024-05-01T10:00:00"));
        assert!(!state.attributes.contains_key("updated_at"));
    }

    #[tokio::test]
    async fn read_passes_through_when_prior_config_is_enveloped() {
        let api = FakeApi::new();
        let cancel = CancellationToken::new();
        let controller = RunQueueController::new(&api, &cancel);

        let created = controller
            .create(
                &queue_resource().with_attribute("resource_config", str_attr(r#"{"kind":"Job"}"#)),
            )
            .await
            .unwrap()
            .state;

        let mut prior = created.clone();
        prior.attributes.insert(
            "resource_config".to_string(),
            str_attr(r#"{"resource_args": {"kubernetes": {"kind": "Job"}}}"#),
        );
        let read = controller
            .read(&created.id, "terraform-acceptance-test:example-queue", Some(&prior))
            .await
            .unwrap();
        assert_eq!(
            read.get_string("resource_config"),
            Some(r#"{"resource_args": {"kubernetes": {"kind": "Job"}}}"#)
        );
    }

    #[tokio::test]
    async fn read_reports_server_changes() {
        let api = FakeApi::new();
        let cancel = CancellationToken::new();
        let controller = RunQueueController::new(&api, &cancel);

        let mut links = HashMap::new();
        links.insert("docs".to_string(), str_attr("https://example.com"));
        let created = controller
            .create(
                &queue_resource()
                    .with_attribute("resource_config", str_attr(r#"{"kind":"Job"}"#))
                    .with_attribute("external_links", Value::Map(links)),
            )
            .await
            .unwrap()
            .state;

        api.edit_queue(ENTITY, QUEUE, |queue| {
            queue.default_resource_config.config = parse(
                r#"{"resource_args":{"kubernetes":{"kind":"CronJob"}}}"#,
            )
            .as_object()
            .unwrap()
            .clone();
            queue.external_links = ExternalLinks::default();
        });

        let read = controller
            .read(&created.id, "terraform-acceptance-test:example-queue", Some(&created))
            .await
            .unwrap();
        assert_eq!(read.get_string("resource_config"), Some(r#"{"kind":"CronJob"}"#));
        assert_eq!(
            read.attributes.get("external_links"),
            Some(&Value::Map(HashMap::new()))
        );
    }

    #[tokio::test]
    async fn read_missing_queue_is_not_found_state() {
        let api = FakeApi::new();
        let cancel = CancellationToken::new();
        let controller = RunQueueController::new(&api, &cancel);
        let id = ResourceId::new("wandb_run_queue", "gone");

        let state = controller.read(&id, "entity:gone", None).await.unwrap();
        assert!(!state.exists);
    }

    fn stored_queue(
        name: &str,
        config: &str,
        template_variables: Vec<TemplateVariableWithName>,
    ) -> RunQueue {
        RunQueue {
            id: format!("RunQueue:{}", name),
            name: name.to_string(),
            entity_name: ENTITY.to_string(),
            prioritization_mode: Some("V0".to_string()),
            external_links: ExternalLinks::default(),
            created_at: None,
            updated_at: None,
            default_resource_config: DefaultResourceConfig {
                id: None,
                resource: "kubernetes".to_string(),
                config: parse(config).as_object().unwrap().clone(),
                template_variables,
            },
        }
    }

    #[tokio::test]
    async fn read_mismatched_envelope_is_configuration_error() {
        let api = FakeApi::new();
        api.insert_queue(stored_queue(
            "mismatched",
            r#"{"resource_args":{"vertex":{"a":1}}}"#,
            Vec::new(),
        ));
        let cancel = CancellationToken::new();
        let controller = RunQueueController::new(&api, &cancel);
        let id = ResourceId::new("wandb_run_queue", "mismatched");

        let err = controller
            .read(&id, "terraform-acceptance-test:mismatched", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
        assert!(err.to_string().contains("'kubernetes' not found in resource_args"));
    }

    #[tokio::test]
    async fn read_unparseable_variable_schema_is_configuration_error() {
        let api = FakeApi::new();
        api.insert_queue(stored_queue(
            "bad-schema",
            r#"{"resource_args":{"kubernetes":{"kind":"Job"}}}"#,
            vec![TemplateVariableWithName {
                name: "v".to_string(),
                description: None,
                schema: "not json".to_string(),
            }],
        ));
        let cancel = CancellationToken::new();
        let controller = RunQueueController::new(&api, &cancel);
        let id = ResourceId::new("wandb_run_queue", "bad-schema");

        let err = controller
            .read(&id, "terraform-acceptance-test:bad-schema", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
        assert!(err.to_string().contains("template variable 'v'"));
    }

    #[tokio::test]
    async fn read_rejects_malformed_identifier() {
        let api = FakeApi::new();
        let cancel = CancellationToken::new();
        let controller = RunQueueController::new(&api, &cancel);
        let id = ResourceId::new("wandb_run_queue", "bad");

        let err = controller.read(&id, "no-separator", None).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
        assert_eq!(api.calls(), 0);
    }

    #[tokio::test]
    async fn update_cannot_disable_prioritization() {
        let api = FakeApi::new();
        let cancel = CancellationToken::new();
        let controller = RunQueueController::new(&api, &cancel);

        let created = controller.create(&queue_resource()).await.unwrap().state;
        let to = queue_resource().with_attribute("prioritization_mode", str_attr("disabled"));
        let err = controller
            .update(&created.id, "terraform-acceptance-test:example-queue", &created, &to)
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Configuration);
        assert_eq!(api.upserts().len(), 1);
    }

    #[tokio::test]
    async fn update_upserts_by_name() {
        let api = FakeApi::new();
        let cancel = CancellationToken::new();
        let controller = RunQueueController::new(&api, &cancel);

        let created = controller.create(&queue_resource()).await.unwrap().state;
        let to = queue_resource().with_attribute("resource_config", str_attr(r#"{"kind":"Job"}"#));
        let applied = controller
            .update(&created.id, "terraform-acceptance-test:example-queue", &created, &to)
            .await
            .unwrap();

        assert_eq!(applied.state.get_string("resource_config"), Some(r#"{"kind":"Job"}"#));
        let upserts = api.upserts();
        assert_eq!(upserts.len(), 2);
        assert_eq!(upserts[1].queue_name, QUEUE);
        assert_eq!(api.queue_count(), 1);
    }

    #[tokio::test]
    async fn update_unconfirmed_is_business_failure() {
        let api = FakeApi::new();
        let cancel = CancellationToken::new();
        let controller = RunQueueController::new(&api, &cancel);
        let created = controller.create(&queue_resource()).await.unwrap().state;

        let api = api.rejecting_upserts();
        let controller = RunQueueController::new(&api, &cancel);
        let err = controller
            .update(
                &created.id,
                "terraform-acceptance-test:example-queue",
                &created,
                &queue_resource(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::BusinessFailure);
        assert!(err.message.contains("did not confirm the update"));
    }

    #[tokio::test]
    async fn delete_resolves_server_id() {
        let api = FakeApi::new();
        let cancel = CancellationToken::new();
        let controller = RunQueueController::new(&api, &cancel);

        let created = controller.create(&queue_resource()).await.unwrap().state;
        let server_id = api.queue(ENTITY, QUEUE).unwrap().id;

        controller
            .delete(&created.id, "terraform-acceptance-test:example-queue")
            .await
            .unwrap();
        assert_eq!(api.deleted_queue_ids(), vec![server_id]);
        assert!(api.queue(ENTITY, QUEUE).is_none());
    }

    #[tokio::test]
    async fn delete_already_absent_queue_is_not_found_error() {
        let api = FakeApi::new();
        let cancel = CancellationToken::new();
        let controller = RunQueueController::new(&api, &cancel);
        let id = ResourceId::new("wandb_run_queue", "example");

        let err = controller
            .delete(&id, "terraform-acceptance-test:example-queue")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert!(api.deleted_queue_ids().is_empty());
    }

    #[tokio::test]
    async fn delete_unconfirmed_is_business_failure() {
        let api = FakeApi::new().rejecting_deletes();
        let cancel = CancellationToken::new();
        let controller = RunQueueController::new(&api, &cancel);

        let created = controller.create(&queue_resource()).await.unwrap().state;
        let err = controller
            .delete(&created.id, "terraform-acceptance-test:example-queue")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::BusinessFailure);
    }

    #[tokio::test]
    async fn import_reads_by_identifier() {
        let api = FakeApi::new();
        let cancel = CancellationToken::new();
        let controller = RunQueueController::new(&api, &cancel);
        controller.create(&queue_resource()).await.unwrap();

        let id = ResourceId::new("wandb_run_queue", "adopted");
        let state = controller
            .import(&id, "terraform-acceptance-test:example-queue")
            .await
            .unwrap();
        assert_eq!(state.id, id);
        assert_eq!(state.get_string("name"), Some(QUEUE));

        let err = controller.import(&id, "terraform-acceptance-test:other").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
