//! In-memory test doubles for the gateway and transport

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use wandb_core::provider::BoxFuture;

use crate::gateway::LaunchApi;
use crate::graphql::{GatewayError, GatewayResult, GraphQlRequest, GraphQlTransport};
use crate::types::{
    DefaultResourceConfig, DeleteResult, ExternalLinks, Organization, OrganizationRef, RunQueue,
    Team, TeamInput, TemplateVariable, TemplateVariableWithName, UpsertRunQueueInput,
    UpsertRunQueueResult,
};

/// Transport that replays canned responses and records every request
pub struct RecordingTransport {
    responses: Mutex<VecDeque<GatewayResult<Value>>>,
    requests: Mutex<Vec<GraphQlRequest>>,
}

impl RecordingTransport {
    pub fn new(responses: Vec<GatewayResult<Value>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<GraphQlRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl GraphQlTransport for RecordingTransport {
    fn execute<'a>(
        &'a self,
        request: GraphQlRequest,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, GatewayResult<Value>> {
        self.requests.lock().unwrap().push(request);
        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(GatewayError::EmptyResponse));
        Box::pin(async move { response })
    }
}

#[derive(Default)]
struct Remote {
    queues: BTreeMap<(String, String), RunQueue>,
    teams: BTreeMap<String, Team>,
    organizations: BTreeMap<String, Organization>,
    upserts: Vec<UpsertRunQueueInput>,
    team_inputs: Vec<TeamInput>,
    deleted_queue_ids: Vec<String>,
    next_id: usize,
}

/// `LaunchApi` backed by in-memory maps, with switches for failure modes
#[derive(Default)]
pub struct FakeApi {
    remote: Mutex<Remote>,
    calls: AtomicUsize,
    validation_errors: Vec<String>,
    reject_upserts: bool,
    reject_deletes: bool,
    failure: Option<String>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_validation_errors(mut self, errors: Vec<String>) -> Self {
        self.validation_errors = errors;
        self
    }

    pub fn rejecting_upserts(mut self) -> Self {
        self.reject_upserts = true;
        self
    }

    pub fn rejecting_deletes(mut self) -> Self {
        self.reject_deletes = true;
        self
    }

    /// Fail every call as if the transport had failed
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn with_organization(self, name: &str, id: &str, available: bool) -> Self {
        self.remote.lock().unwrap().organizations.insert(
            name.to_string(),
            Organization {
                id: id.to_string(),
                available,
            },
        );
        self
    }

    pub fn insert_queue(&self, queue: RunQueue) {
        let key = (queue.entity_name.clone(), queue.name.clone());
        self.remote.lock().unwrap().queues.insert(key, queue);
    }

    pub fn edit_queue(&self, entity: &str, name: &str, edit: impl FnOnce(&mut RunQueue)) {
        let mut remote = self.remote.lock().unwrap();
        let queue = remote
            .queues
            .get_mut(&(entity.to_string(), name.to_string()))
            .unwrap();
        edit(queue);
    }

    pub fn queue(&self, entity: &str, name: &str) -> Option<RunQueue> {
        self.remote
            .lock()
            .unwrap()
            .queues
            .get(&(entity.to_string(), name.to_string()))
            .cloned()
    }

    pub fn queue_count(&self) -> usize {
        self.remote.lock().unwrap().queues.len()
    }

    pub fn upserts(&self) -> Vec<UpsertRunQueueInput> {
        self.remote.lock().unwrap().upserts.clone()
    }

    pub fn team_inputs(&self) -> Vec<TeamInput> {
        self.remote.lock().unwrap().team_inputs.clone()
    }

    pub fn deleted_queue_ids(&self) -> Vec<String> {
        self.remote.lock().unwrap().deleted_queue_ids.clone()
    }

    /// Number of `LaunchApi` calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> GatewayResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(message) => Err(GatewayError::GraphQl(message.clone())),
            None => Ok(()),
        }
    }

    fn store_queue(&self, input: &UpsertRunQueueInput) -> GatewayResult<()> {
        let decode = |e: serde_json::Error| GatewayError::Decode(e.to_string());
        let config: serde_json::Map<String, Value> =
            serde_json::from_str(&input.resource_config).map_err(decode)?;
        let template_variables = match &input.template_variables {
            Some(text) => {
                let variables: BTreeMap<String, TemplateVariable> =
                    serde_json::from_str(text).map_err(decode)?;
                variables
                    .into_iter()
                    .map(|(name, variable)| {
                        Ok(TemplateVariableWithName {
                            name,
                            description: variable.description,
                            schema: serde_json::to_string(&variable.schema).map_err(decode)?,
                        })
                    })
                    .collect::<GatewayResult<Vec<_>>>()?
            }
            None => Vec::new(),
        };
        let external_links: ExternalLinks = match &input.external_links {
            Some(text) => serde_json::from_str(text).map_err(decode)?,
            None => ExternalLinks::default(),
        };

        let mut remote = self.remote.lock().unwrap();
        let key = (input.entity_name.clone(), input.queue_name.clone());
        let existing_id = remote.queues.get(&key).map(|queue| queue.id.clone());
        let id = match existing_id {
            Some(id) => id,
            None => {
                remote.next_id += 1;
                format!("RunQueue:{}", remote.next_id)
            }
        };
        remote.queues.insert(
            key,
            RunQueue {
                id,
                name: input.queue_name.clone(),
                entity_name: input.entity_name.clone(),
                prioritization_mode: input.prioritization_mode.clone(),
                external_links,
                created_at: Some("2024-05-01T10:00:00".to_string()),
                updated_at: Some("2024-05-01T10:00:00".to_string()),
                default_resource_config: DefaultResourceConfig {
                    id: None,
                    resource: input.resource_type.clone(),
                    config,
                    template_variables,
                },
            },
        );
        Ok(())
    }
}

impl LaunchApi for FakeApi {
    fn get_run_queue<'a>(
        &'a self,
        entity: &'a str,
        name: &'a str,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, GatewayResult<Option<RunQueue>>> {
        Box::pin(async move {
            self.enter()?;
            Ok(self.queue(entity, name))
        })
    }

    fn upsert_run_queue<'a>(
        &'a self,
        input: UpsertRunQueueInput,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, GatewayResult<UpsertRunQueueResult>> {
        Box::pin(async move {
            self.enter()?;
            self.remote.lock().unwrap().upserts.push(input.clone());
            if self.reject_upserts {
                return Ok(UpsertRunQueueResult::default());
            }
            self.store_queue(&input)?;
            Ok(UpsertRunQueueResult {
                success: true,
                validation_errors: self.validation_errors.clone(),
            })
        })
    }

    fn delete_run_queues<'a>(
        &'a self,
        ids: Vec<String>,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, GatewayResult<DeleteResult>> {
        Box::pin(async move {
            self.enter()?;
            if self.reject_deletes {
                return Ok(DeleteResult { success: false });
            }
            let mut remote = self.remote.lock().unwrap();
            remote.queues.retain(|_, queue| !ids.contains(&queue.id));
            remote.deleted_queue_ids.extend(ids);
            Ok(DeleteResult { success: true })
        })
    }

    fn get_team<'a>(
        &'a self,
        name: &'a str,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, GatewayResult<Option<Team>>> {
        Box::pin(async move {
            self.enter()?;
            Ok(self.remote.lock().unwrap().teams.get(name).cloned())
        })
    }

    fn resolve_org_id<'a>(
        &'a self,
        name: &'a str,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, GatewayResult<Option<Organization>>> {
        Box::pin(async move {
            self.enter()?;
            Ok(self.remote.lock().unwrap().organizations.get(name).cloned())
        })
    }

    fn upsert_team<'a>(
        &'a self,
        input: TeamInput,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, GatewayResult<Team>> {
        Box::pin(async move {
            self.enter()?;
            let mut remote = self.remote.lock().unwrap();
            remote.team_inputs.push(input.clone());
            if remote.teams.contains_key(&input.team_name) {
                return Err(GatewayError::GraphQl(format!(
                    "entity {} already exists",
                    input.team_name
                )));
            }
            let organization = input.organization_id.as_ref().and_then(|org_id| {
                remote
                    .organizations
                    .iter()
                    .find(|(_, org)| &org.id == org_id)
                    .map(|(name, _)| OrganizationRef { name: name.clone() })
            });
            remote.next_id += 1;
            let team = Team {
                id: format!("Entity:{}", remote.next_id),
                name: input.team_name.clone(),
                organization,
                storage_bucket_info: input.storage_bucket_info,
                created_at: Some("2024-01-01T00:00:00".to_string()),
                updated_at: None,
            };
            remote.teams.insert(team.name.clone(), team.clone());
            Ok(team)
        })
    }

    fn delete_team<'a>(
        &'a self,
        name: &'a str,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, GatewayResult<DeleteResult>> {
        Box::pin(async move {
            self.enter()?;
            let removed = self.remote.lock().unwrap().teams.remove(name).is_some();
            Ok(DeleteResult {
                success: removed && !self.reject_deletes,
            })
        })
    }
}
