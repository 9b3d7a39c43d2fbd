//! Remote gateway
//!
//! Typed operations over the W&B GraphQL API. The gateway only reports
//! transport and protocol failures; whether a well-formed response means
//! success (`success`, validation errors) is for the caller to decide.

use log::debug;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use wandb_core::provider::BoxFuture;

use crate::graphql::{GatewayResult, GraphQlRequest, GraphQlTransport, decode_data};
use crate::types::{
    DeleteResult, Organization, RUN_QUEUE_PROJECT, RunQueue, Team, TeamInput,
    UpsertRunQueueInput, UpsertRunQueueResult,
};

// =============================================================================
// Operation Documents
// =============================================================================

const GET_RUN_QUEUE: &str = r#"
query GetRunQueueByName($entityName: String!, $projectName: String!, $queueName: String!) {
    project(entityName: $entityName, name: $projectName) {
        runQueue(name: $queueName) {
            id
            name
            entityName
            defaultResourceConfig {
                id
                resource
                config
                templateVariables {
                    name
                    description
                    schema
                }
            }
            prioritizationMode
            externalLinks
            createdAt
            updatedAt
        }
    }
}
"#;

const UPSERT_RUN_QUEUE: &str = r#"
mutation UpsertRunQueue(
    $entityName: String!,
    $projectName: String!,
    $queueName: String!,
    $resourceType: String!,
    $resourceConfig: JSONString!,
    $templateVariables: JSONString,
    $prioritizationMode: RunQueuePrioritizationMode,
    $externalLinks: JSONString
) {
    upsertRunQueue(input: {
        entityName: $entityName,
        projectName: $projectName,
        queueName: $queueName,
        resourceType: $resourceType,
        resourceConfig: $resourceConfig,
        templateVariables: $templateVariables,
        prioritizationMode: $prioritizationMode,
        externalLinks: $externalLinks
    }) {
        success
        configSchemaValidationErrors
    }
}
"#;

const DELETE_RUN_QUEUES: &str = r#"
mutation DeleteRunQueues($queueIDs: [ID!]!) {
    deleteRunQueues(input: {queueIDs: $queueIDs}) {
        success
    }
}
"#;

const GET_TEAM: &str = r#"
query GetTeam($name: String!) {
    entity(name: $name) {
        id
        name
        organization {
            name
        }
        storageBucketInfo {
            name
            provider
        }
        createdAt
        updatedAt
    }
}
"#;

const GET_ORGANIZATION: &str = r#"
query GetOrganization($name: String!) {
    organization(name: $name) {
        id
        available
    }
}
"#;

const CREATE_TEAM: &str = r#"
mutation CreateTeam(
    $teamName: String!,
    $organizationId: String,
    $storageBucketInfo: StorageBucketInfoInput
) {
    createTeam(input: {
        teamName: $teamName,
        organizationId: $organizationId,
        storageBucketInfo: $storageBucketInfo
    }) {
        entity {
            id
            name
            organization {
                name
            }
            storageBucketInfo {
                name
                provider
            }
            createdAt
            updatedAt
        }
    }
}
"#;

const DELETE_TEAM: &str = r#"
mutation DeleteTeam($teamName: String!) {
    deleteTeam(input: {teamName: $teamName}) {
        success
    }
}
"#;

// =============================================================================
// Response Shapes
// =============================================================================

#[derive(Deserialize)]
struct ProjectData {
    project: Option<ProjectRunQueue>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectRunQueue {
    run_queue: Option<RunQueue>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertRunQueueData {
    upsert_run_queue: UpsertRunQueueResult,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteRunQueuesData {
    delete_run_queues: DeleteResult,
}

#[derive(Deserialize)]
struct EntityData {
    entity: Option<Team>,
}

#[derive(Deserialize)]
struct OrganizationData {
    organization: Option<Organization>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTeamData {
    create_team: EntityData,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteTeamData {
    delete_team: DeleteResult,
}

// =============================================================================
// Capability
// =============================================================================

/// Remote operations the lifecycle controllers depend on
pub trait LaunchApi: Send + Sync {
    /// Look up a run queue by entity and name; `None` when it does not exist
    fn get_run_queue<'a>(
        &'a self,
        entity: &'a str,
        name: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, GatewayResult<Option<RunQueue>>>;

    /// Create or replace a run queue, keyed by entity and name
    fn upsert_run_queue<'a>(
        &'a self,
        input: UpsertRunQueueInput,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, GatewayResult<UpsertRunQueueResult>>;

    /// Delete run queues by server-internal ID
    fn delete_run_queues<'a>(
        &'a self,
        ids: Vec<String>,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, GatewayResult<DeleteResult>>;

    fn get_team<'a>(
        &'a self,
        name: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, GatewayResult<Option<Team>>>;

    /// Look up an organization by name; `None` when it does not exist
    fn resolve_org_id<'a>(
        &'a self,
        name: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, GatewayResult<Option<Organization>>>;

    fn upsert_team<'a>(
        &'a self,
        input: TeamInput,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, GatewayResult<Team>>;

    fn delete_team<'a>(
        &'a self,
        name: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, GatewayResult<DeleteResult>>;
}

/// `LaunchApi` over a GraphQL transport
pub struct Gateway<T: GraphQlTransport> {
    transport: T,
}

impl<T: GraphQlTransport> Gateway<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn run<R: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        request: GraphQlRequest,
        cancel: &CancellationToken,
    ) -> GatewayResult<R> {
        debug!("executing {}", operation);
        let data = self.transport.execute(request, cancel).await?;
        decode_data(data)
    }
}

impl<T: GraphQlTransport> LaunchApi for Gateway<T> {
    fn get_run_queue<'a>(
        &'a self,
        entity: &'a str,
        name: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, GatewayResult<Option<RunQueue>>> {
        Box::pin(async move {
            let request = GraphQlRequest::new(GET_RUN_QUEUE)
                .var("entityName", entity)
                .var("projectName", RUN_QUEUE_PROJECT)
                .var("queueName", name);
            let data: ProjectData = self.run("GetRunQueueByName", request, cancel).await?;
            Ok(data.project.and_then(|p| p.run_queue))
        })
    }

    fn upsert_run_queue<'a>(
        &'a self,
        input: UpsertRunQueueInput,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, GatewayResult<UpsertRunQueueResult>> {
        Box::pin(async move {
            let request = GraphQlRequest::new(UPSERT_RUN_QUEUE).vars_from(&input)?;
            let data: UpsertRunQueueData = self.run("UpsertRunQueue", request, cancel).await?;
            Ok(data.upsert_run_queue)
        })
    }

    fn delete_run_queues<'a>(
        &'a self,
        ids: Vec<String>,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, GatewayResult<DeleteResult>> {
        Box::pin(async move {
            let request = GraphQlRequest::new(DELETE_RUN_QUEUES).var("queueIDs", ids);
            let data: DeleteRunQueuesData = self.run("DeleteRunQueues", request, cancel).await?;
            Ok(data.delete_run_queues)
        })
    }

    fn get_team<'a>(
        &'a self,
        name: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, GatewayResult<Option<Team>>> {
        Box::pin(async move {
            let request = GraphQlRequest::new(GET_TEAM).var("name", name);
            let data: EntityData = self.run("GetTeam", request, cancel).await?;
            Ok(data.entity)
        })
    }

    fn resolve_org_id<'a>(
        &'a self,
        name: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, GatewayResult<Option<Organization>>> {
        Box::pin(async move {
            let request = GraphQlRequest::new(GET_ORGANIZATION).var("name", name);
            let data: OrganizationData = self.run("GetOrganization", request, cancel).await?;
            Ok(data.organization)
        })
    }

    fn upsert_team<'a>(
        &'a self,
        input: TeamInput,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, GatewayResult<Team>> {
        Box::pin(async move {
            let request = GraphQlRequest::new(CREATE_TEAM).vars_from(&input)?;
            let data: CreateTeamData = self.run("CreateTeam", request, cancel).await?;
            data.create_team
                .entity
                .ok_or(crate::graphql::GatewayError::EmptyResponse)
        })
    }

    fn delete_team<'a>(
        &'a self,
        name: &'a str,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, GatewayResult<DeleteResult>> {
        Box::pin(async move {
            let request = GraphQlRequest::new(DELETE_TEAM).var("teamName", name);
            let data: DeleteTeamData = self.run("DeleteTeam", request, cancel).await?;
            Ok(data.delete_team)
        })
    }
}
