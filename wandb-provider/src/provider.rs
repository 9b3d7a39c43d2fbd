//! W&B Provider implementation
//!
//! Owns the remote capability and the cancellation token for the process,
//! and dispatches lifecycle calls to the controller for each resource type.

use std::sync::Arc;

use log::debug;
use tokio_util::sync::CancellationToken;
use wandb_core::diagnostic::Applied;
use wandb_core::provider::{ProviderError, ProviderResult};
use wandb_core::resource::{Resource, ResourceId, State};
use wandb_core::schema::ResourceSchema;

use crate::config::{ProviderConfig, ProviderSettings};
use crate::gateway::{Gateway, LaunchApi};
use crate::graphql::HttpTransport;
use crate::resources::{RUN_QUEUE, TEAM, resource_types};
use crate::run_queue::RunQueueController;
use crate::team::TeamController;

/// W&B Provider
pub struct WandbProvider {
    api: Arc<dyn LaunchApi>,
    cancel: CancellationToken,
}

impl WandbProvider {
    /// Create a provider over an existing API capability
    pub fn new(api: Arc<dyn LaunchApi>) -> Self {
        Self {
            api,
            cancel: CancellationToken::new(),
        }
    }

    /// Create a provider talking HTTP to the configured endpoint
    pub fn from_config(config: &ProviderConfig) -> ProviderResult<Self> {
        let transport = HttpTransport::new(config).map_err(|e| {
            ProviderError::configuration("Could not build W&B API client").with_cause(e)
        })?;
        debug!("using W&B API at {}", config.base_url);
        Ok(Self::new(Arc::new(Gateway::new(transport))))
    }

    /// Resolve settings against the environment, then connect
    pub fn from_settings(settings: ProviderSettings) -> ProviderResult<Self> {
        let config = ProviderConfig::from_env(settings).map_err(|e| {
            ProviderError::configuration("Invalid provider configuration").with_cause(e)
        })?;
        Self::from_config(&config)
    }

    /// Use a caller-owned token; cancelling it aborts in-flight API calls
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Attribute schemas of every supported resource type
    pub fn schemas(&self) -> Vec<ResourceSchema> {
        resource_types().iter().map(|t| t.schema()).collect()
    }

    fn run_queues(&self) -> RunQueueController<'_> {
        RunQueueController::new(self.api.as_ref(), &self.cancel)
    }

    fn teams(&self) -> TeamController<'_> {
        TeamController::new(self.api.as_ref(), &self.cancel)
    }

    pub async fn read_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        prior: Option<&State>,
    ) -> ProviderResult<State> {
        match id.resource_type.as_str() {
            RUN_QUEUE => self.run_queues().read(id, identifier, prior).await,
            TEAM => self.teams().read(id, identifier, prior).await,
            _ => Err(unknown_type(id)),
        }
    }

    pub async fn create_resource(&self, resource: &Resource) -> ProviderResult<Applied> {
        match resource.id.resource_type.as_str() {
            RUN_QUEUE => self.run_queues().create(resource).await,
            TEAM => self.teams().create(resource).await,
            _ => Err(unknown_type(&resource.id)),
        }
    }

    pub async fn update_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<Applied> {
        match id.resource_type.as_str() {
            RUN_QUEUE => self.run_queues().update(id, identifier, from, to).await,
            TEAM => self.teams().update(id).await,
            _ => Err(unknown_type(id)),
        }
    }

    pub async fn delete_resource(&self, id: &ResourceId, identifier: &str) -> ProviderResult<()> {
        match id.resource_type.as_str() {
            RUN_QUEUE => self.run_queues().delete(id, identifier).await,
            TEAM => self.teams().delete(id, identifier).await,
            _ => Err(unknown_type(id)),
        }
    }

    pub async fn import_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        match id.resource_type.as_str() {
            RUN_QUEUE => self.run_queues().import(id, identifier).await,
            TEAM => self.teams().import(id, identifier).await,
            _ => Err(unknown_type(id)),
        }
    }
}

fn unknown_type(id: &ResourceId) -> ProviderError {
    ProviderError::unsupported(format!("Unknown resource type: {}", id.resource_type))
        .for_resource(id.clone())
}
