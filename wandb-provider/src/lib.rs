//! W&B Provider
//!
//! Manages W&B launch run queues and teams through the W&B GraphQL API.
//!
//! ## Module Structure
//!
//! - `identifier` - Composite `entity:name` identifiers for run queues
//! - `codec` - Resource-config envelope, template variable and link transforms
//! - `types` - Wire types exchanged with the API
//! - `graphql` - GraphQL request/response handling and the HTTP transport
//! - `gateway` - Typed API operations (`LaunchApi`)
//! - `config` - Endpoint and credential resolution
//! - `resources` - Resource type definitions and schemas
//! - `run_queue` / `team` - Lifecycle controllers
//! - `provider` - WandbProvider implementation

pub mod codec;
pub mod config;
pub mod gateway;
pub mod graphql;
pub mod identifier;
pub mod provider;
pub mod resources;
pub mod run_queue;
pub mod team;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types
pub use config::{ProviderConfig, ProviderSettings};
pub use gateway::{Gateway, LaunchApi};
pub use provider::WandbProvider;

use wandb_core::diagnostic::Applied;
use wandb_core::provider::{BoxFuture, Provider, ProviderResult, ResourceType};
use wandb_core::resource::{Resource, ResourceId, State};

use resources::resource_types;

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for WandbProvider {
    fn name(&self) -> &'static str {
        "wandb"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: &str,
        prior: Option<&State>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let prior = prior.cloned();
        Box::pin(async move { self.read_resource(&id, &identifier, prior.as_ref()).await })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<Applied>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_resource(&resource).await })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<Applied>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move { self.update_resource(&id, &identifier, &from, &to).await })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.delete_resource(&id, &identifier).await })
    }

    fn import(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move { self.import_resource(&id, &identifier).await })
    }
}
