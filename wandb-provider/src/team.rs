//! Lifecycle controller for `wandb_team`
//!
//! Teams are addressed by name: the name is the state identifier and the
//! server-assigned ID is only reported as the computed `id` attribute.

use std::collections::HashMap;

use log::{debug, trace, warn};
use tokio_util::sync::CancellationToken;
use wandb_core::diagnostic::{Applied, Diagnostic};
use wandb_core::provider::{ProviderError, ProviderResult};
use wandb_core::resource::{Resource, ResourceId, State, Value};

use crate::gateway::LaunchApi;
use crate::resources::{team_schema, validated};
use crate::types::{StorageBucketInfo, Team, TeamInput};

/// Desired team after validation
#[derive(Debug, Clone, PartialEq, Eq)]
struct TeamPlan {
    team_name: String,
    organization_name: Option<String>,
    storage_bucket: Option<StorageBucketInfo>,
}

impl TeamPlan {
    fn from_resource(resource: &Resource) -> ProviderResult<Self> {
        let resource = validated(&team_schema(), resource)?;
        let optional = |key: &str| resource.get_string(key).map(str::to_string);

        let storage_bucket = match (
            optional("storage_bucket_name"),
            optional("storage_bucket_provider"),
        ) {
            (Some(name), Some(provider)) => Some(StorageBucketInfo { name, provider }),
            (None, None) => None,
            _ => {
                return Err(ProviderError::configuration(
                    "storage_bucket_name and storage_bucket_provider must be set together",
                )
                .for_resource(resource.id.clone()));
            }
        };

        Ok(Self {
            team_name: resource.get_string("team_name").unwrap_or_default().to_string(),
            organization_name: optional("organization_name"),
            storage_bucket,
        })
    }
}

/// Map a server team onto resource attributes.
///
/// The server does not always report the organization; the configured name
/// is kept in that case.
fn team_attributes(team: &Team, organization_name: Option<&str>) -> HashMap<String, Value> {
    let mut attributes = HashMap::new();
    attributes.insert("id".to_string(), Value::String(team.id.clone()));
    attributes.insert("team_name".to_string(), Value::String(team.name.clone()));

    let organization = team
        .organization
        .as_ref()
        .map(|org| org.name.as_str())
        .or(organization_name);
    if let Some(organization) = organization {
        attributes.insert(
            "organization_name".to_string(),
            Value::String(organization.to_string()),
        );
    }
    if let Some(bucket) = &team.storage_bucket_info {
        attributes.insert(
            "storage_bucket_name".to_string(),
            Value::String(bucket.name.clone()),
        );
        attributes.insert(
            "storage_bucket_provider".to_string(),
            Value::String(bucket.provider.clone()),
        );
    }
    for (key, value) in [("created_at", &team.created_at), ("updated_at", &team.updated_at)] {
        if let Some(value) = value {
            attributes.insert(key.to_string(), Value::String(value.clone()));
        }
    }
    attributes
}

/// Team lifecycle over a `LaunchApi`
pub struct TeamController<'a> {
    api: &'a dyn LaunchApi,
    cancel: &'a CancellationToken,
}

impl<'a> TeamController<'a> {
    pub fn new(api: &'a dyn LaunchApi, cancel: &'a CancellationToken) -> Self {
        Self { api, cancel }
    }

    /// Resolve the organization, then create the team. The two calls are not
    /// transactional; a duplicate team name is rejected by the server.
    pub async fn create(&self, resource: &Resource) -> ProviderResult<Applied> {
        let id = &resource.id;
        let plan = TeamPlan::from_resource(resource)?;
        let mut warnings = Vec::new();

        let organization_id = match &plan.organization_name {
            Some(name) => {
                debug!("{}: resolving organization {}", id, name);
                let organization = self
                    .api
                    .resolve_org_id(name, self.cancel)
                    .await
                    .map_err(|e| {
                        ProviderError::remote("Could not resolve organization")
                            .for_resource(id.clone())
                            .with_cause(e)
                    })?
                    .ok_or_else(|| {
                        ProviderError::configuration(format!("Organization '{}' not found", name))
                            .for_resource(id.clone())
                    })?;
                if !organization.available {
                    warn!("{}: organization {} has no team seats left", id, name);
                    warnings.push(Diagnostic::warning(
                        "Organization has no available team seats",
                        format!("organization '{}' may reject new teams", name),
                    ));
                }
                Some(organization.id)
            }
            None => None,
        };

        let input = TeamInput {
            team_name: plan.team_name.clone(),
            organization_id,
            storage_bucket_info: plan.storage_bucket.clone(),
        };
        debug!("{}: creating team {}", id, plan.team_name);
        let team = self
            .api
            .upsert_team(input, self.cancel)
            .await
            .map_err(|e| {
                ProviderError::remote("Could not create team")
                    .for_resource(id.clone())
                    .with_cause(e)
            })?;

        let attributes = team_attributes(&team, plan.organization_name.as_deref());
        let state = State::existing(id.clone(), attributes).with_identifier(team.name.clone());
        trace!("{}: created team {} ({})", id, team.name, team.id);

        let mut applied = Applied::new(state);
        applied.warnings = warnings;
        Ok(applied)
    }

    /// Refresh state; `State::not_found` when the team was deleted remotely
    pub async fn read(
        &self,
        id: &ResourceId,
        team_name: &str,
        prior: Option<&State>,
    ) -> ProviderResult<State> {
        if team_name.is_empty() {
            return Err(ProviderError::configuration("Team name must not be empty")
                .for_resource(id.clone()));
        }

        let team = self
            .api
            .get_team(team_name, self.cancel)
            .await
            .map_err(|e| {
                ProviderError::remote("Could not read team")
                    .for_resource(id.clone())
                    .with_cause(e)
            })?;

        let Some(team) = team else {
            debug!("{}: team {} no longer exists", id, team_name);
            return Ok(State::not_found(id.clone()));
        };

        let organization = prior.and_then(|state| state.get_string("organization_name"));
        let attributes = team_attributes(&team, organization);
        trace!("{}: read team {}", id, team.name);
        Ok(State::existing(id.clone(), attributes).with_identifier(team.name))
    }

    pub async fn update(&self, id: &ResourceId) -> ProviderResult<Applied> {
        Err(ProviderError::unsupported(
            "Updating a team is not supported; recreate it to change its settings",
        )
        .for_resource(id.clone()))
    }

    pub async fn delete(&self, id: &ResourceId, team_name: &str) -> ProviderResult<()> {
        debug!("{}: deleting team {}", id, team_name);
        let result = self
            .api
            .delete_team(team_name, self.cancel)
            .await
            .map_err(|e| {
                ProviderError::remote("Could not delete team")
                    .for_resource(id.clone())
                    .with_cause(e)
            })?;

        if !result.success {
            return Err(ProviderError::business_failure(
                "Failed to delete team: the API did not confirm the deletion of the team",
            )
            .for_resource(id.clone()));
        }

        trace!("{}: deleted team {}", id, team_name);
        Ok(())
    }

    /// Adopt an existing team; the imported identifier is the team name
    pub async fn import(&self, id: &ResourceId, team_name: &str) -> ProviderResult<State> {
        let state = self.read(id, team_name, None).await?;
        if !state.exists {
            return Err(ProviderError::not_found(format!(
                "Cannot import team '{}': it does not exist",
                team_name
            ))
            .for_resource(id.clone()));
        }
        Ok(state)
    }
}
