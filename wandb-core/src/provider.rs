//! Provider - Trait abstracting resource lifecycle operations
//!
//! A Provider translates lifecycle requests for its resource types into calls
//! against a remote platform and maps the results back into `State`.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::diagnostic::{Applied, Diagnostic};
use crate::resource::{Resource, ResourceId, State};
use crate::schema::ResourceSchema;

/// Classification of a lifecycle failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input: bad JSON, bad identifier, missing or invalid attributes
    Configuration,
    /// The remote object does not exist
    NotFound,
    /// The request failed in transport or was rejected at the protocol level
    Remote,
    /// The request arrived but the platform reported `success = false`
    BusinessFailure,
    /// The operation is not supported for this resource type
    Unsupported,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Configuration => "configuration error",
            ErrorKind::NotFound => "not found",
            ErrorKind::Remote => "remote error",
            ErrorKind::BusinessFailure => "rejected by API",
            ErrorKind::Unsupported => "unsupported",
        };
        f.write_str(s)
    }
}

/// Error type for Provider operations
#[derive(Debug)]
pub struct ProviderError {
    pub kind: ErrorKind,
    pub message: String,
    pub resource_id: Option<ResourceId>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref id) = self.resource_id {
            write!(f, "[{}] {}", id, self.message)?;
        } else {
            write!(f, "{}", self.message)?;
        }
        if let Some(ref cause) = self.cause {
            write!(f, ": {}", cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            resource_id: None,
            cause: None,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Remote, message)
    }

    pub fn business_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BusinessFailure, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unsupported, message)
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Render this error as an error-severity diagnostic
    pub fn to_diagnostic(&self) -> Diagnostic {
        let detail = match (&self.resource_id, &self.cause) {
            (Some(id), Some(cause)) => format!("{}: {}", id, cause),
            (Some(id), None) => id.to_string(),
            (None, Some(cause)) => cause.to_string(),
            (None, None) => String::new(),
        };
        Diagnostic::error(format!("{} ({})", self.message, self.kind), detail)
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Definition of resource types that a Provider can handle
pub trait ResourceType: Send + Sync {
    /// Resource type name (e.g., "wandb_run_queue")
    fn name(&self) -> &'static str;

    /// Attribute schema for this resource type
    fn schema(&self) -> ResourceSchema;
}

/// Main Provider trait
///
/// Each remote platform implements this trait. All operations are async and
/// involve side effects. Each call is independent: a provider keeps no state
/// between calls beyond its immutable client handle.
pub trait Provider: Send + Sync {
    /// Name of this Provider (e.g., "wandb")
    fn name(&self) -> &'static str;

    /// List of resource types this Provider can handle
    fn resource_types(&self) -> Vec<Box<dyn ResourceType>>;

    /// Get the current state of a resource
    ///
    /// `prior` is the last persisted state, when there is one. Returns
    /// `State::not_found()` if the resource was removed out of band.
    fn read(
        &self,
        id: &ResourceId,
        identifier: &str,
        prior: Option<&State>,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    /// Create a resource
    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<Applied>>;

    /// Update a resource in place
    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<Applied>>;

    /// Delete a resource
    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>>;

    /// Adopt an existing remote object under the given external identifier
    fn import(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>>;
}

/// Provider implementation for Box<dyn Provider>
/// This enables dynamic dispatch for Providers
impl Provider for Box<dyn Provider> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        (**self).resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: &str,
        prior: Option<&State>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).read(id, identifier, prior)
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<Applied>> {
        (**self).create(resource)
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<Applied>> {
        (**self).update(id, identifier, from, to)
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        (**self).delete(id, identifier)
    }

    fn import(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).import(id, identifier)
    }
}
