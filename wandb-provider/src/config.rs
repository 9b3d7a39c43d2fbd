//! Provider configuration
//!
//! Endpoint and credential are resolved once per process: an explicit
//! setting wins over the environment, and a value missing from both is a
//! configuration error.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Environment variable holding the API base URL
pub const BASE_URL_ENV: &str = "WANDB_BASE_URL";

/// Environment variable holding the API key
pub const API_KEY_ENV: &str = "WANDB_API_KEY";

/// Path of the GraphQL endpoint below the base URL
pub const GRAPHQL_SUFFIX: &str = "/graphql";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Missing W&B API base URL: set WANDB_BASE_URL or configure base_url")]
    MissingBaseUrl,

    #[error("Missing W&B API key: set WANDB_API_KEY or configure api_key")]
    MissingApiKey,

    #[error("Missing W&B API base URL and API key: set WANDB_BASE_URL and WANDB_API_KEY")]
    MissingBoth,
}

/// Explicitly configured provider settings, each optional
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Option<Duration>,
}

/// Fully resolved provider configuration
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// GraphQL endpoint, always ending in `/graphql`
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl ProviderConfig {
    /// Resolve settings against the process environment
    pub fn from_env(settings: ProviderSettings) -> Result<Self, ConfigError> {
        Self::resolve(settings, |key| std::env::var(key).ok())
    }

    /// Resolve settings, falling back to `env` for anything not set explicitly
    pub fn resolve(
        settings: ProviderSettings,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let pick = |explicit: Option<String>, key: &str| {
            explicit
                .filter(|v| !v.trim().is_empty())
                .or_else(|| env(key).filter(|v| !v.trim().is_empty()))
        };

        let base_url = pick(settings.base_url, BASE_URL_ENV);
        let api_key = pick(settings.api_key, API_KEY_ENV);

        match (base_url, api_key) {
            (Some(base_url), Some(api_key)) => Ok(Self {
                base_url: graphql_endpoint(&base_url),
                api_key,
                timeout: settings.timeout.unwrap_or(DEFAULT_TIMEOUT),
                user_agent: format!("wandb-provider/{}", env!("CARGO_PKG_VERSION")),
            }),
            (None, Some(_)) => Err(ConfigError::MissingBaseUrl),
            (Some(_), None) => Err(ConfigError::MissingApiKey),
            (None, None) => Err(ConfigError::MissingBoth),
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Normalize a base URL to the GraphQL endpoint
pub fn graphql_endpoint(base_url: &str) -> String {
    let trimmed = base_url.trim().trim_end_matches('/');
    if trimmed.ends_with(GRAPHQL_SUFFIX) {
        trimmed.to_string()
    } else {
        format!("{}{}", trimmed, GRAPHQL_SUFFIX)
    }
}
