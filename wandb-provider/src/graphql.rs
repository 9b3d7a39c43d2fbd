//! GraphQL transport
//!
//! Every request is an HTTP POST of `{"query": ..., "variables": ...}`.
//! Operation documents are compile-time constants; values supplied by users
//! only ever travel in `variables`.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::ProviderConfig;
use wandb_core::provider::BoxFuture;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("graphql: {0}")]
    GraphQl(String),

    #[error("API response contained no data")]
    EmptyResponse,

    #[error("failed to decode API response: {0}")]
    Decode(String),

    #[error("failed to encode request variables: {0}")]
    Encode(String),

    #[error("request cancelled")]
    Cancelled,
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// A parameterised GraphQL operation
#[derive(Debug, Clone, PartialEq)]
pub struct GraphQlRequest {
    pub query: &'static str,
    pub variables: Map<String, Value>,
}

impl GraphQlRequest {
    pub fn new(query: &'static str) -> Self {
        Self {
            query,
            variables: Map::new(),
        }
    }

    /// Bind a named variable
    pub fn var(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.variables.insert(name.to_string(), value.into());
        self
    }

    /// Bind every field of a serialisable input struct as a variable
    pub fn vars_from(mut self, input: &impl serde::Serialize) -> GatewayResult<Self> {
        match serde_json::to_value(input).map_err(|e| GatewayError::Encode(e.to_string()))? {
            Value::Object(fields) => {
                self.variables.extend(fields);
                Ok(self)
            }
            other => Err(GatewayError::Encode(format!(
                "expected an object of variables, got {}",
                other
            ))),
        }
    }

    pub fn body(&self) -> Value {
        serde_json::json!({
            "query": self.query,
            "variables": self.variables,
        })
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlErrorMessage>,
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorMessage {
    message: String,
}

/// Execute a GraphQL operation and return the raw `data` member
pub trait GraphQlTransport: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: GraphQlRequest,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, GatewayResult<Value>>;
}

/// Decode the `data` member of a response into a typed result
pub fn decode_data<T: DeserializeOwned>(data: Value) -> GatewayResult<T> {
    serde_json::from_value(data).map_err(|e| GatewayError::Decode(e.to_string()))
}

/// Interpret a GraphQL response body
fn parse_response(body: &str) -> GatewayResult<Value> {
    let response: GraphQlResponse =
        serde_json::from_str(body).map_err(|e| GatewayError::Decode(e.to_string()))?;
    if !response.errors.is_empty() {
        let messages: Vec<String> = response.errors.into_iter().map(|e| e.message).collect();
        return Err(GatewayError::GraphQl(messages.join("; ")));
    }
    match response.data {
        Some(Value::Null) | None => Err(GatewayError::EmptyResponse),
        Some(data) => Ok(data),
    }
}

/// Value of the `Authorization` header for an API key
pub fn basic_auth(api_key: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("api:{}", api_key)))
}

/// GraphQL over HTTPS with the credential attached to every request
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(config: &ProviderConfig) -> GatewayResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&basic_auth(&config.api_key))
            .map_err(|e| GatewayError::Encode(format!("invalid API key: {}", e)))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| GatewayError::Encode(format!("invalid user agent: {}", e)))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint: config.base_url.clone(),
        })
    }

    async fn send(&self, request: GraphQlRequest) -> GatewayResult<Value> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request.body())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }
        parse_response(&body)
    }
}

impl GraphQlTransport for HttpTransport {
    fn execute<'a>(
        &'a self,
        request: GraphQlRequest,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, GatewayResult<Value>> {
        Box::pin(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(GatewayError::Cancelled),
                result = self.send(request) => result,
            }
        })
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}
