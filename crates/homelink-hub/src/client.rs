//! Hub REST API client

use crate::entities::{EntityState, ServiceCall};
use homelink_core::BackendError;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum HubError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Authentication failed")]
    AuthenticationFailed,
    #[error("Hub returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("Invalid hub configuration: {0}")]
    Config(String),
}

pub type HubResult<T> = Result<T, HubError>;

impl HubError {
    /// Timeouts, connection failures and upstream 5xx may succeed on retry
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Status { status, .. } => status.is_server_error(),
            Self::AuthenticationFailed | Self::Config(_) => false,
        }
    }
}

impl From<HubError> for BackendError {
    fn from(e: HubError) -> Self {
        if e.is_transient() {
            BackendError::Transient(e.to_string())
        } else {
            BackendError::Permanent(e.to_string())
        }
    }
}

/// Authenticated client for the hub's REST API
#[derive(Debug, Clone)]
pub struct HubClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl HubClient {
    /// Create a client whose requests give up after `timeout`
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> HubResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HubError::Config(e.to_string()))?;
        Ok(Self::from_reqwest(base_url, token, http))
    }

    pub fn from_reqwest(base_url: &str, token: Option<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
            http,
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// List every entity state
    pub async fn list_states(&self) -> HubResult<Vec<EntityState>> {
        let response = self
            .authorize(self.http.get(self.api_url("states")))
            .send()
            .await?;
        let response = check_status(response).await?;
        let states: Vec<EntityState> = response.json().await?;
        debug!(count = states.len(), "Fetched hub entity states");
        Ok(states)
    }

    /// Invoke a service and return the states it changed
    pub async fn call_service(&self, call: &ServiceCall) -> HubResult<Vec<EntityState>> {
        let url = self.api_url(&format!("services/{}/{}", call.domain, call.service));
        debug!(domain = %call.domain, service = %call.service, "Calling hub service");

        let response = self
            .authorize(self.http.post(url))
            .json(&call.data)
            .send()
            .await?;
        let response = check_status(response).await?;

        // Older hubs acknowledge with an empty body
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str(&body) {
            Ok(states) => Ok(states),
            Err(e) => {
                warn!(error = %e, "Malformed service response, ignoring echo");
                Ok(Vec::new())
            }
        }
    }
}

async fn check_status(response: reqwest::Response) -> HubResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        warn!(status = %status, "Hub rejected credentials");
        return Err(HubError::AuthenticationFailed);
    }
    let body = response.text().await.unwrap_or_default();
    Err(HubError::Status { status, body })
}
