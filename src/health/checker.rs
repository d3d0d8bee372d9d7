//! Backend liveness probe.
//!
//! # Responsibilities
//! - Issue one GET to a backend's ping path with a short timeout
//! - Interpret the answer as OK / NOT OK
//!
//! # Design Decisions
//! - Never fails the caller: every failure becomes NOT OK and a log line
//! - OK requires a 2xx answer whose JSON carries a non-empty `hostname`

use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time;

use crate::config::schema::HealthCheckConfig;

/// Largest ping body we are willing to read.
const MAX_PING_BODY: usize = 64 * 1024;

/// Probe outcome as reported to status endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendState {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "NOT OK")]
    NotOk,
}

impl BackendState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendState::Ok => "OK",
            BackendState::NotOk => "NOT OK",
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, BackendState::Ok)
    }
}

impl std::fmt::Display for BackendState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a backend ping answer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PingResponse {
    #[serde(default)]
    pub hostname: String,
}

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to build probe request: {0}")]
    Request(String),

    #[error("probe failed: {0}")]
    Transport(String),

    #[error("probe answered {0}")]
    Status(u16),

    #[error("failed to read probe body: {0}")]
    Body(String),

    #[error("malformed probe body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Liveness prober for backends on one host.
#[derive(Clone)]
pub struct HealthChecker {
    client: Client<HttpConnector, Body>,
    host: String,
    path: String,
    timeout: Duration,
}

impl HealthChecker {
    pub fn new(host: impl Into<String>, config: &HealthCheckConfig) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Self {
            client,
            host: host.into(),
            path: config.path.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    /// Probe the backend on `port` and return its decoded ping answer.
    pub async fn probe(&self, port: u16) -> Result<PingResponse, HealthError> {
        let uri = format!("http://{}:{}{}", self.host, port, self.path);
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .header("user-agent", "code-server-proxy-health-check")
            .body(Body::empty())
            .map_err(|e| HealthError::Request(e.to_string()))?;

        let exchange = async {
            let response = self
                .client
                .request(request)
                .await
                .map_err(|e| HealthError::Transport(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(HealthError::Status(status.as_u16()));
            }

            let body = axum::body::to_bytes(Body::new(response.into_body()), MAX_PING_BODY)
                .await
                .map_err(|e| HealthError::Body(e.to_string()))?;
            Ok(serde_json::from_slice::<PingResponse>(&body)?)
        };

        time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| HealthError::Timeout(self.timeout))?
    }

    /// Probe the backend on `port` and reduce the result to a state.
    pub async fn check(&self, port: u16) -> BackendState {
        match self.probe(port).await {
            Ok(ping) if !ping.hostname.is_empty() => BackendState::Ok,
            Ok(_) => {
                tracing::warn!(port, "Health check failed: empty hostname");
                BackendState::NotOk
            }
            Err(e) => {
                tracing::warn!(port, error = %e, "Health check failed");
                BackendState::NotOk
            }
        }
    }
}

impl std::fmt::Debug for HealthChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthChecker")
            .field("host", &self.host)
            .field("path", &self.path)
            .field("timeout", &self.timeout)
            .finish()
    }
}
