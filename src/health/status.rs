//! Health aggregation and status encodings.
//!
//! # Responsibilities
//! - Probe every registered backend (concurrently)
//! - Build the JSON report for humans and the protobuf report for tools
//! - Compute public URLs for each backend

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::health::checker::{BackendState, HealthChecker};
use crate::observability::metrics;
use crate::routing::Backend;

/// State reported for the proxy itself.
pub const PROXY_OK: &str = "OK";

/// One backend with its probed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendReport {
    pub backend: Backend,
    pub state: BackendState,
}

/// Probe all `backends` concurrently, preserving order.
pub async fn collect(checker: &HealthChecker, backends: Vec<Backend>) -> Vec<BackendReport> {
    let probes = backends.into_iter().map(|backend| async move {
        let state = checker.check(backend.port).await;
        metrics::record_backend_health(&backend.alias, state.is_ok());
        BackendReport { backend, state }
    });
    join_all(probes).await
}

/// Public base used to build per-backend URLs.
#[derive(Debug, Clone)]
pub struct PublicBase {
    scheme: String,
    host: String,
}

impl PublicBase {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
        }
    }

    /// Absolute public URL for `path`.
    pub fn url(&self, path: &str) -> String {
        let base = format!("{}://{}/", self.scheme, self.host);
        match Url::parse(&base) {
            Ok(mut url) => {
                url.set_path(path);
                url.to_string()
            }
            Err(_) => {
                let path = path.trim_start_matches('/');
                format!("{}{}", base, path)
            }
        }
    }
}

/// Human-readable health report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthcheckResponse {
    #[serde(rename = "CodeServerProxy")]
    pub code_server_proxy: String,
    #[serde(rename = "CodeServers")]
    pub code_servers: Vec<CodeServerHealth>,
}

/// One backend in the human-readable report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeServerHealth {
    #[serde(rename = "Port")]
    pub port: u16,
    #[serde(rename = "State")]
    pub state: BackendState,
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "Alias")]
    pub alias: String,
    #[serde(rename = "AliasURL")]
    pub alias_url: String,
}

impl HealthcheckResponse {
    pub fn from_reports(reports: &[BackendReport], base: &PublicBase) -> Self {
        Self {
            code_server_proxy: PROXY_OK.to_string(),
            code_servers: reports
                .iter()
                .map(|r| CodeServerHealth {
                    port: r.backend.port,
                    state: r.state,
                    url: base.url(&r.backend.path),
                    alias: r.backend.alias.clone(),
                    alias_url: base.url(&format!("/{}", r.backend.alias)),
                })
                .collect(),
        }
    }
}

/// Machine-readable health report.
#[derive(Clone, PartialEq, prost::Message)]
pub struct HealthCheck {
    #[prost(string, tag = "1")]
    pub code_server_proxy: String,
    #[prost(message, repeated, tag = "2")]
    pub code_servers: Vec<CodeServerStatus>,
}

/// One backend in the machine-readable report.
#[derive(Clone, PartialEq, prost::Message)]
pub struct CodeServerStatus {
    #[prost(int64, tag = "1")]
    pub port: i64,
    #[prost(string, tag = "2")]
    pub state: String,
    #[prost(string, tag = "3")]
    pub url: String,
    #[prost(string, tag = "4")]
    pub alias: String,
    #[prost(string, tag = "5")]
    pub alias_url: String,
}

impl CodeServerStatus {
    pub fn from_report(report: &BackendReport, base: &PublicBase) -> Self {
        Self {
            port: i64::from(report.backend.port),
            state: report.state.as_str().to_string(),
            url: base.url(&report.backend.path),
            alias: report.backend.alias.clone(),
            alias_url: base.url(&format!("/{}", report.backend.alias)),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.state == BackendState::Ok.as_str()
    }
}

impl HealthCheck {
    pub fn from_reports(reports: &[BackendReport], base: &PublicBase) -> Self {
        Self {
            code_server_proxy: PROXY_OK.to_string(),
            code_servers: reports
                .iter()
                .map(|r| CodeServerStatus::from_report(r, base))
                .collect(),
        }
    }
}
