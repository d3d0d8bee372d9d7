//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Where backends live and where their set is persisted.
    pub backends: BackendsConfig,

    /// Path resolution settings.
    pub routing: RoutingConfig,

    /// Liveness probe settings.
    pub health_check: HealthCheckConfig,

    /// Public URL settings for status output.
    pub public: PublicConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:5555").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5555".to_string(),
        }
    }
}

/// Backend location and persistence.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendsConfig {
    /// File holding the persisted backend set.
    pub file: String,

    /// Host every backend listens on.
    pub host: String,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            file: "code.toml".to_string(),
            host: "localhost".to_string(),
        }
    }
}

/// What to do with a request no routing key matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Send it to the first-registered backend.
    #[default]
    FirstRegistered,
    /// Answer 404.
    NotFound,
}

/// Path resolution settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Backend-internal path segments kept on the cleaned path.
    pub reserved_segments: Vec<String>,

    /// Behavior for unmatched paths.
    pub fallback: FallbackPolicy,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            reserved_segments: vec!["/login".to_string()],
            fallback: FallbackPolicy::FirstRegistered,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Path to probe on each backend.
    pub path: String,

    /// Probe timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            path: "/ping".to_string(),
            timeout_ms: 2000,
        }
    }
}

/// Public URL settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PublicConfig {
    /// Scheme clients use to reach the proxy (TLS ends in front of it).
    pub scheme: String,
}

impl Default for PublicConfig {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Text,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
