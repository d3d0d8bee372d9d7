//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid bind address {0:?}")]
    BindAddress(String),

    #[error("invalid metrics address {0:?}")]
    MetricsAddress(String),

    #[error("health check timeout must be greater than zero")]
    ZeroProbeTimeout,

    #[error("health check path {0:?} must start with '/'")]
    ProbePath(String),

    #[error("reserved segment {0:?} must start with '/'")]
    ReservedSegment(String),

    #[error("backend host must not be empty")]
    EmptyBackendHost,
}

pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }
    if config.health_check.timeout_ms == 0 {
        errors.push(ValidationError::ZeroProbeTimeout);
    }
    if !config.health_check.path.starts_with('/') {
        errors.push(ValidationError::ProbePath(config.health_check.path.clone()));
    }
    for segment in &config.routing.reserved_segments {
        if !segment.starts_with('/') {
            errors.push(ValidationError::ReservedSegment(segment.clone()));
        }
    }
    if config.backends.host.is_empty() {
        errors.push(ValidationError::EmptyBackendHost);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
