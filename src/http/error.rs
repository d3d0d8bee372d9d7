//! HTTP-facing error taxonomy.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::routing::RegistryError;

/// Every failure a proxied or management request can end in.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Alias or port already registered.
    #[error("{0}")]
    Conflict(String),

    /// Unknown alias.
    #[error("{0}")]
    NotFound(String),

    /// Malformed registration input.
    #[error("{0}")]
    Decode(String),

    /// No routing key matched and the fallback policy refuses a default.
    #[error("No project matches {0}")]
    NoRoute(String),

    /// Nothing is registered, so there is no default backend either.
    #[error("No backends registered")]
    NoBackends,

    /// The backend websocket could not be reached.
    #[error("Failed to connect to backend websocket: {0}")]
    UpstreamDial(String),

    /// The client-facing websocket handshake could not be completed.
    #[error("Websocket upgrade failed: {0}")]
    Upgrade(String),

    /// A plain HTTP forward failed.
    #[error("Upstream request failed: {0}")]
    Transport(String),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::Conflict(_) | ProxyError::NotFound(_) | ProxyError::Decode(_) => {
                StatusCode::BAD_REQUEST
            }
            ProxyError::NoRoute(_) => StatusCode::NOT_FOUND,
            ProxyError::NoBackends | ProxyError::UpstreamDial(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Upgrade(_) | ProxyError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RegistryError> for ProxyError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::AliasInUse(_) | RegistryError::PortInUse { .. } => {
                ProxyError::Conflict(err.to_string())
            }
            RegistryError::NotFound(_) => ProxyError::NotFound(err.to_string()),
            RegistryError::Empty => ProxyError::NoBackends,
            RegistryError::Unmatched(path) => ProxyError::NoRoute(path),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %self, "Request rejected");
        }
        (status, self.to_string()).into_response()
    }
}
