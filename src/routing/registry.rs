//! Backend registry.
//!
//! # Responsibilities
//! - Own the backend list, routing table and alias index as one unit
//! - Enforce alias and port uniqueness
//! - Derive routing entries from registered backends
//! - Resolve request paths to ports and rewrite them for the backend
//!
//! # Design Decisions
//! - One `RwLock` guards the (backends, table, aliases) triple, so a
//!   mutation is observed fully or not at all
//! - Persistence is handed to a background task; only a channel send happens
//!   under the lock

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::schema::{FallbackPolicy, RoutingConfig};
use crate::config::store::Persister;
use crate::routing::table::RoutingTable;

/// A project-serving backend process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backend {
    /// Absolute project path; the primary routing key.
    pub path: String,
    /// Short name, routable as `/{alias}`.
    pub alias: String,
    /// Port of the backend on the backend host.
    pub port: u16,
}

impl Backend {
    pub fn new(path: impl Into<String>, alias: impl Into<String>, port: u16) -> Self {
        Self {
            path: normalize_path(&path.into()),
            alias: alias.into(),
            port,
        }
    }

    /// Routing keys owned by this backend: its path, the parent directory of
    /// its path, and `/{alias}`.
    pub fn route_keys(&self) -> [String; 3] {
        [
            self.path.clone(),
            parent_dir(&self.path).to_string(),
            format!("/{}", self.alias),
        ]
    }
}

/// Errors from registry mutations and lookups.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Name {0} is in use")]
    AliasInUse(String),

    #[error("Port {port} is in use by {alias}")]
    PortInUse { port: u16, alias: String },

    #[error("Code-server {0} doesn't exist")]
    NotFound(String),

    #[error("No backends registered")]
    Empty,

    #[error("No backend matches {0}")]
    Unmatched(String),
}

/// A resolved request: the backend port and the path to send it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub port: u16,
    pub path: String,
}

/// Point-in-time copy of the registry state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub backends: Vec<Backend>,
    pub table: RoutingTable,
    pub aliases: HashMap<String, String>,
}

#[derive(Debug, Default)]
struct RegistryState {
    backends: Vec<Backend>,
    table: RoutingTable,
    aliases: HashMap<String, String>,
}

impl RegistryState {
    fn conflict(&self, alias: &str, port: u16) -> Option<RegistryError> {
        for existing in &self.backends {
            if existing.alias == alias {
                return Some(RegistryError::AliasInUse(alias.to_string()));
            }
            if existing.port == port {
                return Some(RegistryError::PortInUse {
                    port,
                    alias: existing.alias.clone(),
                });
            }
        }
        None
    }

    fn insert(&mut self, backend: Backend) {
        for key in backend.route_keys() {
            self.table.insert(key, backend.port);
        }
        self.aliases.insert(backend.alias.clone(), backend.path.clone());
        self.backends.push(backend);
    }
}

/// Authoritative in-memory store of backends and derived routing state.
pub struct Registry {
    state: RwLock<RegistryState>,
    fallback: FallbackPolicy,
    reserved_segments: Vec<String>,
    persister: Option<Persister>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new(routing: &RoutingConfig, persister: Option<Persister>) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            fallback: routing.fallback,
            reserved_segments: routing.reserved_segments.clone(),
            persister,
        }
    }

    /// Create a registry seeded with an initial backend set.
    ///
    /// The seed is not written back to the store.
    pub fn with_backends(
        backends: Vec<Backend>,
        routing: &RoutingConfig,
        persister: Option<Persister>,
    ) -> Result<Self, RegistryError> {
        let registry = Self::new(routing, persister);
        {
            let mut state = registry.state.write();
            for backend in backends {
                if let Some(err) = state.conflict(&backend.alias, backend.port) {
                    return Err(err);
                }
                state.insert(backend);
            }
        }
        Ok(registry)
    }

    /// Register a backend.
    pub fn register(
        &self,
        path: impl Into<String>,
        alias: impl Into<String>,
        port: u16,
    ) -> Result<Backend, RegistryError> {
        let backend = Backend::new(path, alias, port);

        let mut state = self.state.write();
        if let Some(err) = state.conflict(&backend.alias, backend.port) {
            return Err(err);
        }
        state.insert(backend.clone());
        // Channel send only; the file write happens on the persister task.
        self.persist(&state.backends);
        drop(state);

        tracing::info!(
            alias = %backend.alias,
            path = %backend.path,
            port = backend.port,
            "Backend registered"
        );
        Ok(backend)
    }

    /// Remove the backend registered under `alias`.
    ///
    /// All routing keys owned by the backend are dropped; keys it shared
    /// with a remaining backend are re-derived from that backend.
    pub fn remove(&self, alias: &str) -> Result<Backend, RegistryError> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let index = state
            .backends
            .iter()
            .position(|b| b.alias == alias)
            .ok_or_else(|| RegistryError::NotFound(alias.to_string()))?;
        let removed = state.backends.remove(index);

        let keys = removed.route_keys();
        for key in &keys {
            state.table.remove(key);
        }
        state.aliases.remove(alias);

        for backend in &state.backends {
            for key in backend.route_keys() {
                if keys.contains(&key) {
                    state.table.insert(key, backend.port);
                }
            }
        }

        self.persist(&state.backends);
        drop(guard);

        tracing::info!(
            alias = %removed.alias,
            path = %removed.path,
            port = removed.port,
            "Backend removed"
        );
        Ok(removed)
    }

    /// Resolve the backend port for a request.
    ///
    /// When a referer path is given it is matched instead of the request
    /// path, so sub-resources follow the page that loaded them.
    pub fn resolve(
        &self,
        request_path: &str,
        referer_path: Option<&str>,
    ) -> Result<u16, RegistryError> {
        let state = self.state.read();
        self.resolve_locked(&state, request_path, referer_path)
    }

    /// Strip the longest routing prefix from `request_path`.
    pub fn clean_path(&self, request_path: &str) -> String {
        let state = self.state.read();
        self.clean_locked(&state, request_path)
    }

    /// Resolve the port and rewrite the path under one read lock.
    pub fn route(
        &self,
        request_path: &str,
        referer_path: Option<&str>,
    ) -> Result<Route, RegistryError> {
        let state = self.state.read();
        let port = self.resolve_locked(&state, request_path, referer_path)?;
        Ok(Route {
            port,
            path: self.clean_locked(&state, request_path),
        })
    }

    /// Look up a backend by alias.
    pub fn get(&self, alias: &str) -> Option<Backend> {
        let state = self.state.read();
        let path = state.aliases.get(alias)?;
        state
            .backends
            .iter()
            .find(|b| b.alias == alias && &b.path == path)
            .cloned()
    }

    /// All backends in registration order.
    pub fn backends(&self) -> Vec<Backend> {
        self.state.read().backends.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().backends.is_empty()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let state = self.state.read();
        RegistrySnapshot {
            backends: state.backends.clone(),
            table: state.table.clone(),
            aliases: state.aliases.clone(),
        }
    }

    fn resolve_locked(
        &self,
        state: &RegistryState,
        request_path: &str,
        referer_path: Option<&str>,
    ) -> Result<u16, RegistryError> {
        let path = match referer_path {
            Some(referer) if !referer.is_empty() => referer,
            _ => request_path,
        };

        if let Some((_, port)) = state.table.longest_prefix(path) {
            return Ok(port);
        }

        match self.fallback {
            FallbackPolicy::FirstRegistered => state
                .backends
                .first()
                .map(|b| b.port)
                .ok_or(RegistryError::Empty),
            FallbackPolicy::NotFound => Err(RegistryError::Unmatched(path.to_string())),
        }
    }

    fn clean_locked(&self, state: &RegistryState, request_path: &str) -> String {
        let residual = match state.table.longest_prefix(request_path) {
            Some((prefix, _)) => &request_path[prefix.len()..],
            None => request_path,
        };

        let mut cleaned = if residual.starts_with('/') {
            residual.to_string()
        } else {
            format!("/{}", residual)
        };

        // Backend-internal redirects land under the reserved segment again.
        if let Some(segment) = self
            .reserved_segments
            .iter()
            .find(|s| cleaned.starts_with(s.as_str()))
        {
            cleaned = format!("{}{}", segment, cleaned);
        }
        cleaned
    }

    fn persist(&self, backends: &[Backend]) {
        if let Some(persister) = &self.persister {
            persister.submit(backends.to_vec());
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("backends", &self.len())
            .field("fallback", &self.fallback)
            .finish()
    }
}

/// Lexical parent directory of a slash-separated path.
pub fn parent_dir(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/",
        Some(idx) => &trimmed[..idx],
        None if path.starts_with('/') => "/",
        None => ".",
    }
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() && path.starts_with('/') {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}
