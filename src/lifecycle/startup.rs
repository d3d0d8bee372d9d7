//! Startup orchestration.
//!
//! # Responsibilities
//! - Load the persisted backend set
//! - Start the background persister
//! - Build the registry and the server around it
//!
//! # Design Decisions
//! - Fail fast: an unreadable or inconsistent backend file is fatal
//! - The listener is bound by the caller, so tests can use port 0

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::{BackendStore, ConfigError, Persister, ProxyConfig, TomlBackendStore};
use crate::http::ProxyServer;
use crate::observability::metrics;
use crate::routing::{Registry, RegistryError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("backend set is inconsistent: {0}")]
    Registry(#[from] RegistryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything a running proxy is made of, before it starts serving.
pub struct Bootstrap {
    pub registry: Arc<Registry>,
    pub server: ProxyServer,
    /// Finishes once every handle to the registry is gone and the last
    /// snapshot is written.
    pub persister: JoinHandle<()>,
}

/// Assemble the proxy with the TOML backend file named in `config`.
pub fn prepare(config: &ProxyConfig) -> Result<Bootstrap, StartupError> {
    let store = Arc::new(TomlBackendStore::new(&config.backends.file));
    prepare_with_store(config, store)
}

/// Assemble the proxy around any backend store.
pub fn prepare_with_store<S: BackendStore>(
    config: &ProxyConfig,
    store: Arc<S>,
) -> Result<Bootstrap, StartupError> {
    let backends = store.load()?;
    tracing::info!(count = backends.len(), "Loaded backend set");

    let (persister, task) = Persister::spawn(store);
    let registry = match Registry::with_backends(backends, &config.routing, Some(persister)) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            task.abort();
            return Err(e.into());
        }
    };
    metrics::record_backends(registry.len());

    let server = ProxyServer::new(config, registry.clone());
    Ok(Bootstrap {
        registry,
        server,
        persister: task,
    })
}
