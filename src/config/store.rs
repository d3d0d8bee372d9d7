//! Backend set persistence.
//!
//! # Responsibilities
//! - Load the initial backend set at startup
//! - Write the current backend set after each registry mutation
//!
//! # Design Decisions
//! - Writes run on a background task fed by a channel; request handling
//!   never waits on the disk
//! - Queued snapshots are coalesced, only the newest one is written
//! - Write failures are logged; in-memory state stays authoritative

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::loader::ConfigError;
use crate::routing::Backend;

/// Storage for the backend set.
pub trait BackendStore: Send + Sync + 'static {
    /// Load the persisted backend set.
    fn load(&self) -> Result<Vec<Backend>, ConfigError>;

    /// Replace the persisted backend set.
    fn save(&self, backends: &[Backend]) -> Result<(), ConfigError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct BackendsFile {
    #[serde(default)]
    servers: Vec<Backend>,
}

/// Backend set stored as a TOML file of `[[servers]]` tables.
#[derive(Debug, Clone)]
pub struct TomlBackendStore {
    path: PathBuf,
}

impl TomlBackendStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BackendStore for TomlBackendStore {
    fn load(&self) -> Result<Vec<Backend>, ConfigError> {
        if !self.path.exists() {
            tracing::warn!(path = ?self.path, "Backend file not found, starting empty");
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)?;
        let file: BackendsFile = toml::from_str(&content)?;
        check_unique(&file.servers)?;

        tracing::info!(
            path = ?self.path,
            count = file.servers.len(),
            "Loaded backends"
        );
        Ok(file.servers)
    }

    fn save(&self, backends: &[Backend]) -> Result<(), ConfigError> {
        let file = BackendsFile {
            servers: backends.to_vec(),
        };
        let content = toml::to_string_pretty(&file)?;

        // Write beside the target and rename so readers never see half a file.
        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

fn check_unique(backends: &[Backend]) -> Result<(), ConfigError> {
    let mut aliases = HashSet::new();
    let mut ports = HashSet::new();
    for backend in backends {
        if !aliases.insert(backend.alias.as_str()) {
            return Err(ConfigError::Backends(format!("duplicate alias {}", backend.alias)));
        }
        if !ports.insert(backend.port) {
            return Err(ConfigError::Backends(format!("duplicate port {}", backend.port)));
        }
    }
    Ok(())
}

/// Handle used by the registry to queue backend-set writes.
#[derive(Debug, Clone)]
pub struct Persister {
    tx: mpsc::UnboundedSender<Vec<Backend>>,
}

impl Persister {
    /// Spawn the writer task.
    ///
    /// The task exits once every `Persister` clone has been dropped and the
    /// queue is drained.
    pub fn spawn<S: BackendStore>(store: Arc<S>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(write_loop(store, rx));
        (Self { tx }, handle)
    }

    /// Queue a snapshot for writing. Never blocks.
    pub fn submit(&self, backends: Vec<Backend>) {
        if self.tx.send(backends).is_err() {
            tracing::error!("Persister stopped, backend set not saved");
        }
    }
}

async fn write_loop<S: BackendStore>(store: Arc<S>, mut rx: mpsc::UnboundedReceiver<Vec<Backend>>) {
    while let Some(mut snapshot) = rx.recv().await {
        while let Ok(newer) = rx.try_recv() {
            snapshot = newer;
        }

        let count = snapshot.len();
        let store = store.clone();
        match tokio::task::spawn_blocking(move || store.save(&snapshot)).await {
            Ok(Ok(())) => tracing::debug!(count, "Backend set saved"),
            Ok(Err(e)) => tracing::error!(error = %e, "Failed to save backend set"),
            Err(e) => tracing::error!(error = %e, "Backend set writer panicked"),
        }
    }
    tracing::debug!("Persister exiting");
}
