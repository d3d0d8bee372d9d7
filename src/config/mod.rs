//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! proxy config file (TOML, optional) + CLI/env overrides
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!
//! backend set file (TOML)
//!     → store.rs (load at startup)
//!     → Registry (authoritative from then on)
//!     → store.rs Persister (background writes after each mutation)
//! ```
//!
//! # Design Decisions
//! - Proxy config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - The backend set is data, not config: it changes at runtime

pub mod loader;
pub mod schema;
pub mod store;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{FallbackPolicy, LogFormat, ProxyConfig, RoutingConfig};
pub use store::{BackendStore, Persister, TomlBackendStore};
