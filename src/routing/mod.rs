//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (path, referer)
//!     → registry.rs (read lock over backends + table + aliases)
//!     → table.rs (longest segment-aligned prefix)
//!     → Route { port, cleaned path } or no match
//!
//! Registration / removal:
//!     registry.rs (write lock, uniqueness checks)
//!     → table.rs (insert / delete derived keys)
//!     → persister channel (outside any I/O)
//! ```
//!
//! # Design Decisions
//! - Routes are mutable at runtime; no restart needed to add a backend
//! - Each backend owns three keys: its path, its parent directory, `/alias`
//! - Unmatched requests go to the first-registered backend unless the
//!   fallback policy says otherwise

pub mod registry;
pub mod table;

pub use registry::{Backend, Registry, RegistryError, RegistrySnapshot, Route};
pub use table::RoutingTable;
