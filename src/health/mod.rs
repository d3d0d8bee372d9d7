//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! GET / | /healthcheck | /status | /status/{alias}
//!     → status.rs (snapshot backends from the registry)
//!     → checker.rs (probe each backend's ping path, concurrently)
//!     → status.rs (JSON or protobuf report with public URLs)
//! ```
//!
//! # Design Decisions
//! - Probes run on demand, per status request; no background poller
//! - A failed probe is a NOT OK state, never an error to the caller
//! - The proxy always reports itself as OK while it can answer

pub mod checker;
pub mod status;

pub use checker::{BackendState, HealthChecker, HealthError, PingResponse};
pub use status::{BackendReport, CodeServerStatus, HealthCheck, HealthcheckResponse, PublicBase};
