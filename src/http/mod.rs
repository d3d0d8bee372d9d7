//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → management.rs (health reports, register, remove)
//!     → or dispatch:
//!         Connection: upgrade → websocket.rs (dial backend, relay messages)
//!         otherwise           → forward.rs (rewrite path, stream exchange)
//!     → error.rs (failure → status code + text body)
//! ```

pub mod error;
pub mod forward;
pub mod management;
pub mod request;
pub mod server;
pub mod websocket;

pub use error::ProxyError;
pub use server::{AppState, ProxyServer};
