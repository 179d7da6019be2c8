//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, deadline, tracing)
//!     → dispatcher.rs (tenant, route, transform, forward)
//!     → request.rs (direction, tenant key, upstream URI, header hygiene)
//!     → backend via pooled hyper client
//!     → Send to client
//! ```

pub mod dispatcher;
pub mod request;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{AppState, AuditSink, HttpServer};
