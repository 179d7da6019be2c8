//! Tenant-aware intercepting HTTP proxy library.

pub mod action;
pub mod admin;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod storage;
pub mod task;
pub mod transformer;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
