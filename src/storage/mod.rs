//! Tenant and route directory.
//!
//! # Data Flow
//! ```text
//! Inbound request (tenant key, direction, method, path)
//!     → RouteDirectory::find_vault   (Ok(None) = unknown tenant)
//!     → RouteDirectory::find_route   (Ok(None) = pass-through)
//!     → Err(StorageError)            (directory fault, never pass-through)
//! ```
//!
//! # Design Decisions
//! - "Not found" is `Ok(None)`, faults are `Err`, so the dispatcher can never
//!   confuse an unreachable store with a missing route
//! - Matching is exact on (vault, direction, method, path)
//! - Stores are constructed explicitly and handed to the server; there is no
//!   process-wide registry

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::action::{ActionConfig, FieldList};

pub use memory::MemoryStorage;

/// A tenant: the routing key and its default backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    /// Unique ID, also the leading host label clients address.
    pub id: String,

    /// Default backend base URL (e.g. `http://127.0.0.1:3000`).
    pub upstream: String,
}

/// Which leg of tenant traffic a route applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Client → tenant backend.
    Inbound,
    /// Tenant backend → external service.
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transformation rule for one vault.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Assigned on creation when empty.
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub vault_id: String,

    pub direction: Direction,

    /// HTTP method, stored upper-case.
    pub method: String,

    /// Exact request path.
    pub path: String,

    /// Backend override; the vault default (or the egress target) is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<String>,

    /// Ordered list of body fields to rewrite.
    pub fields: FieldList,

    /// Action applied to every configured field.
    pub action: ActionConfig,
}

impl Route {
    /// Whether this route answers the given lookup key.
    pub fn matches(&self, direction: Direction, method: &str, path: &str) -> bool {
        self.direction == direction && self.method.eq_ignore_ascii_case(method) && self.path == path
    }
}

/// Errors raised by directory backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend unreachable or faulted.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A write referenced a vault that does not exist.
    #[error("vault {0} does not exist")]
    VaultMissing(String),

    /// A write collided with an existing entry.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A write or delete targeted an entity that does not exist.
    #[error("{0} not found")]
    NotFound(String),
}

/// Read interface consumed by the dispatcher.
#[async_trait]
pub trait RouteDirectory: Send + Sync {
    /// Look up a vault by its routing key.
    async fn find_vault(&self, key: &str) -> Result<Option<Vault>, StorageError>;

    /// Look up the route for an exact (vault, direction, method, path) key.
    async fn find_route(
        &self,
        vault_id: &str,
        direction: Direction,
        method: &str,
        path: &str,
    ) -> Result<Option<Route>, StorageError>;
}

/// Administrative CRUD on top of the read interface.
#[async_trait]
pub trait RouteStore: RouteDirectory {
    async fn create_vault(&self, vault: Vault) -> Result<Vault, StorageError>;

    /// Delete a vault together with all of its routes.
    async fn delete_vault(&self, vault_id: &str) -> Result<(), StorageError>;

    async fn list_vaults(&self) -> Result<Vec<Vault>, StorageError>;

    /// Persist a route, assigning an ID when the given one is empty.
    async fn create_route(&self, route: Route) -> Result<Route, StorageError>;

    async fn find_route_by_id(
        &self,
        vault_id: &str,
        route_id: &str,
    ) -> Result<Option<Route>, StorageError>;

    async fn list_routes(&self, vault_id: &str) -> Result<Vec<Route>, StorageError>;

    async fn delete_route(&self, vault_id: &str, route_id: &str) -> Result<(), StorageError>;

    /// Delete every route of a vault.
    async fn delete_routes(&self, vault_id: &str) -> Result<(), StorageError>;
}
