//! In-memory directory backend.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::ProxyConfig;
use crate::storage::{Direction, Route, RouteDirectory, RouteStore, StorageError, Vault};

/// Thread-safe vault/route store.
///
/// Cheap to clone; clones share the same maps. Routes are grouped per vault
/// so a lookup only scans the routes of the addressed tenant.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    vaults: Arc<DashMap<String, Vault>>,
    routes: Arc<DashMap<String, Vec<Route>>>,
}

impl MemoryStorage {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store seeded with the vaults and routes of a config.
    pub fn from_config(config: &ProxyConfig) -> Self {
        let storage = Self::new();
        storage.replace_all(config.vaults.clone(), config.routes.clone());
        storage
    }

    /// Replace the whole directory content.
    ///
    /// New entries are written before stale ones are removed so concurrent
    /// lookups never observe an empty directory during a reload.
    pub fn replace_all(&self, vaults: Vec<Vault>, routes: Vec<Route>) {
        let vault_ids: HashSet<String> = vaults.iter().map(|v| v.id.clone()).collect();

        let mut grouped: HashMap<String, Vec<Route>> = HashMap::new();
        for route in routes {
            let route = normalize(route);
            grouped.entry(route.vault_id.clone()).or_default().push(route);
        }

        for vault in vaults {
            self.vaults.insert(vault.id.clone(), vault);
        }
        self.vaults.retain(|id, _| vault_ids.contains(id));

        let route_owners: HashSet<String> = grouped.keys().cloned().collect();
        for (vault_id, routes) in grouped {
            self.routes.insert(vault_id, routes);
        }
        self.routes.retain(|id, _| route_owners.contains(id));

        tracing::info!(
            vaults = self.vaults.len(),
            routes = self.route_count(),
            "Directory loaded"
        );
    }

    /// Total number of routes across all vaults.
    pub fn route_count(&self) -> usize {
        self.routes.iter().map(|r| r.value().len()).sum()
    }
}

fn normalize(mut route: Route) -> Route {
    if route.id.is_empty() {
        route.id = format!("rt_{}", Uuid::new_v4().simple());
    }
    route.method = route.method.to_ascii_uppercase();
    route
}

#[async_trait]
impl RouteDirectory for MemoryStorage {
    async fn find_vault(&self, key: &str) -> Result<Option<Vault>, StorageError> {
        Ok(self.vaults.get(key).map(|v| v.value().clone()))
    }

    async fn find_route(
        &self,
        vault_id: &str,
        direction: Direction,
        method: &str,
        path: &str,
    ) -> Result<Option<Route>, StorageError> {
        Ok(self.routes.get(vault_id).and_then(|routes| {
            routes
                .iter()
                .find(|r| r.matches(direction, method, path))
                .cloned()
        }))
    }
}

#[async_trait]
impl RouteStore for MemoryStorage {
    async fn create_vault(&self, vault: Vault) -> Result<Vault, StorageError> {
        if self.vaults.contains_key(&vault.id) {
            return Err(StorageError::Conflict(format!("vault {} already exists", vault.id)));
        }
        self.vaults.insert(vault.id.clone(), vault.clone());
        Ok(vault)
    }

    async fn delete_vault(&self, vault_id: &str) -> Result<(), StorageError> {
        self.vaults
            .remove(vault_id)
            .ok_or_else(|| StorageError::NotFound(format!("vault {}", vault_id)))?;
        self.routes.remove(vault_id);
        Ok(())
    }

    async fn list_vaults(&self) -> Result<Vec<Vault>, StorageError> {
        let mut vaults: Vec<Vault> = self.vaults.iter().map(|v| v.value().clone()).collect();
        vaults.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(vaults)
    }

    async fn create_route(&self, route: Route) -> Result<Route, StorageError> {
        if !self.vaults.contains_key(&route.vault_id) {
            return Err(StorageError::VaultMissing(route.vault_id));
        }

        let route = normalize(route);
        let mut routes = self.routes.entry(route.vault_id.clone()).or_default();
        if routes.iter().any(|r| r.matches(route.direction, &route.method, &route.path)) {
            return Err(StorageError::Conflict(format!(
                "route {} {} {} already exists",
                route.direction, route.method, route.path
            )));
        }
        if routes.iter().any(|r| r.id == route.id) {
            return Err(StorageError::Conflict(format!("route id {} already exists", route.id)));
        }
        routes.push(route.clone());
        Ok(route)
    }

    async fn find_route_by_id(
        &self,
        vault_id: &str,
        route_id: &str,
    ) -> Result<Option<Route>, StorageError> {
        Ok(self
            .routes
            .get(vault_id)
            .and_then(|routes| routes.iter().find(|r| r.id == route_id).cloned()))
    }

    async fn list_routes(&self, vault_id: &str) -> Result<Vec<Route>, StorageError> {
        Ok(self
            .routes
            .get(vault_id)
            .map(|routes| routes.value().clone())
            .unwrap_or_default())
    }

    async fn delete_route(&self, vault_id: &str, route_id: &str) -> Result<(), StorageError> {
        let mut routes = self
            .routes
            .get_mut(vault_id)
            .ok_or_else(|| StorageError::NotFound(format!("route {}", route_id)))?;
        let before = routes.len();
        routes.retain(|r| r.id != route_id);
        if routes.len() == before {
            return Err(StorageError::NotFound(format!("route {}", route_id)));
        }
        Ok(())
    }

    async fn delete_routes(&self, vault_id: &str) -> Result<(), StorageError> {
        self.routes.remove(vault_id);
        Ok(())
    }
}
