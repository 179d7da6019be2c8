use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::admin::AdminState;
use crate::config::validation::{is_host_label, is_http_url};
use crate::storage::{Route, RouteDirectory, RouteStore, StorageError, Vault};
use crate::transformer::Transformation;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("{0}")]
    Invalid(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = match &self {
            AdminError::Invalid(_) => StatusCode::BAD_REQUEST,
            AdminError::NotFound(_) => StatusCode::NOT_FOUND,
            AdminError::Storage(StorageError::NotFound(_) | StorageError::VaultMissing(_)) => StatusCode::NOT_FOUND,
            AdminError::Storage(StorageError::Conflict(_)) => StatusCode::CONFLICT,
            AdminError::Storage(StorageError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub vaults: usize,
    pub routes: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Result<Json<SystemStatus>, AdminError> {
    let vaults = state.store.list_vaults().await?;
    let mut routes = 0;
    for vault in &vaults {
        routes += state.store.list_routes(&vault.id).await?.len();
    }

    Ok(Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        vaults: vaults.len(),
        routes,
    }))
}

pub async fn list_vaults(State(state): State<AdminState>) -> Result<Json<Vec<Vault>>, AdminError> {
    Ok(Json(state.store.list_vaults().await?))
}

pub async fn create_vault(
    State(state): State<AdminState>,
    Json(vault): Json<Vault>,
) -> Result<(StatusCode, Json<Vault>), AdminError> {
    if !is_host_label(&vault.id) {
        return Err(AdminError::Invalid(format!("vault id '{}' must be a lowercase host label", vault.id)));
    }
    if !is_http_url(&vault.upstream) {
        return Err(AdminError::Invalid(format!("upstream '{}' must be an http:// URL", vault.upstream)));
    }

    let vault = state.store.create_vault(vault).await?;
    tracing::info!(vault = %vault.id, "Vault created");
    Ok((StatusCode::CREATED, Json(vault)))
}

pub async fn get_vault(
    State(state): State<AdminState>,
    Path(vault_id): Path<String>,
) -> Result<Json<Vault>, AdminError> {
    existing_vault(&state, &vault_id).await.map(Json)
}

pub async fn delete_vault(
    State(state): State<AdminState>,
    Path(vault_id): Path<String>,
) -> Result<StatusCode, AdminError> {
    state.store.delete_vault(&vault_id).await?;
    tracing::info!(vault = %vault_id, "Vault deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_routes(
    State(state): State<AdminState>,
    Path(vault_id): Path<String>,
) -> Result<Json<Vec<Route>>, AdminError> {
    existing_vault(&state, &vault_id).await?;
    Ok(Json(state.store.list_routes(&vault_id).await?))
}

pub async fn create_route(
    State(state): State<AdminState>,
    Path(vault_id): Path<String>,
    Json(mut route): Json<Route>,
) -> Result<(StatusCode, Json<Route>), AdminError> {
    route.vault_id = vault_id;

    if !route.path.starts_with('/') {
        return Err(AdminError::Invalid(format!("path '{}' must start with '/'", route.path)));
    }
    if route.method.trim().is_empty() {
        return Err(AdminError::Invalid("method must not be empty".into()));
    }
    if let Some(upstream) = &route.upstream {
        if !is_http_url(upstream) {
            return Err(AdminError::Invalid(format!("upstream '{}' must be an http:// URL", upstream)));
        }
    }
    Transformation::for_route(&route, &state.ctx).map_err(|e| AdminError::Invalid(e.to_string()))?;

    let route = state.store.create_route(route).await?;
    tracing::info!(vault = %route.vault_id, route = %route.id, "Route created");
    Ok((StatusCode::CREATED, Json(route)))
}

pub async fn delete_routes(
    State(state): State<AdminState>,
    Path(vault_id): Path<String>,
) -> Result<StatusCode, AdminError> {
    existing_vault(&state, &vault_id).await?;
    state.store.delete_routes(&vault_id).await?;
    tracing::info!(vault = %vault_id, "Routes deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_route(
    State(state): State<AdminState>,
    Path((vault_id, route_id)): Path<(String, String)>,
) -> Result<Json<Route>, AdminError> {
    state
        .store
        .find_route_by_id(&vault_id, &route_id)
        .await?
        .map(Json)
        .ok_or_else(|| AdminError::NotFound(format!("route {}", route_id)))
}

pub async fn delete_route(
    State(state): State<AdminState>,
    Path((vault_id, route_id)): Path<(String, String)>,
) -> Result<StatusCode, AdminError> {
    state.store.delete_route(&vault_id, &route_id).await?;
    tracing::info!(vault = %vault_id, route = %route_id, "Route deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn existing_vault(state: &AdminState, vault_id: &str) -> Result<Vault, AdminError> {
    state
        .store
        .find_vault(vault_id)
        .await?
        .ok_or_else(|| AdminError::NotFound(format!("vault {}", vault_id)))
}
