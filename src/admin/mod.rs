//! Administrative API over the route directory.
//!
//! Served on its own listener, every endpoint behind a bearer key.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::get,
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::action::ActionContext;
use crate::storage::RouteStore;
use self::auth::admin_auth_middleware;
use self::handlers::*;

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub store: Arc<dyn RouteStore>,
    pub api_key: Arc<str>,
    /// Used to check that a submitted route's action can be built.
    pub ctx: ActionContext,
}

impl AdminState {
    pub fn new(store: Arc<dyn RouteStore>, api_key: &str, ctx: ActionContext) -> Self {
        Self {
            store,
            api_key: Arc::from(api_key),
            ctx,
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/vaults", get(list_vaults).post(create_vault))
        .route("/admin/vaults/{vault_id}", get(get_vault).delete(delete_vault))
        .route(
            "/admin/vaults/{vault_id}/routes",
            get(list_routes).post(create_route).delete(delete_routes),
        )
        .route(
            "/admin/vaults/{vault_id}/routes/{route_id}",
            get(get_route).delete(delete_route),
        )
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

/// Serve the admin API until shutdown.
pub async fn serve(listener: TcpListener, state: AdminState, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
    tracing::info!(address = %listener.local_addr()?, "Admin API starting");

    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
}
