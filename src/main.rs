//! Vault proxy
//!
//! A tenant-aware intercepting HTTP proxy built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                          ┌──────────────────────────────────────────────────────┐
//!                          │                     VAULT PROXY                       │
//!     Client Request       │  ┌─────────┐    ┌────────────┐    ┌──────────────┐   │
//!     ─────────────────────┼─▶│  http   │───▶│ dispatcher │───▶│   storage    │   │
//!     Host: vlt1.proxy...  │  │ server  │    │            │    │ vault/route  │   │
//!                          │  └─────────┘    └─────┬──────┘    └──────────────┘   │
//!                          │                       │                               │
//!                          │                       ▼                               │
//!                          │                ┌─────────────┐    ┌──────────────┐   │
//!                          │                │ transformer │───▶│    action    │   │
//!                          │                │ form / mpart│    │ tokenize ... │   │
//!                          │                └─────┬───────┘    └──────────────┘   │
//!                          │                      │                                │
//!     Client Response      │                      ▼                                │
//!     ◀────────────────────┼──────────────── pooled client ◀──────────────────────┼──── Vault backend
//!                          │                                                       │
//!                          │  config (+ watcher) · admin API · task queue (audit)  │
//!                          │  observability (tracing, metrics) · lifecycle         │
//!                          └──────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use vault_proxy::action::{ActionContext, TokenVault};
use vault_proxy::admin::{self, AdminState};
use vault_proxy::config::{load_config, watcher::ConfigWatcher, ProxyConfig};
use vault_proxy::http::{AppState, HttpServer};
use vault_proxy::lifecycle::{shutdown_signal, Shutdown};
use vault_proxy::observability;
use vault_proxy::storage::MemoryStorage;
use vault_proxy::task::MemoryQueue;
use vault_proxy::transformer::FieldTransformer;

#[derive(Parser)]
#[command(name = "vault-proxy")]
#[command(about = "Tenant-aware intercepting HTTP proxy", long_about = None)]
struct Args {
    /// Path to the TOML configuration file (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload vaults and routes when the configuration file changes
    #[arg(short, long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    observability::logging::init(&config.observability.log_level);
    tracing::info!("vault-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        backend_timeout_secs = config.timeouts.backend_secs,
        max_body_size = config.limits.max_body_size,
        vaults = config.vaults.len(),
        routes = config.routes.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            observability::metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let storage = MemoryStorage::from_config(&config);
    let ctx = ActionContext::new(Arc::new(TokenVault::new()));
    let shutdown = Shutdown::new();

    let mut state = AppState::new(&config, Arc::new(storage.clone()))
        .with_transformer(Arc::new(FieldTransformer::new(ctx.clone())));
    if config.audit.enabled {
        let queue = MemoryQueue::with_capacity(config.audit.max_pending);
        state = state.with_task_queue(Arc::new(queue), config.audit.queue.clone());
    }

    // Hot reload of the directory content
    let _watcher = match (&args.config, args.watch) {
        (Some(path), true) => {
            let (watcher, mut updates) = ConfigWatcher::new(path, &config);
            let handle = watcher.run()?;
            let storage = storage.clone();
            let mut stop = shutdown.subscribe();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        update = updates.recv() => match update {
                            Some(update) => storage.replace_all(update.vaults, update.routes),
                            None => break,
                        },
                        _ = stop.recv() => break,
                    }
                }
            });
            Some(handle)
        }
        (None, true) => {
            tracing::warn!("--watch ignored: no configuration file given");
            None
        }
        _ => None,
    };

    let mut admin_task = None;
    if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        let admin_state = AdminState::new(Arc::new(storage.clone()), &config.admin.api_key, ctx.clone());
        admin_task = Some(tokio::spawn(admin::serve(listener, admin_state, shutdown.subscribe())));
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(&config, state);
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    shutdown_signal().await;
    shutdown.trigger();

    server_task.await??;
    if let Some(task) = admin_task {
        task.await??;
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
