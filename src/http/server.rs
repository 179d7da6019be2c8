//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all proxy handler
//! - Wire up middleware (request ID, tracing, overall deadline)
//! - Own the pooled backend client shared by all requests
//! - Bind server to listener and drain on shutdown

use axum::{body::Body, routing::any, Router};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::http::dispatcher::proxy_handler;
use crate::storage::RouteDirectory;
use crate::task::TaskQueue;
use crate::transformer::{BodyTransformer, FieldTransformer};

/// Where audit tasks go.
#[derive(Clone)]
pub struct AuditSink {
    pub queue: Arc<dyn TaskQueue>,
    pub queue_name: String,
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub directory: Arc<dyn RouteDirectory>,
    pub transformer: Arc<dyn BodyTransformer>,
    pub client: Client<HttpConnector, Body>,
    pub backend_timeout: Duration,
    pub max_body_size: usize,
    pub audit: Option<AuditSink>,
}

impl AppState {
    /// State with the default field transformer and no audit queue.
    pub fn new(config: &ProxyConfig, directory: Arc<dyn RouteDirectory>) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            directory,
            transformer: Arc::new(FieldTransformer::default()),
            client,
            backend_timeout: Duration::from_secs(config.timeouts.backend_secs),
            max_body_size: config.limits.max_body_size,
            audit: None,
        }
    }

    pub fn with_transformer(mut self, transformer: Arc<dyn BodyTransformer>) -> Self {
        self.transformer = transformer;
        self
    }

    /// Enqueue an audit task for every route-matched exchange.
    pub fn with_task_queue(mut self, queue: Arc<dyn TaskQueue>, queue_name: impl Into<String>) -> Self {
        self.audit = Some(AuditSink {
            queue,
            queue_name: queue_name.into(),
        });
        self
    }
}

/// HTTP server for the proxy.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration and state.
    pub fn new(config: &ProxyConfig, state: AppState) -> Self {
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs))),
            )
    }

    /// Run the server until the shutdown signal fires, then drain.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
