//! Per-request dispatch: tenant, route, transform, forward.
//!
//! # Data Flow
//! ```text
//! request
//!     → tenant key (host label / proxy credential)
//!     → RouteDirectory::find_vault ── none ──→ 404 "Vault was not found"
//!     → RouteDirectory::find_route ── none ──→ stream to backend unmodified
//!     → buffer request body (bounded)
//!     → BodyTransformer::transform_request_body ── err ──→ 502, backend untouched
//!     → backend call (bounded by timeouts.backend_secs)
//!     → buffer response body (bounded)
//!     → BodyTransformer::transform_response_body ── err ──→ 502
//!     → client
//! ```
//!
//! Directory faults abort with 503 and never fall back to pass-through.
//! Backend calls are not retried. When the client goes away the handler
//! future is dropped, which drops the in-flight backend call with it.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{request::Parts, Request, Version},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use serde_json::json;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::time::Instant as Deadline;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{ProxyError, Stage};
use crate::http::request::{absolute_origin, direction_of, request_id, strip_hop_by_hop, tenant_key, upstream_uri};
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::storage::{Direction, Route, RouteDirectory};
use crate::task::{Task, AUDIT_WORKER};
use crate::transformer::{BodyTransformer, Message};

/// What the handler learned about one exchange, for logs, metrics and audit.
#[derive(Debug, Clone)]
struct Exchange {
    request_id: String,
    direction: Direction,
    method: String,
    path: String,
    vault: Option<String>,
    route: Option<String>,
}

enum BodyError {
    TooLarge,
    Read(String),
}

/// Catch-all handler for proxied traffic.
pub async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let mut exchange = Exchange {
        request_id: request_id(request.headers()),
        direction: direction_of(&request),
        method: request.method().to_string(),
        path: request.uri().path().to_string(),
        vault: None,
        route: None,
    };

    let span = tracing::info_span!(
        "proxy",
        request_id = %exchange.request_id,
        client = %client,
        direction = %exchange.direction,
        method = %exchange.method,
        path = %exchange.path,
    );

    async move {
        let response = match dispatch(&state, request, &mut exchange).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        };
        let status = response.status().as_u16();

        metrics::record_request(
            &exchange.method,
            status,
            exchange.vault.as_deref().unwrap_or("none"),
            start.elapsed(),
        );
        tracing::debug!(status, elapsed_ms = start.elapsed().as_millis() as u64, "Request completed");

        if exchange.route.is_some() {
            enqueue_audit(&state, &exchange, status);
        }
        response
    }
    .instrument(span)
    .await
}

async fn dispatch(state: &AppState, request: Request<Body>, exchange: &mut Exchange) -> Result<Response, ProxyError> {
    let Some(key) = tenant_key(&request, exchange.direction) else {
        metrics::record_route_lookup("vault_not_found");
        return Err(ProxyError::VaultNotFound);
    };

    let vault = match state.directory.find_vault(&key).await {
        Ok(Some(vault)) => vault,
        Ok(None) => {
            metrics::record_route_lookup("vault_not_found");
            return Err(ProxyError::VaultNotFound);
        }
        Err(e) => {
            metrics::record_route_lookup("error");
            return Err(e.into());
        }
    };
    exchange.vault = Some(vault.id.clone());

    let route = state
        .directory
        .find_route(&vault.id, exchange.direction, &exchange.method, &exchange.path)
        .await
        .map_err(|e| {
            metrics::record_route_lookup("error");
            ProxyError::from(e)
        })?;

    // Egress traffic goes where the client addressed it unless the route overrides.
    let origin = match exchange.direction {
        Direction::Inbound => None,
        Direction::Outbound => absolute_origin(request.uri()),
    };

    match route {
        None => {
            metrics::record_route_lookup("passthrough");
            tracing::debug!(vault = %vault.id, "No route matched, passing through");
            let upstream = origin.unwrap_or(vault.upstream);
            forward_passthrough(state, request, &upstream).await
        }
        Some(route) => {
            metrics::record_route_lookup("matched");
            tracing::info!(vault = %vault.id, route = %route.id, "Route matched");
            exchange.route = Some(route.id.clone());
            let upstream = route
                .upstream
                .clone()
                .or(origin)
                .unwrap_or_else(|| vault.upstream.clone());
            forward_transformed(state, request, &route, &upstream).await
        }
    }
}

/// Stream the request and response through untouched.
async fn forward_passthrough(state: &AppState, request: Request<Body>, upstream: &str) -> Result<Response, ProxyError> {
    let (mut parts, body) = request.into_parts();
    prepare_forward(&mut parts, upstream)?;

    let deadline = Deadline::now() + state.backend_timeout;
    let response = send(state, Request::from_parts(parts, body), deadline).await?;

    let (parts, body) = response.into_parts();
    Ok(Response::from_parts(parts, Body::new(body)))
}

/// Buffer, rewrite, forward, buffer, rewrite. Nothing reaches the backend
/// unless the request rewrite fully succeeded.
async fn forward_transformed(
    state: &AppState,
    request: Request<Body>,
    route: &Route,
    upstream: &str,
) -> Result<Response, ProxyError> {
    let (mut parts, body) = request.into_parts();
    prepare_forward(&mut parts, upstream)?;

    let body = collect_limited(body, state.max_body_size).await.map_err(|e| match e {
        BodyError::TooLarge => ProxyError::BodyTooLarge,
        BodyError::Read(reason) => ProxyError::ReadBody(reason),
    })?;

    let mut message = Message::new(&mut parts.headers, body);
    state
        .transformer
        .transform_request_body(route, &mut message)
        .map_err(|e| {
            metrics::record_transformation(Stage::Request.as_str(), e.kind());
            ProxyError::transform(Stage::Request, e)
        })?;
    metrics::record_transformation(Stage::Request.as_str(), "ok");
    let body = message.into_body();

    let deadline = Deadline::now() + state.backend_timeout;
    let response = send(state, Request::from_parts(parts, Body::from(body)), deadline).await?;

    let (mut parts, body) = response.into_parts();
    let body = tokio::time::timeout_at(deadline, collect_limited(Body::new(body), state.max_body_size))
        .await
        .map_err(|_| ProxyError::BackendTimeout(state.backend_timeout.as_secs()))?
        .map_err(|e| match e {
            BodyError::TooLarge => ProxyError::Backend("response body exceeds the configured limit".to_string()),
            BodyError::Read(reason) => ProxyError::Backend(format!("failed to read response body: {}", reason)),
        })?;

    // The body is no longer streamed; framing headers from the backend are stale.
    strip_hop_by_hop(&mut parts.headers);

    let mut message = Message::new(&mut parts.headers, body);
    state
        .transformer
        .transform_response_body(route, &mut message)
        .map_err(|e| {
            metrics::record_transformation(Stage::Response.as_str(), e.kind());
            ProxyError::transform(Stage::Response, e)
        })?;
    metrics::record_transformation(Stage::Response.as_str(), "ok");
    let body = message.into_body();

    Ok(Response::from_parts(parts, Body::from(body)))
}

/// Point the request at the backend and drop connection-scoped headers.
fn prepare_forward(parts: &mut Parts, upstream: &str) -> Result<(), ProxyError> {
    let path_and_query = parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    parts.uri = upstream_uri(upstream, path_and_query)?;
    parts.version = Version::HTTP_11;
    strip_hop_by_hop(&mut parts.headers);
    parts.headers.remove(axum::http::header::HOST);
    Ok(())
}

async fn send(state: &AppState, request: Request<Body>, deadline: Deadline) -> Result<hyper::Response<Incoming>, ProxyError> {
    match tokio::time::timeout_at(deadline, state.client.request(request)).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) => Err(ProxyError::Backend(e.to_string())),
        Err(_) => Err(ProxyError::BackendTimeout(state.backend_timeout.as_secs())),
    }
}

async fn collect_limited(body: Body, limit: usize) -> Result<Bytes, BodyError> {
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(BodyError::TooLarge),
        Err(e) => Err(BodyError::Read(e.to_string())),
    }
}

/// Fire-and-forget audit record. Never carries bodies or field values.
fn enqueue_audit(state: &AppState, exchange: &Exchange, status: u16) {
    let Some(audit) = state.audit.clone() else {
        return;
    };

    let task = Task::new(
        AUDIT_WORKER,
        json!({
            "request_id": exchange.request_id,
            "vault_id": exchange.vault,
            "route_id": exchange.route,
            "direction": exchange.direction,
            "method": exchange.method,
            "path": exchange.path,
            "status": status,
        }),
        Uuid::new_v4().simple().to_string(),
    );

    tokio::spawn(
        async move {
            if let Err(e) = task.perform(&audit.queue_name, audit.queue.as_ref()).await {
                tracing::warn!(error = %e, "Failed to enqueue audit task");
            }
        }
        .in_current_span(),
    );
}
