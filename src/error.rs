//! Errors surfaced at the proxy boundary.
//!
//! Every variant maps to a fixed client-facing body. Details (storage faults,
//! parse positions, backend errors) go to the log only, never to the client.

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::storage::StorageError;
use crate::transformer::TransformError;

/// Body returned when no vault matches the request.
pub const VAULT_NOT_FOUND_BODY: &str = "Vault was not found";

/// Which leg of the exchange a transformation failed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Request,
    Response,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
        }
    }
}

/// Errors the dispatcher can produce (converted to HTTP responses).
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("vault not found")]
    VaultNotFound,

    #[error("route directory failure: {0}")]
    Storage(#[from] StorageError),

    #[error("{} transformation failed: {source}", .stage.as_str())]
    Transform {
        stage: Stage,
        #[source]
        source: TransformError,
    },

    #[error("body exceeds the configured limit")]
    BodyTooLarge,

    #[error("failed to read body: {0}")]
    ReadBody(String),

    #[error("invalid upstream address: {0}")]
    InvalidUpstream(String),

    #[error("upstream request failed: {0}")]
    Backend(String),

    #[error("upstream request timed out after {0} seconds")]
    BackendTimeout(u64),
}

impl ProxyError {
    pub fn transform(stage: Stage, source: TransformError) -> Self {
        Self::Transform { stage, source }
    }

    /// Status code and fixed client body.
    pub fn status_and_body(&self) -> (StatusCode, &'static str) {
        match self {
            Self::VaultNotFound => (StatusCode::NOT_FOUND, VAULT_NOT_FOUND_BODY),
            Self::Storage(_) => (StatusCode::SERVICE_UNAVAILABLE, "Route directory unavailable"),
            Self::Transform {
                stage: Stage::Request,
                ..
            } => (StatusCode::BAD_GATEWAY, "Failed to transform request"),
            Self::Transform {
                stage: Stage::Response,
                ..
            } => (StatusCode::BAD_GATEWAY, "Failed to transform response"),
            Self::BodyTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, "Payload too large"),
            Self::ReadBody(_) => (StatusCode::BAD_REQUEST, "Failed to read request body"),
            Self::InvalidUpstream(_) => (StatusCode::BAD_GATEWAY, "Invalid upstream address"),
            Self::Backend(_) => (StatusCode::BAD_GATEWAY, "Upstream request failed"),
            Self::BackendTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "Upstream request timed out"),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();

        match &self {
            Self::VaultNotFound => tracing::debug!("Vault not found"),
            _ => tracing::error!(error = %self, status = %status, "Proxy error"),
        }

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionError;
    use crate::transformer::ProtocolError;

    #[test]
    fn test_vault_not_found_maps_to_404() {
        let (status, body) = ProxyError::VaultNotFound.status_and_body();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "Vault was not found");
    }

    #[test]
    fn test_transform_failures_map_to_502() {
        let req = ProxyError::transform(Stage::Request, ProtocolError::MissingBoundary.into());
        let res = ProxyError::transform(Stage::Response, ActionError::UnknownToken.into());
        assert_eq!(req.into_response().status(), StatusCode::BAD_GATEWAY);
        assert_eq!(res.status_and_body().1, "Failed to transform response");
    }

    #[test]
    fn test_storage_and_timeouts_are_distinct() {
        let storage = ProxyError::from(StorageError::Unavailable("redis down".into()));
        assert_eq!(storage.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ProxyError::BackendTimeout(30).into_response().status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ProxyError::Backend("connection refused".into()).into_response().status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_client_body_never_echoes_details() {
        let err = ProxyError::Backend("10.0.0.7:5432 refused".into());
        assert!(err.to_string().contains("10.0.0.7"));
        assert!(!err.status_and_body().1.contains("10.0.0.7"));
    }

    #[test]
    fn test_display_includes_stage() {
        let err = ProxyError::transform(Stage::Request, ProtocolError::InvalidContentType.into());
        assert_eq!(err.to_string(), "request transformation failed: content type cannot be parsed");
    }
}
