//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference existing vaults)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Detect conflicting routes
//! - Reject transformation settings that could never run
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;
use thiserror::Error;

use crate::action::{ActionContext, ConfigurationError};
use crate::config::schema::ProxyConfig;
use crate::storage::{Direction, Route};
use crate::transformer::Transformation;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),

    #[error("vault at index {0} has an empty id")]
    EmptyVaultId(usize),

    #[error("vault id '{0}' must be a lowercase host label")]
    InvalidVaultId(String),

    #[error("vault '{0}' is defined more than once")]
    DuplicateVault(String),

    #[error("vault '{vault}': upstream '{upstream}' must be an http:// URL")]
    InvalidUpstream { vault: String, upstream: String },

    #[error("route {route}: references unknown vault '{vault}'")]
    UnknownVault { route: String, vault: String },

    #[error("route {route}: path '{path}' must start with '/'")]
    InvalidPath { route: String, path: String },

    #[error("route {route}: empty method")]
    EmptyMethod { route: String },

    #[error("route {route}: duplicates another route for the same vault, direction, method and path")]
    DuplicateRoute { route: String },

    #[error("route {route}: upstream '{upstream}' must be an http:// URL")]
    InvalidRouteUpstream { route: String, upstream: String },

    #[error("route {route}: {source}")]
    Transformation {
        route: String,
        #[source]
        source: ConfigurationError,
    },

    #[error("admin.api_key must not be empty when the admin API is enabled")]
    EmptyAdminKey,

    #[error("audit.queue must not be empty when auditing is enabled")]
    EmptyAuditQueue,
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_address(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }
    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.trim().is_empty() {
            errors.push(ValidationError::EmptyAdminKey);
        }
    }
    if config.audit.enabled {
        if config.audit.queue.trim().is_empty() {
            errors.push(ValidationError::EmptyAuditQueue);
        }
        if config.audit.max_pending == 0 {
            errors.push(ValidationError::ZeroValue("audit.max_pending"));
        }
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::ZeroValue("timeouts.connect_secs"));
    }
    if config.timeouts.backend_secs == 0 {
        errors.push(ValidationError::ZeroValue("timeouts.backend_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroValue("timeouts.request_secs"));
    }
    if config.limits.max_body_size == 0 {
        errors.push(ValidationError::ZeroValue("limits.max_body_size"));
    }

    let mut vault_ids = HashSet::new();
    for (i, vault) in config.vaults.iter().enumerate() {
        if vault.id.trim().is_empty() {
            errors.push(ValidationError::EmptyVaultId(i));
            continue;
        }
        // Tenant keys are matched exactly against lowercased host labels.
        if !is_host_label(&vault.id) {
            errors.push(ValidationError::InvalidVaultId(vault.id.clone()));
        }
        if !vault_ids.insert(vault.id.as_str()) {
            errors.push(ValidationError::DuplicateVault(vault.id.clone()));
        }
        if !is_http_url(&vault.upstream) {
            errors.push(ValidationError::InvalidUpstream {
                vault: vault.id.clone(),
                upstream: vault.upstream.clone(),
            });
        }
    }

    let ctx = ActionContext::default();
    let mut route_keys: HashSet<(&str, Direction, String, &str)> = HashSet::new();
    for (i, route) in config.routes.iter().enumerate() {
        let label = route_label(i, route);

        if !vault_ids.contains(route.vault_id.as_str()) {
            errors.push(ValidationError::UnknownVault {
                route: label.clone(),
                vault: route.vault_id.clone(),
            });
        }
        if !route.path.starts_with('/') {
            errors.push(ValidationError::InvalidPath {
                route: label.clone(),
                path: route.path.clone(),
            });
        }
        if route.method.trim().is_empty() {
            errors.push(ValidationError::EmptyMethod { route: label.clone() });
        }
        if let Some(upstream) = &route.upstream {
            if !is_http_url(upstream) {
                errors.push(ValidationError::InvalidRouteUpstream {
                    route: label.clone(),
                    upstream: upstream.clone(),
                });
            }
        }

        let key = (
            route.vault_id.as_str(),
            route.direction,
            route.method.to_ascii_uppercase(),
            route.path.as_str(),
        );
        if !route_keys.insert(key) {
            errors.push(ValidationError::DuplicateRoute { route: label.clone() });
        }

        if let Err(source) = Transformation::for_route(route, &ctx) {
            errors.push(ValidationError::Transformation { route: label, source });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

/// Upstreams are plain `http://host[:port][/base]` URLs.
pub fn is_http_url(raw: &str) -> bool {
    url::Url::parse(raw).is_ok_and(|u| u.scheme() == "http" && u.host_str().is_some())
}

/// A lowercase DNS label: `a-z`, `0-9` and inner `-`, at most 63 bytes.
pub fn is_host_label(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 63
        && !id.starts_with('-')
        && !id.ends_with('-')
        && id.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

fn route_label(index: usize, route: &Route) -> String {
    if route.id.is_empty() {
        format!("#{}", index)
    } else {
        route.id.clone()
    }
}
