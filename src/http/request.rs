//! Request inspection and preparation for forwarding.
//!
//! # Responsibilities
//! - Decide the traffic direction (reverse-proxied or forward-proxied)
//! - Extract the tenant key (host label or proxy credential)
//! - Resolve the backend URI for an upstream base
//! - Strip hop-by-hop headers before forwarding
//!
//! # Design Decisions
//! - Request ID is assigned by the middleware stack before the handler runs
//! - Only plain `http://` upstreams are supported

use axum::http::header::{CONNECTION, HOST, PROXY_AUTHORIZATION};
use axum::http::uri::Authority;
use axum::http::{HeaderMap, HeaderName, Request, Uri, Version};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::ProxyError;
use crate::storage::Direction;

pub const X_REQUEST_ID: &str = "x-request-id";

const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

pub fn is_hop_by_hop_header(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    let fixed: Vec<HeaderName> = headers
        .keys()
        .filter(|name| is_hop_by_hop_header(name.as_str()))
        .cloned()
        .collect();
    for name in listed.into_iter().chain(fixed) {
        headers.remove(name);
    }
}

/// The request ID set by the middleware stack.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// HTTP/1.x requests with an absolute-form target are forward-proxy (egress)
/// traffic. HTTP/2 always carries scheme and authority, so it is inbound.
pub fn direction_of<B>(request: &Request<B>) -> Direction {
    let uri = request.uri();
    if request.version() < Version::HTTP_2 && uri.scheme().is_some() && uri.authority().is_some() {
        Direction::Outbound
    } else {
        Direction::Inbound
    }
}

/// Key used to look up the vault.
///
/// Inbound: leading label of the host (`vlt1` for `vlt1.proxy.test:8080`).
/// Outbound: user name of the `Proxy-Authorization: Basic` credential.
///
/// Both are lowercased; vault IDs are lowercase host labels.
pub fn tenant_key<B>(request: &Request<B>, direction: Direction) -> Option<String> {
    match direction {
        Direction::Inbound => host_label(request),
        Direction::Outbound => proxy_user(request.headers()),
    }
}

fn host_label<B>(request: &Request<B>) -> Option<String> {
    let host = match request.headers().get(HOST).and_then(|v| v.to_str().ok()) {
        Some(raw) => raw.parse::<Authority>().ok()?.host().to_string(),
        None => request.uri().host()?.to_string(),
    };
    let label = host.split('.').next()?.trim();
    if label.is_empty() {
        None
    } else {
        Some(label.to_ascii_lowercase())
    }
}

fn proxy_user(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(PROXY_AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let credential = String::from_utf8(decoded).ok()?;
    let user = credential.split_once(':').map_or(credential.as_str(), |(user, _)| user);
    if user.is_empty() {
        None
    } else {
        Some(user.to_ascii_lowercase())
    }
}

/// `scheme://authority` of an absolute-form target.
pub fn absolute_origin(uri: &Uri) -> Option<String> {
    Some(format!("{}://{}", uri.scheme_str()?, uri.authority()?))
}

/// Join an upstream base (`http://host:port[/prefix]`) with the request's
/// path and query.
pub fn upstream_uri(upstream: &str, path_and_query: &str) -> Result<Uri, ProxyError> {
    let invalid = |reason: &str| ProxyError::InvalidUpstream(format!("{}: {}", upstream, reason));

    let base = url::Url::parse(upstream).map_err(|e| invalid(&e.to_string()))?;
    if base.scheme() != "http" {
        return Err(invalid("only http upstreams are supported"));
    }
    let authority = &base[url::Position::BeforeHost..url::Position::AfterPort];
    if authority.is_empty() {
        return Err(invalid("missing host"));
    }
    let prefix = base.path().trim_end_matches('/');

    format!("http://{}{}{}", authority, prefix, path_and_query)
        .parse::<Uri>()
        .map_err(|e| invalid(&e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn request(uri: &str, host: Option<&str>) -> Request<()> {
        let mut builder = Request::builder().uri(uri);
        if let Some(host) = host {
            builder = builder.header(HOST, host);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_inbound_tenant_from_host_label() {
        let req = request("/tokenize", Some("VLT1.proxy.test:8080"));
        assert_eq!(direction_of(&req), Direction::Inbound);
        assert_eq!(tenant_key(&req, Direction::Inbound).as_deref(), Some("vlt1"));

        let req = request("/tokenize", Some("localhost"));
        assert_eq!(tenant_key(&req, Direction::Inbound).as_deref(), Some("localhost"));

        let req = request("/tokenize", None);
        assert_eq!(tenant_key(&req, Direction::Inbound), None);
    }

    #[test]
    fn test_absolute_form_is_outbound() {
        let mut req = request("http://api.example.com/v1/charges?x=1", None);
        assert_eq!(direction_of(&req), Direction::Outbound);
        assert_eq!(absolute_origin(req.uri()).as_deref(), Some("http://api.example.com"));

        *req.version_mut() = Version::HTTP_2;
        assert_eq!(direction_of(&req), Direction::Inbound);
    }

    #[test]
    fn test_outbound_tenant_from_proxy_credential() {
        let mut req = request("http://api.example.com/", None);
        assert_eq!(tenant_key(&req, Direction::Outbound), None);

        let encoded = STANDARD.encode("vlt1:secret");
        req.headers_mut().insert(
            PROXY_AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {}", encoded)).unwrap(),
        );
        assert_eq!(tenant_key(&req, Direction::Outbound).as_deref(), Some("vlt1"));

        let encoded = STANDARD.encode("VLT1:secret");
        req.headers_mut().insert(
            PROXY_AUTHORIZATION,
            HeaderValue::from_str(&format!("Basic {}", encoded)).unwrap(),
        );
        assert_eq!(tenant_key(&req, Direction::Outbound).as_deref(), Some("vlt1"));

        req.headers_mut()
            .insert(PROXY_AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(tenant_key(&req, Direction::Outbound), None);
    }

    #[test]
    fn test_upstream_uri_join() {
        let uri = upstream_uri("http://127.0.0.1:9000", "/tokenize?a=1").unwrap();
        assert_eq!(uri.to_string(), "http://127.0.0.1:9000/tokenize?a=1");

        let uri = upstream_uri("http://backend.internal/api/", "/v1/x").unwrap();
        assert_eq!(uri.to_string(), "http://backend.internal/api/v1/x");
    }

    #[test]
    fn test_upstream_uri_rejects_unsupported() {
        for bad in ["https://secure.example.com", "not a url", "unix:/tmp/sock"] {
            let err = upstream_uri(bad, "/").unwrap_err();
            assert!(matches!(err, ProxyError::InvalidUpstream(_)), "{}", bad);
        }
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive, x-internal"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-internal", HeaderValue::from_static("1"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("content-type", HeaderValue::from_static("text/plain"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key("content-type"));
        assert!(is_hop_by_hop_header("Proxy-Authorization"));
        assert!(!is_hop_by_hop_header("content-length"));
    }
}
