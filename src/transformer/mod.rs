//! Content-type aware body rewriting.
//!
//! # Data Flow
//! ```text
//! Message (headers + fully buffered body)
//!     → Content-Type dispatch
//!         application/x-www-form-urlencoded → form.rs
//!         multipart/form-data               → multipart.rs
//!         anything else / absent            → untouched
//!     → replacement body staged in full
//!     → Message::replace_body (body swapped, Content-Length recomputed)
//! ```
//!
//! # Design Decisions
//! - A body is replaced only once its rewrite fully succeeded; on error the
//!   caller rejects the whole exchange
//! - Untouched content is copied byte-for-byte
//! - Transformer is a trait so the dispatcher can be driven by other rewriters

pub mod form;
pub mod multipart;

use axum::http::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING};
use axum::http::{HeaderMap, HeaderValue};
use bytes::Bytes;
use mime::Mime;
use std::sync::Arc;
use thiserror::Error;

use crate::action::{build_action, Action, ActionConfig, ActionContext, ActionError, ConfigurationError, FieldList};
use crate::storage::Route;

/// Malformed framing or content-type information.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("content type cannot be parsed")]
    InvalidContentType,

    #[error("multipart boundary missing from content type")]
    MissingBoundary,

    #[error("content encoding {0} cannot be rewritten")]
    UnsupportedEncoding(String),

    #[error("malformed form body: {0}")]
    MalformedForm(&'static str),

    #[error("malformed multipart body: {0}")]
    MalformedMultipart(&'static str),
}

/// Any failure while rewriting a body.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

impl TransformError {
    /// Stable label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Protocol(_) => "protocol",
            Self::Action(_) => "action",
            Self::Configuration(_) => "configuration",
        }
    }
}

/// A request or response body in flight, with the headers describing it.
#[derive(Debug)]
pub struct Message<'a> {
    headers: &'a mut HeaderMap,
    body: Bytes,
}

impl<'a> Message<'a> {
    pub fn new(headers: &'a mut HeaderMap, body: Bytes) -> Self {
        Self { headers, body }
    }

    pub fn headers(&self) -> &HeaderMap {
        &*self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Declared `Content-Type`, if present and readable.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Swap in a fully formed body and make the declared length match it.
    pub fn replace_body(&mut self, body: Bytes) {
        self.headers.remove(TRANSFER_ENCODING);
        self.headers.remove(CONTENT_LENGTH);
        self.headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        self.body = body;
    }

    pub fn into_body(self) -> Bytes {
        self.body
    }
}

/// Rewrites request and response bodies for a matched route.
pub trait BodyTransformer: Send + Sync {
    fn transform_request_body(&self, route: &Route, message: &mut Message<'_>) -> Result<(), TransformError>;

    fn transform_response_body(&self, route: &Route, message: &mut Message<'_>) -> Result<(), TransformError>;
}

/// A validated (fields, action) pair ready to rewrite bodies.
#[derive(Debug, Clone)]
pub struct Transformation {
    fields: FieldList,
    action: Arc<dyn Action>,
}

impl Transformation {
    /// Build from route configuration; rejects empty field lists and unknown actions.
    pub fn new(fields: &FieldList, action: &ActionConfig, ctx: &ActionContext) -> Result<Self, ConfigurationError> {
        if fields.is_empty() {
            return Err(ConfigurationError::EmptyFields);
        }
        Ok(Self {
            fields: fields.clone(),
            action: build_action(action, ctx)?,
        })
    }

    pub fn for_route(route: &Route, ctx: &ActionContext) -> Result<Self, ConfigurationError> {
        Self::new(&route.fields, &route.action, ctx)
    }

    pub fn action_name(&self) -> &'static str {
        self.action.name()
    }

    /// Rewrite the configured fields of `message` in place.
    pub fn apply(&self, message: &mut Message<'_>) -> Result<(), TransformError> {
        let Some(content_type) = message.content_type() else {
            return Ok(());
        };
        let media_type: Mime = content_type
            .parse()
            .map_err(|_| ProtocolError::InvalidContentType)?;

        let is_form =
            media_type.type_() == mime::APPLICATION && media_type.subtype() == mime::WWW_FORM_URLENCODED;
        let is_multipart = media_type.type_() == mime::MULTIPART && media_type.subtype() == mime::FORM_DATA;
        if !is_form && !is_multipart {
            return Ok(());
        }

        if let Some(encoding) = content_encoding(message.headers()) {
            return Err(ProtocolError::UnsupportedEncoding(encoding).into());
        }

        let rewritten = if is_form {
            form::rewrite(message.body(), &self.fields, self.action.as_ref())?
        } else {
            let boundary = media_type
                .get_param(mime::BOUNDARY)
                .ok_or(ProtocolError::MissingBoundary)?;
            multipart::rewrite(message.body(), boundary.as_str(), &self.fields, self.action.as_ref())?
        };

        message.replace_body(rewritten);
        Ok(())
    }
}

fn content_encoding(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(CONTENT_ENCODING)?.to_str().unwrap_or("unreadable").trim();
    if value.is_empty() || value.eq_ignore_ascii_case("identity") {
        None
    } else {
        Some(value.to_string())
    }
}

/// Default transformer: applies the route's fields and action to both legs.
#[derive(Debug, Clone, Default)]
pub struct FieldTransformer {
    ctx: ActionContext,
}

impl FieldTransformer {
    pub fn new(ctx: ActionContext) -> Self {
        Self { ctx }
    }

    fn apply(&self, route: &Route, message: &mut Message<'_>) -> Result<(), TransformError> {
        let transformation = Transformation::for_route(route, &self.ctx)?;
        transformation.apply(message).inspect_err(|e| {
            // Field values never reach the log.
            tracing::warn!(
                route_id = %route.id,
                action = transformation.action_name(),
                kind = e.kind(),
                "Field transformation failed"
            );
        })
    }
}

impl BodyTransformer for FieldTransformer {
    fn transform_request_body(&self, route: &Route, message: &mut Message<'_>) -> Result<(), TransformError> {
        self.apply(route, message)
    }

    fn transform_response_body(&self, route: &Route, message: &mut Message<'_>) -> Result<(), TransformError> {
        self.apply(route, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::TokenVault;

    fn headers(content_type: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(ct) = content_type {
            headers.insert(CONTENT_TYPE, HeaderValue::from_str(ct).unwrap());
        }
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("999"));
        headers
    }

    fn transformation(fields: &str, action: ActionConfig) -> Transformation {
        Transformation::new(&FieldList::parse(fields), &action, &ActionContext::default()).unwrap()
    }

    #[test]
    fn test_empty_field_list_rejected() {
        let err = Transformation::new(&FieldList::default(), &ActionConfig::tokenize(), &ActionContext::default())
            .unwrap_err();
        assert_eq!(err, ConfigurationError::EmptyFields);
    }

    #[test]
    fn test_form_body_rewritten_and_length_fixed() {
        let mut h = headers(Some("application/x-www-form-urlencoded"));
        let mut message = Message::new(&mut h, Bytes::from_static(b"card=4111&name=bob"));
        transformation("card", ActionConfig::mask('*', 2)).apply(&mut message).unwrap();

        assert_eq!(message.body().as_ref(), b"card=**11&name=bob");
        assert_eq!(h_len(message.headers()), "18");
    }

    #[test]
    fn test_other_content_types_untouched() {
        for ct in [Some("text/plain"), Some("application/json"), None] {
            let mut h = headers(ct);
            let mut message = Message::new(&mut h, Bytes::from_static(b"card=4111"));
            transformation("card", ActionConfig::mask('*', 0)).apply(&mut message).unwrap();
            assert_eq!(message.body().as_ref(), b"card=4111");
            assert_eq!(h_len(message.headers()), "999");
        }
    }

    #[test]
    fn test_unparseable_content_type() {
        let mut h = headers(Some("not a mime type"));
        let mut message = Message::new(&mut h, Bytes::from_static(b"card=4111"));
        let err = transformation("card", ActionConfig::passthrough()).apply(&mut message).unwrap_err();
        assert!(matches!(err, TransformError::Protocol(ProtocolError::InvalidContentType)));
    }

    #[test]
    fn test_multipart_without_boundary() {
        let mut h = headers(Some("multipart/form-data"));
        let mut message = Message::new(&mut h, Bytes::from_static(b"--x\r\n\r\n--x--"));
        let err = transformation("card", ActionConfig::passthrough()).apply(&mut message).unwrap_err();
        assert!(matches!(err, TransformError::Protocol(ProtocolError::MissingBoundary)));
    }

    #[test]
    fn test_compressed_form_rejected() {
        let mut h = headers(Some("application/x-www-form-urlencoded"));
        h.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        let mut message = Message::new(&mut h, Bytes::from_static(b"\x1f\x8b"));
        let err = transformation("card", ActionConfig::passthrough()).apply(&mut message).unwrap_err();
        assert!(matches!(err, TransformError::Protocol(ProtocolError::UnsupportedEncoding(e)) if e == "gzip"));
    }

    #[test]
    fn test_failed_action_leaves_body_in_place() {
        let mut h = headers(Some("application/x-www-form-urlencoded"));
        let mut message = Message::new(&mut h, Bytes::from_static(b"token=tok_unknown"));
        let err = transformation("token", ActionConfig::detokenize()).apply(&mut message).unwrap_err();
        assert_eq!(err.kind(), "action");
        assert_eq!(message.body().as_ref(), b"token=tok_unknown");
        assert_eq!(h_len(message.headers()), "999");
    }

    #[test]
    fn test_action_name_reported() {
        assert_eq!(transformation("card", ActionConfig::mask('*', 4)).action_name(), "mask");
        assert_eq!(transformation("token", ActionConfig::detokenize()).action_name(), "detokenize");
    }

    #[test]
    fn test_field_transformer_tokenizes_then_detokenizes() {
        let ctx = ActionContext::new(Arc::new(TokenVault::new()));
        let transformer = FieldTransformer::new(ctx.clone());
        let route = |action: ActionConfig| Route {
            id: "rt1".into(),
            vault_id: "vlt1".into(),
            direction: crate::storage::Direction::Inbound,
            method: "POST".into(),
            path: "/".into(),
            upstream: None,
            fields: FieldList::parse("card"),
            action,
        };

        let mut h = headers(Some("application/x-www-form-urlencoded"));
        let mut message = Message::new(&mut h, Bytes::from_static(b"card=4111"));
        transformer
            .transform_request_body(&route(ActionConfig::tokenize()), &mut message)
            .unwrap();
        let tokenized = message.into_body();
        assert!(tokenized.starts_with(b"card=tok_"));

        let mut h = headers(Some("application/x-www-form-urlencoded"));
        let mut message = Message::new(&mut h, tokenized);
        transformer
            .transform_response_body(&route(ActionConfig::detokenize()), &mut message)
            .unwrap();
        assert_eq!(message.body().as_ref(), b"card=4111");
    }

    fn h_len(headers: &HeaderMap) -> &str {
        headers.get(CONTENT_LENGTH).unwrap().to_str().unwrap()
    }
}
