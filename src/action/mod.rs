//! Pluggable per-field value transformers.
//!
//! # Data Flow
//! ```text
//! route.action (tagged config: type = "tokenize" | "detokenize" | "mask" | ...)
//!     → build_action() (validated once per transformation)
//!     → Arc<dyn Action>
//!     → Action::transform(field value bytes) → new bytes
//! ```
//!
//! # Design Decisions
//! - New kinds are new variants of the `type` tag, not subtypes
//! - Errors never carry the field value so they are safe to log
//! - Token state lives in a shared [`TokenVault`], actions themselves are stateless

pub mod basic;
pub mod token;

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub use basic::{Append, Mask, Passthrough};
pub use token::{Detokenize, TokenVault, Tokenize};

/// A byte-sequence transformer applied to one field value.
pub trait Action: Send + Sync + fmt::Debug {
    /// Transform a single field value.
    fn transform(&self, value: &[u8]) -> Result<Vec<u8>, ActionError>;

    /// Short name reported when a transformation fails.
    fn name(&self) -> &'static str;
}

/// Errors raised while transforming a value.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The value cannot be processed by this action.
    #[error("invalid input for {action}: {reason}")]
    InvalidInput {
        action: &'static str,
        reason: &'static str,
    },

    /// Detokenization of a token the vault does not know.
    #[error("unknown token")]
    UnknownToken,
}

/// Errors raised while building an action or transformation from config.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("no fields configured for the transformation")]
    EmptyFields,

    #[error("unknown action type: {0}")]
    UnknownAction(String),

    #[error("action {action} requires parameter {param}")]
    MissingParameter {
        action: &'static str,
        param: &'static str,
    },
}

/// Tagged action configuration as stored on a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionConfig {
    /// Action kind: `append`, `mask`, `tokenize`, `detokenize` or `passthrough`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Literal suffix for `append`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,

    /// Replacement character for `mask` (default `*`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_char: Option<char>,

    /// Trailing characters `mask` leaves visible (default 0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_last: Option<usize>,
}

impl ActionConfig {
    fn of_kind(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            suffix: None,
            mask_char: None,
            keep_last: None,
        }
    }

    pub fn passthrough() -> Self {
        Self::of_kind("passthrough")
    }

    pub fn tokenize() -> Self {
        Self::of_kind("tokenize")
    }

    pub fn detokenize() -> Self {
        Self::of_kind("detokenize")
    }

    pub fn append(suffix: impl Into<String>) -> Self {
        Self {
            suffix: Some(suffix.into()),
            ..Self::of_kind("append")
        }
    }

    pub fn mask(mask_char: char, keep_last: usize) -> Self {
        Self {
            mask_char: Some(mask_char),
            keep_last: Some(keep_last),
            ..Self::of_kind("mask")
        }
    }
}

/// Shared collaborators actions may need.
#[derive(Debug, Clone, Default)]
pub struct ActionContext {
    pub tokens: Arc<TokenVault>,
}

impl ActionContext {
    pub fn new(tokens: Arc<TokenVault>) -> Self {
        Self { tokens }
    }
}

/// Build a concrete action from its tagged config.
pub fn build_action(
    config: &ActionConfig,
    ctx: &ActionContext,
) -> Result<Arc<dyn Action>, ConfigurationError> {
    let action: Arc<dyn Action> = match config.kind.as_str() {
        "append" => {
            let suffix = config.suffix.clone().ok_or(ConfigurationError::MissingParameter {
                action: "append",
                param: "suffix",
            })?;
            Arc::new(Append::new(suffix))
        }
        "mask" => Arc::new(Mask::new(
            config.mask_char.unwrap_or('*'),
            config.keep_last.unwrap_or(0),
        )),
        "tokenize" => Arc::new(Tokenize::new(ctx.tokens.clone())),
        "detokenize" => Arc::new(Detokenize::new(ctx.tokens.clone())),
        "passthrough" => Arc::new(Passthrough),
        other => return Err(ConfigurationError::UnknownAction(other.to_string())),
    };
    Ok(action)
}

/// Ordered list of body field names.
///
/// Deserializes from either a list or a comma-separated string
/// (`"card_number, cvv"`); whitespace inside names is stripped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldList(Vec<String>);

impl FieldList {
    /// Parse the comma-separated form.
    pub fn parse(raw: &str) -> Self {
        Self(
            raw.split(',')
                .map(|f| f.chars().filter(|c| !c.is_whitespace()).collect::<String>())
                .filter(|f| !f.is_empty())
                .collect(),
        )
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|f| f == name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl From<Vec<String>> for FieldList {
    fn from(fields: Vec<String>) -> Self {
        Self(fields)
    }
}

impl<'de> Deserialize<'de> for FieldList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            List(Vec<String>),
            Joined(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::List(fields) => Self(
                fields
                    .into_iter()
                    .map(|f| f.trim().to_string())
                    .filter(|f| !f.is_empty())
                    .collect(),
            ),
            Raw::Joined(raw) => Self::parse(&raw),
        })
    }
}
