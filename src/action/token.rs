//! Tokenization actions and the token store they share.
//!
//! Token format: `tok_{24 alphanumeric}`
//! Example:      `tok_Xq2v9LbA0cZ7mN4pR8sT1uWy`

use dashmap::DashMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;

use crate::action::{Action, ActionError};

const TOKEN_PREFIX: &str = "tok_";
const TOKEN_ID_LEN: usize = 24;

/// Thread-safe two-way mapping between values and opaque tokens.
///
/// Holds plaintext in process memory with no persistence.
#[derive(Debug, Default)]
pub struct TokenVault {
    by_value: DashMap<Vec<u8>, String>,
    by_token: DashMap<String, Vec<u8>>,
}

impl TokenVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the token for `value`, minting one on first sight.
    pub fn tokenize(&self, value: &[u8]) -> String {
        self.by_value
            .entry(value.to_vec())
            .or_insert_with(|| {
                let token = generate_token();
                // Reverse entry is written first so a token is never handed
                // out before it can be resolved.
                self.by_token.insert(token.clone(), value.to_vec());
                token
            })
            .value()
            .clone()
    }

    /// Resolve a token back to its value.
    pub fn detokenize(&self, token: &str) -> Option<Vec<u8>> {
        self.by_token.get(token).map(|v| v.value().clone())
    }

    pub fn len(&self) -> usize {
        self.by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_token.is_empty()
    }
}

fn generate_token() -> String {
    let id: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_ID_LEN)
        .map(char::from)
        .collect();
    format!("{}{}", TOKEN_PREFIX, id)
}

/// Replaces a value with its token.
#[derive(Debug, Clone)]
pub struct Tokenize {
    vault: Arc<TokenVault>,
}

impl Tokenize {
    pub fn new(vault: Arc<TokenVault>) -> Self {
        Self { vault }
    }
}

impl Action for Tokenize {
    fn transform(&self, value: &[u8]) -> Result<Vec<u8>, ActionError> {
        Ok(self.vault.tokenize(value).into_bytes())
    }

    fn name(&self) -> &'static str {
        "tokenize"
    }
}

/// Replaces a token with the value it stands for.
#[derive(Debug, Clone)]
pub struct Detokenize {
    vault: Arc<TokenVault>,
}

impl Detokenize {
    pub fn new(vault: Arc<TokenVault>) -> Self {
        Self { vault }
    }
}

impl Action for Detokenize {
    fn transform(&self, value: &[u8]) -> Result<Vec<u8>, ActionError> {
        let token = std::str::from_utf8(value).map_err(|_| ActionError::InvalidInput {
            action: "detokenize",
            reason: "token is not valid UTF-8",
        })?;
        self.vault.detokenize(token).ok_or(ActionError::UnknownToken)
    }

    fn name(&self) -> &'static str {
        "detokenize"
    }
}
