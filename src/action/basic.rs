//! Stateless actions.

use crate::action::{Action, ActionError};

/// Appends a literal suffix to the value.
#[derive(Debug, Clone)]
pub struct Append {
    suffix: String,
}

impl Append {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }
}

impl Action for Append {
    fn transform(&self, value: &[u8]) -> Result<Vec<u8>, ActionError> {
        let mut out = Vec::with_capacity(value.len() + self.suffix.len());
        out.extend_from_slice(value);
        out.extend_from_slice(self.suffix.as_bytes());
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "append"
    }
}

/// Replaces every character but the last `keep_last` with `mask_char`.
#[derive(Debug, Clone)]
pub struct Mask {
    mask_char: char,
    keep_last: usize,
}

impl Mask {
    pub fn new(mask_char: char, keep_last: usize) -> Self {
        Self {
            mask_char,
            keep_last,
        }
    }
}

impl Action for Mask {
    fn transform(&self, value: &[u8]) -> Result<Vec<u8>, ActionError> {
        let text = std::str::from_utf8(value).map_err(|_| ActionError::InvalidInput {
            action: "mask",
            reason: "value is not valid UTF-8",
        })?;

        let total = text.chars().count();
        let masked_len = total.saturating_sub(self.keep_last);
        let masked: String = text
            .chars()
            .enumerate()
            .map(|(i, c)| if i < masked_len { self.mask_char } else { c })
            .collect();
        Ok(masked.into_bytes())
    }

    fn name(&self) -> &'static str {
        "mask"
    }
}

/// Identity action.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Action for Passthrough {
    fn transform(&self, value: &[u8]) -> Result<Vec<u8>, ActionError> {
        Ok(value.to_vec())
    }

    fn name(&self) -> &'static str {
        "passthrough"
    }
}
