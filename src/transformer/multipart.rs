//! `multipart/form-data` rewriting.
//!
//! # Layout
//! ```text
//! preamble
//! --boundary[padding]CRLF      ← delimiter line, copied as-is
//! header block CRLF CRLF       ← copied as-is
//! content                      ← transformed when the form name is configured
//! CRLF--boundary[padding]CRLF
//! ...
//! CRLF--boundary--epilogue     ← copied as-is
//! ```
//!
//! The original boundary token is reused, so an unmodified body is
//! reproduced byte-for-byte.

use bytes::{Bytes, BytesMut};

use crate::action::{Action, FieldList};
use crate::transformer::{ProtocolError, TransformError};

const CRLF: &[u8] = b"\r\n";

/// One part of a multipart body, as slices of the original bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPart<'a> {
    /// `--boundary`, any transport padding and the CRLF.
    pub delimiter: &'a [u8],
    /// Header lines including the blank line that ends them.
    pub headers: &'a [u8],
    pub content: &'a [u8],
}

impl RawPart<'_> {
    /// The `name` parameter of a `form-data` Content-Disposition header.
    pub fn form_name(&self) -> Option<String> {
        let text = std::str::from_utf8(self.headers).ok()?;
        text.split("\r\n").find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if !name.trim().eq_ignore_ascii_case("content-disposition") {
                return None;
            }
            disposition_name(value)
        })
    }
}

/// A parsed multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartBody<'a> {
    pub preamble: &'a [u8],
    pub parts: Vec<RawPart<'a>>,
    /// Everything from the closing `--boundary--` on.
    pub closing: &'a [u8],
}

/// Split a body into its parts without copying.
pub fn parse<'a>(body: &'a [u8], boundary: &str) -> Result<MultipartBody<'a>, ProtocolError> {
    let dash_boundary = [b"--".as_slice(), boundary.as_bytes()].concat();
    let delimiter = [CRLF, dash_boundary.as_slice()].concat();

    let start = if body.starts_with(&dash_boundary) {
        0
    } else {
        find(body, &delimiter, 0)
            .map(|i| i + CRLF.len())
            .ok_or(ProtocolError::MalformedMultipart("opening boundary not found"))?
    };

    let preamble = &body[..start];
    let mut parts = Vec::new();
    let mut line_start = start;

    loop {
        let after_boundary = line_start + dash_boundary.len();
        if body[after_boundary..].starts_with(b"--") {
            return Ok(MultipartBody {
                preamble,
                parts,
                closing: &body[line_start..],
            });
        }

        let padding = body[after_boundary..]
            .iter()
            .take_while(|b| **b == b' ' || **b == b'\t')
            .count();
        let line_end = after_boundary + padding;
        if !body[line_end..].starts_with(CRLF) {
            return Err(ProtocolError::MalformedMultipart("boundary line not terminated"));
        }
        let part_start = line_end + CRLF.len();

        let next = find(body, &delimiter, part_start)
            .ok_or(ProtocolError::MalformedMultipart("part is not terminated by a boundary"))?;
        let part = &body[part_start..next];

        let header_len = if part.starts_with(CRLF) {
            CRLF.len()
        } else {
            find(part, b"\r\n\r\n", 0)
                .map(|i| i + 4)
                .ok_or(ProtocolError::MalformedMultipart("part headers not terminated"))?
        };

        parts.push(RawPart {
            delimiter: &body[line_start..part_start],
            headers: &part[..header_len],
            content: &part[header_len..],
        });

        line_start = next + CRLF.len();
    }
}

/// Rewrite the content of every part whose form name is configured.
pub fn rewrite(
    body: &[u8],
    boundary: &str,
    fields: &FieldList,
    action: &dyn Action,
) -> Result<Bytes, TransformError> {
    let parsed = parse(body, boundary)?;

    let mut out = BytesMut::with_capacity(body.len());
    out.extend_from_slice(parsed.preamble);
    for part in &parsed.parts {
        out.extend_from_slice(part.delimiter);
        out.extend_from_slice(part.headers);

        let configured = part.form_name().is_some_and(|name| fields.contains(&name));
        if configured {
            out.extend_from_slice(&action.transform(part.content)?);
        } else {
            out.extend_from_slice(part.content);
        }
        out.extend_from_slice(CRLF);
    }
    out.extend_from_slice(parsed.closing);

    Ok(out.freeze())
}

fn disposition_name(value: &str) -> Option<String> {
    let mut params = value.split(';');
    let disposition = params.next()?.trim();
    if !disposition.eq_ignore_ascii_case("form-data") {
        return None;
    }
    params.find_map(|param| {
        let (key, raw) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("name") {
            return None;
        }
        let raw = raw.trim();
        Some(match raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
            Some(quoted) => quoted.replace("\\\"", "\"").replace("\\\\", "\\"),
            None => raw.to_string(),
        })
    })
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}
