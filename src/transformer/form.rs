//! `application/x-www-form-urlencoded` rewriting.
//!
//! The body is walked segment by segment (`&`-separated). Segments whose
//! decoded key is configured get their value replaced; every other segment,
//! including its original escaping, is copied unchanged and in order.

use bytes::{BufMut, Bytes, BytesMut};
use url::form_urlencoded;

use crate::action::{Action, FieldList};
use crate::transformer::{ProtocolError, TransformError};

/// Rewrite the configured fields of a urlencoded body.
///
/// Every occurrence of a configured key is transformed. Configured keys that
/// do not appear in the body are not added.
pub fn rewrite(body: &[u8], fields: &FieldList, action: &dyn Action) -> Result<Bytes, TransformError> {
    let mut out = BytesMut::with_capacity(body.len());

    for (i, segment) in body.split(|b| *b == b'&').enumerate() {
        if i > 0 {
            out.put_u8(b'&');
        }

        let (raw_key, raw_value) = match segment.iter().position(|b| *b == b'=') {
            Some(eq) => (&segment[..eq], &segment[eq + 1..]),
            None => (segment, &segment[segment.len()..]),
        };
        let key = decode(raw_key)?;
        let value = decode(raw_value)?;

        let configured = std::str::from_utf8(&key).is_ok_and(|k| !k.is_empty() && fields.contains(k));
        if !configured {
            out.extend_from_slice(segment);
            continue;
        }

        let transformed = action.transform(&value)?;
        out.extend_from_slice(raw_key);
        out.put_u8(b'=');
        for chunk in form_urlencoded::byte_serialize(&transformed) {
            out.extend_from_slice(chunk.as_bytes());
        }
    }

    Ok(out.freeze())
}

/// Percent-decode one key or value (`+` is a space).
fn decode(raw: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        match raw[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let hi = raw.get(i + 1).and_then(|b| hex(*b));
                let lo = raw.get(i + 2).and_then(|b| hex(*b));
                match (hi, lo) {
                    (Some(hi), Some(lo)) => out.push(hi << 4 | lo),
                    _ => return Err(ProtocolError::MalformedForm("invalid percent-encoding")),
                }
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }
    Ok(out)
}

fn hex(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
