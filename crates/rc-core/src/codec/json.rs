//! JSON text format.
//!
//! Strings starting with `@` are reserved for tokens:
//!
//! | Text | Value |
//! |---|---|
//! | `@ref:<Class>:<id>` | [`Value::Object`] |
//! | `@bytes:<base64>` | rejected, blobs are binary-only |
//! | `@@rest` | the literal string `@rest` |
//!
//! Encoding doubles a leading `@` on literal strings, so every string survives
//! a round trip.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use indexmap::IndexMap;
use serde_json::{Map, Number};

use super::{Diagnostics, bytes_in_text, child_location, index_location};
use crate::errors::{RcError, Result};
use crate::object_ref::{ObjectRef, TOKEN_PREFIX};
use crate::value::Value;

/// Prefix marking an inline blob in text payloads.
pub const BYTES_PREFIX: &str = "@bytes:";

const ROOT: &str = "$";

/// Encode to JSON bytes.
pub fn encode(value: &Value) -> Result<Vec<u8>> {
    let json = to_json(value)?;
    serde_json::to_vec(&json).map_err(|e| RcError::internal(format!("json encode: {e}")))
}

/// Decode JSON bytes, recording precision loss in `diagnostics`.
pub fn decode(bytes: &[u8], diagnostics: &mut Diagnostics) -> Result<Value> {
    let json: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| RcError::malformed(e.to_string()))?;
    from_json_at(json, ROOT, diagnostics)
}

/// Convert to a `serde_json` tree, for embedding in larger JSON documents.
pub fn to_json(value: &Value) -> Result<serde_json::Value> {
    to_json_at(value, ROOT)
}

/// Convert from a `serde_json` tree.
pub fn from_json(json: serde_json::Value, diagnostics: &mut Diagnostics) -> Result<Value> {
    from_json_at(json, ROOT, diagnostics)
}

fn to_json_at(value: &Value, at: &str) -> Result<serde_json::Value> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number(Number::from(*i)),
        Value::Float(f) => Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .ok_or_else(|| RcError::malformed(format!("non-finite float {f} at '{at}'")))?,
        Value::String(s) => serde_json::Value::String(escape(s)),
        Value::Bytes(bytes) => return Err(bytes_in_text(at, Some(bytes.len()))),
        Value::Array(items) => serde_json::Value::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, v)| to_json_at(v, &index_location(at, i)))
                .collect::<Result<_>>()?,
        ),
        Value::Map(entries) => {
            let mut map = Map::with_capacity(entries.len());
            for (k, v) in entries {
                let _ = map.insert(k.clone(), to_json_at(v, &child_location(at, k))?);
            }
            serde_json::Value::Object(map)
        }
        Value::Object(r) => serde_json::Value::String(r.token()),
    })
}

#[allow(clippy::cast_precision_loss)]
fn from_json_at(json: serde_json::Value, at: &str, diagnostics: &mut Diagnostics) -> Result<Value> {
    Ok(match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(u) = n.as_u64() {
                diagnostics.lossy_numbers.push(at.to_owned());
                Value::Float(u as f64)
            } else {
                Value::Float(
                    n.as_f64()
                        .ok_or_else(|| RcError::malformed(format!("unrepresentable number at '{at}'")))?,
                )
            }
        }
        serde_json::Value::String(s) => unescape(s, at)?,
        serde_json::Value::Array(items) => Value::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(i, v)| from_json_at(v, &index_location(at, i), diagnostics))
                .collect::<Result<_>>()?,
        ),
        serde_json::Value::Object(map) => {
            let mut out = IndexMap::with_capacity(map.len());
            for (k, v) in map {
                let child = child_location(at, &k);
                let _ = out.insert(k, from_json_at(v, &child, diagnostics)?);
            }
            Value::Map(out)
        }
    })
}

fn escape(s: &str) -> String {
    if s.starts_with('@') {
        format!("@{s}")
    } else {
        s.to_owned()
    }
}

fn unescape(s: String, at: &str) -> Result<Value> {
    if !s.starts_with('@') {
        return Ok(Value::String(s));
    }
    if let Some(rest) = s.strip_prefix('@').filter(|rest| rest.starts_with('@')) {
        return Ok(Value::String(rest.to_owned()));
    }
    if s.starts_with(TOKEN_PREFIX) {
        return ObjectRef::parse_token(&s).map(Value::Object);
    }
    if let Some(encoded) = s.strip_prefix(BYTES_PREFIX) {
        return Err(bytes_in_text(at, STANDARD.decode(encoded).ok().map(|b| b.len())));
    }
    // unknown '@' prefixes are kept verbatim so hand-edited files stay readable
    Ok(Value::String(s))
}
