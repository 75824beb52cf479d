//! CBOR binary format.
//!
//! Decoding is strict: a payload must hold exactly one data item, map keys
//! must be unique text strings, and the only tag understood is
//! [`OBJECT_REF_TAG`].

use std::collections::HashSet;

use ciborium::value::{Integer, Value as CborValue};
use indexmap::IndexMap;

use super::{Diagnostics, child_location, index_location};
use crate::errors::{RcError, Result};
use crate::object_ref::ObjectRef;
use crate::value::Value;

/// Tag wrapping the text token of an object reference.
pub const OBJECT_REF_TAG: u64 = 21_059;

const ROOT: &str = "$";

/// Encode to CBOR bytes.
pub fn encode(value: &Value) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(&to_cbor(value), &mut out)
        .map_err(|e| RcError::internal(format!("cbor encode: {e}")))?;
    Ok(out)
}

/// Decode CBOR bytes, recording precision loss in `diagnostics`.
pub fn decode(bytes: &[u8], diagnostics: &mut Diagnostics) -> Result<Value> {
    let mut reader = bytes;
    let item: CborValue = ciborium::de::from_reader(&mut reader)
        .map_err(|e| RcError::malformed(format!("cbor: {e}")))?;
    if !reader.is_empty() {
        return Err(RcError::malformed(format!(
            "{} trailing byte(s) after CBOR item",
            reader.len()
        )));
    }
    from_cbor_at(item, ROOT, diagnostics)
}

/// Convert to a `ciborium` tree, for embedding in larger CBOR documents.
pub fn to_cbor(value: &Value) -> CborValue {
    match value {
        Value::Null => CborValue::Null,
        Value::Bool(b) => CborValue::Bool(*b),
        Value::Int(i) => CborValue::Integer(Integer::from(*i)),
        Value::Float(f) => CborValue::Float(*f),
        Value::String(s) => CborValue::Text(s.clone()),
        Value::Bytes(b) => CborValue::Bytes(b.clone()),
        Value::Array(items) => CborValue::Array(items.iter().map(to_cbor).collect()),
        Value::Map(entries) => CborValue::Map(
            entries
                .iter()
                .map(|(k, v)| (CborValue::Text(k.clone()), to_cbor(v)))
                .collect(),
        ),
        Value::Object(r) => CborValue::Tag(OBJECT_REF_TAG, Box::new(CborValue::Text(r.token()))),
    }
}

/// Convert from a `ciborium` tree.
pub fn from_cbor(item: CborValue, diagnostics: &mut Diagnostics) -> Result<Value> {
    from_cbor_at(item, ROOT, diagnostics)
}

#[allow(clippy::cast_precision_loss)]
fn from_cbor_at(item: CborValue, at: &str, diagnostics: &mut Diagnostics) -> Result<Value> {
    Ok(match item {
        CborValue::Null => Value::Null,
        CborValue::Bool(b) => Value::Bool(b),
        CborValue::Integer(i) => match i64::try_from(i) {
            Ok(v) => Value::Int(v),
            Err(_) => {
                diagnostics.lossy_numbers.push(at.to_owned());
                Value::Float(i128::from(i) as f64)
            }
        },
        CborValue::Float(f) => Value::Float(f),
        CborValue::Text(s) => Value::String(s),
        CborValue::Bytes(b) => Value::Bytes(b),
        CborValue::Array(items) => Value::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(i, v)| from_cbor_at(v, &index_location(at, i), diagnostics))
                .collect::<Result<_>>()?,
        ),
        CborValue::Map(entries) => {
            let mut seen = HashSet::with_capacity(entries.len());
            let mut out = IndexMap::with_capacity(entries.len());
            for (k, v) in entries {
                let CborValue::Text(key) = k else {
                    return Err(RcError::malformed(format!("non-text map key at '{at}'")));
                };
                if !seen.insert(key.clone()) {
                    return Err(RcError::malformed(format!("duplicate key '{key}' at '{at}'")));
                }
                let child = child_location(at, &key);
                let _ = out.insert(key, from_cbor_at(v, &child, diagnostics)?);
            }
            Value::Map(out)
        }
        CborValue::Tag(OBJECT_REF_TAG, inner) => match *inner {
            CborValue::Text(token) => Value::Object(ObjectRef::parse_token(&token)?),
            _ => {
                return Err(RcError::malformed(format!(
                    "object reference tag at '{at}' must wrap a text token"
                )));
            }
        },
        CborValue::Tag(tag, _) => {
            return Err(RcError::malformed(format!("unsupported CBOR tag {tag} at '{at}'")));
        }
        _ => return Err(RcError::malformed(format!("unsupported CBOR item at '{at}'"))),
    })
}
