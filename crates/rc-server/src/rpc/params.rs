//! Typed access to request parameters.

use rc_core::{RcError, Result, Value};

/// Maximum length of a string parameter (paths, names).
pub const MAX_PARAM_LENGTH: usize = 8_192;

/// Request parameters: a map, or nothing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params(Value);

impl Params {
    /// Wrap decoded parameters. Anything but a map or `Null` is rejected.
    pub fn new(value: Value) -> Result<Self> {
        match value {
            Value::Map(_) | Value::Null => Ok(Self(value)),
            other => Err(RcError::invalid_request(format!(
                "params must be a map, got {}",
                other.kind()
            ))),
        }
    }

    /// Build from `(key, value)` pairs.
    pub fn from_pairs<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self(Value::map(pairs))
    }

    /// Raw value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    /// Required string, bounded by [`MAX_PARAM_LENGTH`].
    pub fn str(&self, key: &str) -> Result<String> {
        self.opt_str(key)?
            .ok_or_else(|| RcError::invalid_request(format!("missing '{key}'")))
    }

    /// Optional string.
    pub fn opt_str(&self, key: &str) -> Result<Option<String>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => {
                validate_string_param(s, key, MAX_PARAM_LENGTH)?;
                Ok(Some(s.clone()))
            }
            Some(other) => Err(RcError::invalid_request(format!(
                "'{key}' must be a string, got {}",
                other.kind()
            ))),
        }
    }

    /// Required value of any kind.
    pub fn value(&self, key: &str) -> Result<Value> {
        // an explicit null is a valid value to write
        self.0
            .get(key)
            .cloned()
            .ok_or_else(|| RcError::invalid_request(format!("missing '{key}'")))
    }

    /// Positional arguments; absent means none.
    pub fn args(&self, key: &str) -> Result<Vec<Value>> {
        match self.get(key) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items.clone()),
            Some(other) => Err(RcError::invalid_request(format!(
                "'{key}' must be an array, got {}",
                other.kind()
            ))),
        }
    }

    /// Required number.
    pub fn f64(&self, key: &str) -> Result<f64> {
        match self.get(key) {
            Some(v) => v.as_f64().ok_or_else(|| {
                RcError::invalid_request(format!("'{key}' must be a number, got {}", v.kind()))
            }),
            None => Err(RcError::invalid_request(format!("missing '{key}'"))),
        }
    }

    /// Optional non-negative integer.
    pub fn opt_u64(&self, key: &str) -> Result<Option<u64>> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_i64()
                .and_then(|n| u64::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| RcError::invalid_request(format!("'{key}' must be a non-negative integer"))),
        }
    }

    /// Flag, `false` when absent.
    pub fn flag(&self, key: &str) -> Result<bool> {
        match self.get(key) {
            None => Ok(false),
            Some(v) => v
                .as_bool()
                .ok_or_else(|| RcError::invalid_request(format!("'{key}' must be a boolean"))),
        }
    }
}

/// Reject a string parameter longer than `max_len` bytes.
pub fn validate_string_param(value: &str, name: &str, max_len: usize) -> Result<()> {
    if value.len() > max_len {
        return Err(RcError::invalid_request(format!(
            "parameter '{name}' exceeds maximum length ({} > {max_len})",
            value.len()
        )));
    }
    Ok(())
}
