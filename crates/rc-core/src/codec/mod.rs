//! Wire codec: [`Value`] to and from CBOR and JSON.
//!
//! Both formats are lossless for every value kind they can carry. `Bytes` is
//! binary-only: it fails with [`RcError::UnsupportedInTextFormat`] in JSON.
//! Object references travel as a stable token (`@ref:<Class>:<id>` in JSON, a
//! tagged text string in CBOR), never as an inline object body.

pub mod cbor;
pub mod json;

use std::fmt;

use crate::errors::{RcError, Result};
use crate::value::Value;

pub use cbor::OBJECT_REF_TAG;

/// Wire format of a payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum WireFormat {
    /// JSON text.
    #[default]
    Json,
    /// CBOR binary.
    Cbor,
}

impl WireFormat {
    /// MIME type.
    pub fn mime(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Cbor => "application/cbor",
        }
    }

    /// Format named by a `Content-Type` or `Accept` header value.
    ///
    /// Parameters (`; charset=utf-8`) are ignored. Unknown types yield `None`.
    pub fn from_mime(header: &str) -> Option<Self> {
        let essence = header.split(';').next().unwrap_or_default().trim();
        if essence.eq_ignore_ascii_case("application/cbor") {
            Some(Self::Cbor)
        } else if essence.eq_ignore_ascii_case("application/json")
            || essence.eq_ignore_ascii_case("text/json")
        {
            Some(Self::Json)
        } else {
            None
        }
    }

    /// Whether the format is textual.
    pub fn is_text(self) -> bool {
        matches!(self, Self::Json)
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Cbor => "cbor",
        })
    }
}

/// Side information collected while decoding.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Diagnostics {
    /// Locations (`$.a[2]`) of integers that did not fit in i64 and were
    /// decoded as floats.
    pub lossy_numbers: Vec<String>,
}

impl Diagnostics {
    /// Whether any precision was lost.
    pub fn is_lossy(&self) -> bool {
        !self.lossy_numbers.is_empty()
    }
}

/// Encoding seam used by the notification path.
///
/// The subscription manager holds an `Arc<dyn ValueEncoder>` so tests can
/// count encode calls.
pub trait ValueEncoder: Send + Sync {
    /// Encode `value` in `format`.
    fn encode(&self, value: &Value, format: WireFormat) -> Result<Vec<u8>>;
}

/// The production codec.
#[derive(Clone, Copy, Debug, Default)]
pub struct WireCodec;

impl WireCodec {
    /// Encode a value.
    pub fn encode(value: &Value, format: WireFormat) -> Result<Vec<u8>> {
        match format {
            WireFormat::Json => json::encode(value),
            WireFormat::Cbor => cbor::encode(value),
        }
    }

    /// Decode a value, discarding diagnostics.
    pub fn decode(bytes: &[u8], format: WireFormat) -> Result<Value> {
        Self::decode_with_diagnostics(bytes, format).map(|(v, _)| v)
    }

    /// Decode a value and report any precision loss.
    pub fn decode_with_diagnostics(bytes: &[u8], format: WireFormat) -> Result<(Value, Diagnostics)> {
        let mut diagnostics = Diagnostics::default();
        let value = match format {
            WireFormat::Json => json::decode(bytes, &mut diagnostics)?,
            WireFormat::Cbor => cbor::decode(bytes, &mut diagnostics)?,
        };
        if diagnostics.is_lossy() {
            tracing::debug!(
                format = %format,
                locations = ?diagnostics.lossy_numbers,
                "integer precision lost while decoding"
            );
        }
        Ok((value, diagnostics))
    }
}

impl ValueEncoder for WireCodec {
    fn encode(&self, value: &Value, format: WireFormat) -> Result<Vec<u8>> {
        Self::encode(value, format)
    }
}

pub(crate) fn child_location(parent: &str, key: &str) -> String {
    format!("{parent}.{key}")
}

pub(crate) fn index_location(parent: &str, index: usize) -> String {
    format!("{parent}[{index}]")
}

pub(crate) fn bytes_in_text(location: &str, len: Option<usize>) -> RcError {
    let size = len.map_or_else(String::new, |n| format!(" of {n} bytes"));
    RcError::UnsupportedInTextFormat {
        message: format!("binary blob{size} at '{location}' requires the binary wire format"),
    }
}
