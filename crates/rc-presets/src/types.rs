//! Preset data types.

use indexmap::IndexMap;
use rc_core::{PresetId, Value};
use serde::{Deserialize, Serialize};

/// What an exposed field points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    /// A property or nested property slot.
    Property,
    /// A callable function.
    Function,
}

impl FieldKind {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Property => "property",
            Self::Function => "function",
        }
    }
}

/// One `input -> output` point of a range mapping.
#[derive(Clone, Debug, PartialEq)]
pub struct RangePoint {
    /// Protocol-side input.
    pub input: f64,
    /// Value written to the property at that input.
    pub output: Value,
}

impl RangePoint {
    /// Create a point.
    pub fn new(input: f64, output: impl Into<Value>) -> Self {
        Self {
            input,
            output: output.into(),
        }
    }
}

/// A client-facing field bound to an engine path.
#[derive(Clone, Debug, PartialEq)]
pub struct PresetField {
    /// Field name, unique within the preset.
    pub name: String,
    /// Bound engine address.
    pub path: String,
    /// Property or function.
    pub kind: FieldKind,
    /// Free-form metadata (display name, units, ...).
    pub metadata: IndexMap<String, String>,
    /// Protocol range mapping; empty when unmapped.
    pub range: Vec<RangePoint>,
}

impl PresetField {
    pub(crate) fn new(name: &str, path: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_owned(),
            path: path.to_owned(),
            kind,
            metadata: IndexMap::new(),
            range: Vec::new(),
        }
    }

    /// Description for responses.
    pub fn to_value(&self) -> Value {
        Value::map([
            ("name", Value::from(self.name.as_str())),
            ("path", Value::from(self.path.as_str())),
            ("kind", Value::from(self.kind.as_str())),
            (
                "metadata",
                Value::Map(
                    self.metadata
                        .iter()
                        .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
                        .collect(),
                ),
            ),
            (
                "range",
                Value::Array(
                    self.range
                        .iter()
                        .map(|p| Value::map([("input", Value::Float(p.input)), ("output", p.output.clone())]))
                        .collect(),
                ),
            ),
        ])
    }
}

/// Listing entry for a preset.
#[derive(Clone, Debug, PartialEq)]
pub struct PresetSummary {
    /// Preset ID.
    pub id: PresetId,
    /// Unique preset name.
    pub name: String,
    /// Number of exposed fields.
    pub field_count: usize,
}

impl PresetSummary {
    /// Description for responses.
    pub fn to_value(&self) -> Value {
        Value::map([
            ("id", Value::from(self.id.as_str())),
            ("name", Value::from(self.name.as_str())),
            ("fieldCount", Value::Int(i64::try_from(self.field_count).unwrap_or(i64::MAX))),
        ])
    }
}

/// What changed in a preset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresetChange {
    /// Preset created.
    Created,
    /// Preset deleted.
    Deleted,
    /// Field added.
    FieldBound,
    /// Field pointed at a new path.
    FieldRebound,
    /// Field removed.
    FieldUnbound,
    /// Field metadata edited.
    MetadataChanged,
    /// Field range mapping edited.
    RangeChanged,
}

impl PresetChange {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Deleted => "deleted",
            Self::FieldBound => "fieldBound",
            Self::FieldRebound => "fieldRebound",
            Self::FieldUnbound => "fieldUnbound",
            Self::MetadataChanged => "metadataChanged",
            Self::RangeChanged => "rangeChanged",
        }
    }
}

/// Registry notification, published as the `preset.modified` event.
#[derive(Clone, Debug, PartialEq)]
pub struct PresetEvent {
    /// Preset ID.
    pub id: PresetId,
    /// Preset name.
    pub name: String,
    /// What changed.
    pub change: PresetChange,
    /// Affected field, for field-level changes.
    pub field: Option<String>,
}

impl PresetEvent {
    /// Event kind on the wire.
    pub const KIND: &'static str = "preset.modified";

    /// Event payload.
    pub fn payload(&self) -> Value {
        let mut entries = vec![
            ("presetId", Value::from(self.id.as_str())),
            ("preset", Value::from(self.name.as_str())),
            ("change", Value::from(self.change.as_str())),
        ];
        if let Some(field) = &self.field {
            entries.push(("field", Value::from(field.as_str())));
        }
        Value::map(entries)
    }
}
