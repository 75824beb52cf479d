//! Engine-independent value model.

use std::fmt;

use indexmap::IndexMap;

use crate::object_ref::ObjectRef;
use crate::path::Segment;

/// Tagged union carried by every read, write, invocation, and notification.
///
/// Maps keep insertion order so decoded payloads re-encode in the same order;
/// order is not semantically significant.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    /// Absence of a value (also clears object references).
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Binary blob (image pixels, thumbnails). Binary format only.
    Bytes(Vec<u8>),
    /// Ordered sequence.
    Array(Vec<Value>),
    /// String-keyed map, insertion ordered.
    Map(IndexMap<String, Value>),
    /// Reference to a live engine object.
    Object(ObjectRef),
}

/// Discriminant of a [`Value`], used in diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// `Value::Null`
    Null,
    /// `Value::Bool`
    Bool,
    /// `Value::Int`
    Int,
    /// `Value::Float`
    Float,
    /// `Value::String`
    String,
    /// `Value::Bytes`
    Bytes,
    /// `Value::Array`
    Array,
    /// `Value::Map`
    Map,
    /// `Value::Object`
    Object,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Bytes => "bytes",
            Self::Array => "array",
            Self::Map => "map",
            Self::Object => "object",
        };
        f.write_str(name)
    }
}

impl Value {
    /// Kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::String(_) => ValueKind::String,
            Self::Bytes(_) => ValueKind::Bytes,
            Self::Array(_) => ValueKind::Array,
            Self::Map(_) => ValueKind::Map,
            Self::Object(_) => ValueKind::Object,
        }
    }

    /// Build a map value from `(key, value)` pairs, keeping their order.
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Whether this is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Boolean content.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer content.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric content, widening integers.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// String content.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Array content.
    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Map content.
    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Object reference content.
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(r) => Some(r),
            _ => None,
        }
    }

    /// Member lookup on a map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Walk nested members/elements.
    pub fn at(&self, segments: &[Segment]) -> Option<&Value> {
        let mut current = self;
        for segment in segments {
            current = match (segment, current) {
                (Segment::Field(name) | Segment::Key(name), Self::Map(map)) => map.get(name)?,
                (Segment::Index(i), Self::Array(items)) => items.get(*i)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Mutable variant of [`Value::at`].
    pub fn at_mut(&mut self, segments: &[Segment]) -> Option<&mut Value> {
        let mut current = self;
        for segment in segments {
            current = match (segment, current) {
                (Segment::Field(name) | Segment::Key(name), Self::Map(map)) => {
                    map.get_mut(name)?
                }
                (Segment::Index(i), Self::Array(items)) => items.get_mut(*i)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Array(items)
    }
}

impl From<ObjectRef> for Value {
    fn from(r: ObjectRef) -> Self {
        Self::Object(r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color() -> Value {
        Value::map([
            ("R", Value::Float(1.0)),
            ("G", Value::Float(0.5)),
            ("B", Value::Float(0.0)),
        ])
    }

    #[test]
    fn kind_of_each_variant() {
        assert_eq!(Value::Null.kind(), ValueKind::Null);
        assert_eq!(Value::from(true).kind(), ValueKind::Bool);
        assert_eq!(Value::from(3_i64).kind(), ValueKind::Int);
        assert_eq!(Value::from(2.5).kind(), ValueKind::Float);
        assert_eq!(Value::from("x").kind(), ValueKind::String);
        assert_eq!(Value::from(vec![1_u8]).kind(), ValueKind::Bytes);
        assert_eq!(Value::Array(vec![]).kind(), ValueKind::Array);
        assert_eq!(color().kind(), ValueKind::Map);
        assert_eq!(
            Value::from(ObjectRef::new("Actor", 1)).kind(),
            ValueKind::Object
        );
    }

    #[test]
    fn map_preserves_order() {
        let keys: Vec<_> = color().as_map().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["R", "G", "B"]);
    }

    #[test]
    fn as_f64_widens_int() {
        assert_eq!(Value::Int(4).as_f64(), Some(4.0));
        assert_eq!(Value::Float(0.25).as_f64(), Some(0.25));
        assert_eq!(Value::from("4").as_f64(), None);
    }

    #[test]
    fn at_walks_nested_segments() {
        let v = Value::map([(
            "Lights",
            Value::Array(vec![Value::Null, color()]),
        )]);
        let segments = vec![
            Segment::Field("Lights".into()),
            Segment::Index(1),
            Segment::Field("G".into()),
        ];
        assert_eq!(v.at(&segments), Some(&Value::Float(0.5)));
    }

    #[test]
    fn at_returns_none_on_shape_mismatch() {
        let v = color();
        assert!(v.at(&[Segment::Index(0)]).is_none());
        assert!(v.at(&[Segment::Field("A".into())]).is_none());
    }

    #[test]
    fn at_mut_patches_in_place() {
        let mut v = color();
        *v.at_mut(&[Segment::Field("B".into())]).unwrap() = Value::Float(1.0);
        assert_eq!(v.get("B"), Some(&Value::Float(1.0)));
        assert_eq!(v.get("R"), Some(&Value::Float(1.0)));
    }

    #[test]
    fn empty_segments_return_self() {
        let v = Value::Int(1);
        assert_eq!(v.at(&[]), Some(&Value::Int(1)));
    }
}
