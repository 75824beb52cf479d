//! Reflected type descriptors and the shape check applied before mutation.
//!
//! Coercion rules, applied by [`TypeDesc::coerce`]:
//!
//! - `Int` is widened to `Float`
//! - a `Float` with no fractional part is narrowed to `Int`
//! - `Null` is accepted for object references (clears the reference)
//! - enum values are variant names; an in-range integer index is accepted too
//! - struct values may be partial maps, merged over the current value;
//!   unknown members are rejected
//!
//! Anything else must match exactly. Coercion builds a new value and never
//! touches the current one, so a failed check leaves nothing half-applied.

use std::fmt;

use indexmap::IndexMap;

use crate::errors::{RcError, Result};
use crate::object_ref::ObjectRef;
use crate::path::Segment;
use crate::value::Value;

/// Declared type of a property, struct member, or parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeDesc {
    /// Boolean.
    Bool,
    /// 64-bit integer.
    Int,
    /// 64-bit float.
    Float,
    /// String.
    String,
    /// Binary blob.
    Bytes,
    /// Named enumeration; values travel as variant names.
    Enum {
        /// Enum type name.
        name: String,
        /// Variant names in declaration order.
        variants: Vec<String>,
    },
    /// Named struct with ordered members.
    Struct {
        /// Struct type name.
        name: String,
        /// `(member name, member type)` in declaration order.
        fields: Vec<(String, TypeDesc)>,
    },
    /// Homogeneous array.
    Array(Box<TypeDesc>),
    /// String-keyed map with homogeneous values.
    Map(Box<TypeDesc>),
    /// Object reference of the given class (`Object` accepts any class).
    Object {
        /// Expected class.
        class: String,
    },
}

impl TypeDesc {
    /// Struct descriptor from `(name, type)` pairs.
    pub fn structure<N: Into<String>>(name: &str, fields: impl IntoIterator<Item = (N, TypeDesc)>) -> Self {
        Self::Struct {
            name: name.to_owned(),
            fields: fields.into_iter().map(|(n, t)| (n.into(), t)).collect(),
        }
    }

    /// Enum descriptor.
    pub fn enumeration(name: &str, variants: &[&str]) -> Self {
        Self::Enum {
            name: name.to_owned(),
            variants: variants.iter().map(|v| (*v).to_owned()).collect(),
        }
    }

    /// Array descriptor.
    pub fn array(element: TypeDesc) -> Self {
        Self::Array(Box::new(element))
    }

    /// Map descriptor.
    pub fn map(value: TypeDesc) -> Self {
        Self::Map(Box::new(value))
    }

    /// Object reference descriptor.
    pub fn object(class: &str) -> Self {
        Self::Object {
            class: class.to_owned(),
        }
    }

    /// Zero value of this type.
    pub fn default_value(&self) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            Self::Int => Value::Int(0),
            Self::Float => Value::Float(0.0),
            Self::String => Value::String(String::new()),
            Self::Bytes => Value::Bytes(Vec::new()),
            Self::Enum { variants, .. } => variants
                .first()
                .map_or(Value::Null, |v| Value::String(v.clone())),
            Self::Struct { fields, .. } => Value::Map(
                fields
                    .iter()
                    .map(|(n, t)| (n.clone(), t.default_value()))
                    .collect(),
            ),
            Self::Array(_) => Value::Array(Vec::new()),
            Self::Map(_) => Value::Map(IndexMap::new()),
            Self::Object { .. } => Value::Null,
        }
    }

    /// Type of the slot addressed by `segments` below a value of this type.
    ///
    /// Returns the index of the first segment that does not apply on failure.
    pub fn at(&self, segments: &[Segment]) -> std::result::Result<&TypeDesc, usize> {
        let mut current = self;
        for (i, segment) in segments.iter().enumerate() {
            current = match (current, segment) {
                (Self::Struct { fields, .. }, Segment::Field(name) | Segment::Key(name)) => {
                    match fields.iter().find(|(n, _)| n == name) {
                        Some((_, t)) => t,
                        None => return Err(i),
                    }
                }
                (Self::Array(element), Segment::Index(_)) => element,
                (Self::Map(value), Segment::Key(_) | Segment::Field(_)) => value,
                _ => return Err(i),
            };
        }
        Ok(current)
    }

    /// Validate `incoming` against this type, producing the value to store.
    ///
    /// `current` is the value presently held (used to merge partial structs).
    pub fn coerce(&self, incoming: Value, current: Option<&Value>) -> Result<Value> {
        coerce_at(self, incoming, current, "")
    }

    /// Whether `value` already has exactly this shape (no coercion needed).
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Bool, Value::Bool(_))
            | (Self::Int, Value::Int(_))
            | (Self::Float, Value::Float(_))
            | (Self::String, Value::String(_))
            | (Self::Bytes, Value::Bytes(_))
            | (Self::Object { .. }, Value::Null) => true,
            (Self::Enum { variants, .. }, Value::String(s)) => variants.contains(s),
            (Self::Struct { fields, .. }, Value::Map(map)) => {
                map.len() == fields.len()
                    && fields
                        .iter()
                        .all(|(n, t)| map.get(n).is_some_and(|v| t.matches(v)))
            }
            (Self::Array(element), Value::Array(items)) => items.iter().all(|v| element.matches(v)),
            (Self::Map(inner), Value::Map(map)) => map.values().all(|v| inner.matches(v)),
            (Self::Object { class }, Value::Object(r)) => class_accepts(class, r),
            _ => false,
        }
    }

    /// Structured description for `describe` responses.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Bool | Self::Int | Self::Float | Self::String | Self::Bytes => {
                Value::map([("kind", Value::from(self.to_string()))])
            }
            Self::Enum { name, variants } => Value::map([
                ("kind", Value::from("enum")),
                ("name", Value::from(name.as_str())),
                (
                    "variants",
                    Value::Array(variants.iter().map(|v| Value::from(v.as_str())).collect()),
                ),
            ]),
            Self::Struct { name, fields } => Value::map([
                ("kind", Value::from("struct")),
                ("name", Value::from(name.as_str())),
                (
                    "fields",
                    Value::Array(
                        fields
                            .iter()
                            .map(|(n, t)| {
                                Value::map([("name", Value::from(n.as_str())), ("type", t.to_value())])
                            })
                            .collect(),
                    ),
                ),
            ]),
            Self::Array(element) => {
                Value::map([("kind", Value::from("array")), ("element", element.to_value())])
            }
            Self::Map(value) => {
                Value::map([("kind", Value::from("map")), ("value", value.to_value())])
            }
            Self::Object { class } => Value::map([
                ("kind", Value::from("object")),
                ("class", Value::from(class.as_str())),
            ]),
        }
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::String => f.write_str("string"),
            Self::Bytes => f.write_str("bytes"),
            Self::Enum { name, .. } => write!(f, "enum {name}"),
            Self::Struct { name, .. } => write!(f, "struct {name}"),
            Self::Array(element) => write!(f, "array<{element}>"),
            Self::Map(value) => write!(f, "map<{value}>"),
            Self::Object { class } => write!(f, "object {class}"),
        }
    }
}

fn class_accepts(expected: &str, r: &ObjectRef) -> bool {
    expected.is_empty() || expected == "Object" || expected == r.class
}

fn mismatch(ty: &TypeDesc, found: &Value, at: &str) -> RcError {
    if at.is_empty() {
        RcError::type_mismatch(format!("expected {ty}, found {}", found.kind()))
    } else {
        RcError::type_mismatch(format!("expected {ty} at '{at}', found {}", found.kind()))
    }
}

fn child(at: &str, name: &str) -> String {
    if at.is_empty() {
        name.to_owned()
    } else {
        format!("{at}.{name}")
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn coerce_at(ty: &TypeDesc, incoming: Value, current: Option<&Value>, at: &str) -> Result<Value> {
    match (ty, incoming) {
        (TypeDesc::Bool, v @ Value::Bool(_))
        | (TypeDesc::Int, v @ Value::Int(_))
        | (TypeDesc::Float, v @ Value::Float(_))
        | (TypeDesc::String, v @ Value::String(_))
        | (TypeDesc::Bytes, v @ Value::Bytes(_))
        | (TypeDesc::Object { .. }, v @ Value::Null) => Ok(v),

        (TypeDesc::Float, Value::Int(i)) => Ok(Value::Float(i as f64)),
        (TypeDesc::Int, Value::Float(f))
            if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 =>
        {
            Ok(Value::Int(f as i64))
        }

        (TypeDesc::Enum { name, variants }, Value::String(s)) => {
            if variants.contains(&s) {
                Ok(Value::String(s))
            } else {
                Err(RcError::type_mismatch(format!(
                    "'{s}' is not a variant of enum {name}{}",
                    if at.is_empty() { String::new() } else { format!(" at '{at}'") }
                )))
            }
        }
        (TypeDesc::Enum { name, variants }, Value::Int(i)) => usize::try_from(i)
            .ok()
            .and_then(|idx| variants.get(idx))
            .map(|v| Value::String(v.clone()))
            .ok_or_else(|| RcError::type_mismatch(format!("{i} is out of range for enum {name}"))),

        (TypeDesc::Struct { name, fields }, Value::Map(patch)) => {
            let mut merged: IndexMap<String, Value> = match current {
                Some(Value::Map(existing)) => existing.clone(),
                _ => IndexMap::new(),
            };
            // unknown members first, so nothing is coerced for a rejected patch
            if let Some(unknown) = patch.keys().find(|k| !fields.iter().any(|(n, _)| n == *k)) {
                return Err(RcError::type_mismatch(format!(
                    "struct {name} has no member '{unknown}'"
                )));
            }
            let mut patch = patch;
            let mut out = IndexMap::with_capacity(fields.len());
            for (field, field_ty) in fields {
                let existing = merged.swap_remove(field);
                let value = match patch.swap_remove(field) {
                    Some(v) => coerce_at(field_ty, v, existing.as_ref(), &child(at, field))?,
                    None => existing.unwrap_or_else(|| field_ty.default_value()),
                };
                let _ = out.insert(field.clone(), value);
            }
            Ok(Value::Map(out))
        }

        (TypeDesc::Array(element), Value::Array(items)) => {
            let existing = current.and_then(Value::as_array);
            items
                .into_iter()
                .enumerate()
                .map(|(i, v)| {
                    let prev = existing.and_then(|e| e.get(i));
                    coerce_at(element, v, prev, &format!("{at}[{i}]"))
                })
                .collect::<Result<Vec<_>>>()
                .map(Value::Array)
        }

        (TypeDesc::Map(inner), Value::Map(entries)) => {
            let existing = current.and_then(Value::as_map);
            entries
                .into_iter()
                .map(|(k, v)| {
                    let prev = existing.and_then(|e| e.get(&k));
                    let coerced = coerce_at(inner, v, prev, &format!("{at}[\"{k}\"]"))?;
                    Ok((k, coerced))
                })
                .collect::<Result<IndexMap<_, _>>>()
                .map(Value::Map)
        }

        (TypeDesc::Object { class }, Value::Object(r)) => {
            if class_accepts(class, &r) {
                Ok(Value::Object(r))
            } else {
                Err(RcError::type_mismatch(format!(
                    "expected object {class}, found object {}",
                    r.class
                )))
            }
        }

        (ty, other) => Err(mismatch(ty, &other, at)),
    }
}

/// Reflected property.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyDesc {
    /// Property name.
    pub name: String,
    /// Declared type.
    pub ty: TypeDesc,
    /// Whether writes are refused.
    pub read_only: bool,
    /// Free-form engine metadata (display name, units, clamp range).
    pub metadata: IndexMap<String, String>,
}

impl PropertyDesc {
    /// Writable property without metadata.
    pub fn new(name: impl Into<String>, ty: TypeDesc) -> Self {
        Self {
            name: name.into(),
            ty,
            read_only: false,
            metadata: IndexMap::new(),
        }
    }

    /// Mark read-only.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Attach a metadata entry.
    #[must_use]
    pub fn with_meta(mut self, key: &str, value: &str) -> Self {
        let _ = self.metadata.insert(key.to_owned(), value.to_owned());
        self
    }

    /// Description for `describe` responses.
    pub fn to_value(&self) -> Value {
        Value::map([
            ("name", Value::from(self.name.as_str())),
            ("type", self.ty.to_value()),
            ("readOnly", Value::Bool(self.read_only)),
            (
                "metadata",
                Value::Map(
                    self.metadata
                        .iter()
                        .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
                        .collect(),
                ),
            ),
        ])
    }
}

/// Function parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamDesc {
    /// Parameter name.
    pub name: String,
    /// Declared type.
    pub ty: TypeDesc,
}

impl ParamDesc {
    /// Create a parameter.
    pub fn new(name: impl Into<String>, ty: TypeDesc) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Reflected function signature.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDesc {
    /// Function name.
    pub name: String,
    /// Positional parameters.
    pub params: Vec<ParamDesc>,
    /// Return type, `None` for procedures.
    pub returns: Option<TypeDesc>,
}

impl FunctionDesc {
    /// Check arity and coerce each argument positionally.
    ///
    /// Runs before the function is called, so a mismatch means no side effect.
    pub fn coerce_args(&self, args: Vec<Value>) -> Result<Vec<Value>> {
        if args.len() != self.params.len() {
            return Err(RcError::type_mismatch(format!(
                "function '{}' takes {} argument(s), got {}",
                self.name,
                self.params.len(),
                args.len()
            )));
        }
        self.params
            .iter()
            .zip(args)
            .map(|(param, arg)| {
                coerce_at(&param.ty, arg, None, &param.name)
            })
            .collect()
    }

    /// Description for `describe` responses.
    pub fn to_value(&self) -> Value {
        Value::map([
            ("name", Value::from(self.name.as_str())),
            (
                "params",
                Value::Array(
                    self.params
                        .iter()
                        .map(|p| Value::map([("name", Value::from(p.name.as_str())), ("type", p.ty.to_value())]))
                        .collect(),
                ),
            ),
            ("returns", self.returns.as_ref().map_or(Value::Null, TypeDesc::to_value)),
        ])
    }
}

/// Everything the reflection layer reports about one object.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectDesc {
    /// The object itself.
    pub object: ObjectRef,
    /// Engine path (`/Game/Main.Main:Light_1`).
    pub path: String,
    /// Reflected properties.
    pub properties: Vec<PropertyDesc>,
    /// Reflected functions.
    pub functions: Vec<FunctionDesc>,
}

impl ObjectDesc {
    /// Property by name.
    pub fn property(&self, name: &str) -> Option<&PropertyDesc> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Function by name.
    pub fn function(&self, name: &str) -> Option<&FunctionDesc> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Description for `describe` responses.
    pub fn to_value(&self) -> Value {
        Value::map([
            ("object", Value::Object(self.object.clone())),
            ("class", Value::from(self.object.class.as_str())),
            ("path", Value::from(self.path.as_str())),
            (
                "properties",
                Value::Array(self.properties.iter().map(PropertyDesc::to_value).collect()),
            ),
            (
                "functions",
                Value::Array(self.functions.iter().map(FunctionDesc::to_value).collect()),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn color_ty() -> TypeDesc {
        TypeDesc::structure(
            "LinearColor",
            [
                ("R", TypeDesc::Float),
                ("G", TypeDesc::Float),
                ("B", TypeDesc::Float),
            ],
        )
    }

    fn color(r: f64, g: f64, b: f64) -> Value {
        Value::map([
            ("R", Value::Float(r)),
            ("G", Value::Float(g)),
            ("B", Value::Float(b)),
        ])
    }

    #[test]
    fn exact_scalars_pass_through() {
        assert_eq!(TypeDesc::Bool.coerce(Value::Bool(true), None).unwrap(), Value::Bool(true));
        assert_eq!(TypeDesc::String.coerce("x".into(), None).unwrap(), Value::from("x"));
    }

    #[test]
    fn int_widens_to_float() {
        assert_eq!(TypeDesc::Float.coerce(Value::Int(3), None).unwrap(), Value::Float(3.0));
    }

    #[test]
    fn whole_float_narrows_to_int() {
        assert_eq!(TypeDesc::Int.coerce(Value::Float(4.0), None).unwrap(), Value::Int(4));
        assert_matches!(
            TypeDesc::Int.coerce(Value::Float(4.5), None),
            Err(RcError::TypeMismatch { .. })
        );
    }

    #[test]
    fn string_is_not_a_number() {
        let err = TypeDesc::Float.coerce("2.5".into(), None).unwrap_err();
        assert_matches!(err, RcError::TypeMismatch { .. });
        assert!(err.to_string().contains("expected float"));
    }

    #[test]
    fn null_clears_object() {
        assert_eq!(
            TypeDesc::object("Actor").coerce(Value::Null, None).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn object_class_checked() {
        let ty = TypeDesc::object("Camera");
        assert!(ty.coerce(ObjectRef::new("Camera", 1).into(), None).is_ok());
        assert_matches!(
            ty.coerce(ObjectRef::new("PointLight", 1).into(), None),
            Err(RcError::TypeMismatch { .. })
        );
        assert!(TypeDesc::object("Object")
            .coerce(ObjectRef::new("PointLight", 1).into(), None)
            .is_ok());
    }

    #[test]
    fn enum_by_name_or_index() {
        let ty = TypeDesc::enumeration("Mobility", &["Static", "Stationary", "Movable"]);
        assert_eq!(ty.coerce("Movable".into(), None).unwrap(), Value::from("Movable"));
        assert_eq!(ty.coerce(Value::Int(1), None).unwrap(), Value::from("Stationary"));
        assert!(ty.coerce("Flying".into(), None).is_err());
        assert!(ty.coerce(Value::Int(3), None).is_err());
    }

    #[test]
    fn partial_struct_merges_over_current() {
        let current = color(1.0, 1.0, 1.0);
        let patch = Value::map([("G", Value::Int(0))]);
        let merged = color_ty().coerce(patch, Some(&current)).unwrap();
        assert_eq!(merged, color(1.0, 0.0, 1.0));
    }

    #[test]
    fn partial_struct_without_current_fills_defaults() {
        let patch = Value::map([("B", Value::Float(0.5))]);
        assert_eq!(color_ty().coerce(patch, None).unwrap(), color(0.0, 0.0, 0.5));
    }

    #[test]
    fn unknown_struct_member_rejected() {
        let patch = Value::map([("A", Value::Float(1.0))]);
        let err = color_ty().coerce(patch, None).unwrap_err();
        assert!(err.to_string().contains("no member 'A'"));
    }

    #[test]
    fn nested_mismatch_names_location() {
        let ty = TypeDesc::array(color_ty());
        let bad = Value::Array(vec![color(0.0, 0.0, 0.0), Value::map([("R", "red".into())])]);
        let err = ty.coerce(bad, None).unwrap_err();
        assert!(err.to_string().contains("[1].R"), "{err}");
    }

    #[test]
    fn at_navigates_types() {
        let ty = TypeDesc::structure("S", [("Colors", TypeDesc::array(color_ty()))]);
        let segs = [
            Segment::Field("Colors".into()),
            Segment::Index(0),
            Segment::Field("G".into()),
        ];
        assert_eq!(ty.at(&segs), Ok(&TypeDesc::Float));
        assert_eq!(ty.at(&[Segment::Field("Nope".into())]), Err(0));
        assert_eq!(ty.at(&[Segment::Field("Colors".into()), Segment::Field("X".into())]), Err(1));
    }

    #[test]
    fn matches_is_exact() {
        assert!(color_ty().matches(&color(0.0, 0.0, 0.0)));
        assert!(!color_ty().matches(&Value::map([("R", Value::Float(0.0))])));
        assert!(!TypeDesc::Float.matches(&Value::Int(1)));
    }

    #[test]
    fn arity_checked_before_types() {
        let f = FunctionDesc {
            name: "SetBrightness".into(),
            params: vec![ParamDesc::new("Value", TypeDesc::Float)],
            returns: None,
        };
        let err = f.coerce_args(vec![]).unwrap_err();
        assert!(err.to_string().contains("takes 1 argument(s), got 0"));
        assert_eq!(f.coerce_args(vec![Value::Int(2)]).unwrap(), vec![Value::Float(2.0)]);
    }

    #[test]
    fn describe_value_shape() {
        let desc = ObjectDesc {
            object: ObjectRef::new("PointLight", 3),
            path: "/Game/Main.Main:Light_1".into(),
            properties: vec![PropertyDesc::new("Intensity", TypeDesc::Float).with_meta("Units", "cd")],
            functions: vec![],
        };
        let v = desc.to_value();
        assert_eq!(v.get("class"), Some(&Value::from("PointLight")));
        let props = v.get("properties").and_then(Value::as_array).unwrap();
        assert_eq!(props[0].get("name"), Some(&Value::from("Intensity")));
        assert_eq!(
            props[0].get("type").and_then(|t| t.get("kind")),
            Some(&Value::from("float"))
        );
    }
}
