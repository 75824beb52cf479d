//! Path resolution: address string to typed handle.
//!
//! An address is `ObjectIdentifier.member[.sub|[i]|[key]]*`. The object
//! identifier is an engine path, which may contain dots, or an object token
//! (`@ref:<Class>:<id>`). Every split between identifier and member path is
//! tried; exactly one must resolve.
//!
//! Preset aliases (`<preset>.<field>[.sub…]`) are consulted first. When an
//! address matches a preset field, the engine interpretation is not tried.
//!
//! All functions here read live engine state and must run on the engine thread.

use rc_core::path::split_candidates;
use rc_core::{FieldPath, FunctionDesc, ObjectRef, RcError, Result, Segment, TypeDesc};

use crate::reflection::Reflection;

/// Source of preset-scoped aliases.
pub trait AliasSource: Send + Sync {
    /// Engine address bound to `field` in `preset`, if both exist.
    fn alias(&self, preset: &str, field: &str) -> Option<String>;
}

/// Alias source with no presets.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoAliases;

impl AliasSource for NoAliases {
    fn alias(&self, _preset: &str, _field: &str) -> Option<String> {
        None
    }
}

/// A resolved property, possibly below the top level.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyHandle {
    /// Owning object.
    pub object: ObjectRef,
    /// Top-level property name.
    pub property: String,
    /// Path below the top-level property.
    pub segments: Vec<Segment>,
    /// Declared type of the addressed slot.
    pub ty: TypeDesc,
    /// Declared type of the top-level property.
    pub property_ty: TypeDesc,
    /// Whether the top-level property refuses writes.
    pub read_only: bool,
}

impl PropertyHandle {
    /// Member path relative to the object.
    pub fn field_path(&self) -> FieldPath {
        self.segments
            .iter()
            .cloned()
            .fold(FieldPath::member(self.property.clone()), FieldPath::join)
    }
}

/// A resolved function.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionHandle {
    /// Owning object.
    pub object: ObjectRef,
    /// Signature.
    pub function: FunctionDesc,
}

/// Outcome of resolving an address.
#[derive(Clone, Debug, PartialEq)]
pub enum Handle {
    /// Property or nested slot.
    Property(PropertyHandle),
    /// Callable function.
    Function(FunctionHandle),
}

impl Handle {
    /// Owning object.
    pub fn object(&self) -> &ObjectRef {
        match self {
            Self::Property(p) => &p.object,
            Self::Function(f) => &f.object,
        }
    }

    /// Require a property.
    pub fn into_property(self) -> Result<PropertyHandle> {
        match self {
            Self::Property(p) => Ok(p),
            Self::Function(f) => Err(RcError::type_mismatch(format!(
                "'{}' is a function, not a property",
                f.function.name
            ))),
        }
    }

    /// Require a function.
    pub fn into_function(self) -> Result<FunctionHandle> {
        match self {
            Self::Function(f) => Ok(f),
            Self::Property(p) => Err(RcError::type_mismatch(format!(
                "'{}' is a property, not a function",
                p.field_path()
            ))),
        }
    }

    /// Append nested segments below this handle.
    pub fn descend(self, nested: &[Segment]) -> Result<Self> {
        if nested.is_empty() {
            return Ok(self);
        }
        match self {
            Self::Property(mut p) => {
                let ty = p.ty.at(nested).map_err(|i| no_member(&p.field_path().to_string(), &nested[i]))?;
                p.ty = ty.clone();
                p.segments.extend(nested.iter().cloned());
                Ok(Self::Property(p))
            }
            Self::Function(f) => Err(no_member(&f.function.name, &nested[0])),
        }
    }
}

/// Resolve an address, preset aliases first.
pub fn resolve(engine: &dyn Reflection, aliases: &dyn AliasSource, address: &str) -> Result<Handle> {
    let hits: Vec<_> = split_candidates(address)
        .into_iter()
        .filter_map(|(preset, field)| {
            aliases
                .alias(preset, field.root())
                .map(|bound| (preset, field, bound))
        })
        .collect();

    match hits.as_slice() {
        [] => resolve_engine_path(engine, address),
        [(_, field, bound)] => resolve_engine_path(engine, bound)?.descend(field.nested()),
        many => Err(RcError::Ambiguous {
            path: address.to_owned(),
            candidates: many
                .iter()
                .map(|(preset, field, _)| format!("preset '{preset}' field '{}'", field.root()))
                .collect(),
        }),
    }
}

/// Resolve an address against the engine only.
pub fn resolve_engine_path(engine: &dyn Reflection, address: &str) -> Result<Handle> {
    let splits = split_candidates(address);
    if splits.is_empty() {
        return Err(unsplittable(address));
    }

    let mut matches = Vec::new();
    let mut failure = None;
    let mut bad_token = None;
    for (object_id, field) in &splits {
        // a token prefix cut inside its class name does not parse; a later split may
        let object = match lookup_object(engine, object_id) {
            Ok(Some(object)) => object,
            Ok(None) => continue,
            Err(e @ RcError::Malformed { .. }) => {
                bad_token = Some(e);
                continue;
            }
            Err(e) => {
                failure = Some(e);
                continue;
            }
        };
        match resolve_member(engine, &object, field) {
            Ok(handle) => matches.push((*object_id, field, handle)),
            // splits are shortest-first, so this keeps the longest object prefix
            Err(e) => failure = Some(e),
        }
    }

    match matches.len() {
        1 => Ok(matches.remove(0).2),
        0 => Err(failure.or(bad_token).unwrap_or_else(|| {
            let longest = splits.last().map_or(address, |(o, _)| *o);
            RcError::NotFound {
                message: format!("no object found for '{address}'"),
                segment: Some(longest.to_owned()),
            }
        })),
        _ => Err(RcError::Ambiguous {
            path: address.to_owned(),
            candidates: matches
                .iter()
                .map(|(object_id, field, _)| format!("{object_id} | {field}"))
                .collect(),
        }),
    }
}

/// Error for an address with no usable object/field split: the parse error
/// of its field part, or `NotFound` when it has no field part at all.
fn unsplittable(address: &str) -> RcError {
    let first_dot = address.char_indices().skip(1).find(|&(_, c)| c == '.');
    match first_dot.map(|(i, _)| FieldPath::parse(&address[i + 1..])) {
        Some(Err(e)) => e,
        _ => RcError::NotFound {
            message: format!("'{address}' does not name an object member"),
            segment: Some(address.to_owned()),
        },
    }
}

/// Resolve an object identifier (engine path or object token).
pub fn resolve_object(engine: &dyn Reflection, id: &str) -> Result<ObjectRef> {
    lookup_object(engine, id)?.ok_or_else(|| RcError::NotFound {
        message: format!("object '{id}' not found"),
        segment: Some(id.to_owned()),
    })
}

/// Resolve a member path on a known object.
pub fn resolve_member(engine: &dyn Reflection, object: &ObjectRef, field: &FieldPath) -> Result<Handle> {
    let desc = engine.describe(object).ok_or_else(|| RcError::StaleReference {
        object: object.token(),
    })?;

    if let Some(prop) = desc.property(field.root()) {
        let handle = Handle::Property(PropertyHandle {
            object: object.clone(),
            property: prop.name.clone(),
            segments: Vec::new(),
            ty: prop.ty.clone(),
            property_ty: prop.ty.clone(),
            read_only: prop.read_only,
        });
        return handle.descend(field.nested());
    }
    if let Some(function) = desc.function(field.root()) {
        let handle = Handle::Function(FunctionHandle {
            object: object.clone(),
            function: function.clone(),
        });
        return handle.descend(field.nested());
    }
    Err(RcError::NotFound {
        message: format!("'{}' is not a property or function of {}", field.root(), desc.path),
        segment: Some(field.root().to_owned()),
    })
}

/// `Ok(None)` when nothing is called `id`; `Err(StaleReference)` for a dead token.
fn lookup_object(engine: &dyn Reflection, id: &str) -> Result<Option<ObjectRef>> {
    if id.starts_with(rc_core::object_ref::TOKEN_PREFIX) {
        let object = ObjectRef::parse_token(id)?;
        return if engine.is_alive(&object) {
            Ok(Some(object))
        } else {
            Err(RcError::StaleReference { object: object.token() })
        };
    }
    Ok(engine.resolve_object(id))
}

fn no_member(parent: &str, segment: &Segment) -> RcError {
    let label = match segment {
        Segment::Field(name) => name.clone(),
        other => other.to_string(),
    };
    RcError::NotFound {
        message: format!("'{parent}' has no member {label}"),
        segment: Some(label),
    }
}
