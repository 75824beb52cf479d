//! Operations on resolved handles.
//!
//! Runs inside engine jobs. Every operation re-checks that the target object
//! is alive, because a handle may outlive its object.

use rc_core::{ObjectRef, RcError, Result, Value};
use tracing::{debug, trace};

use crate::reflection::Reflection;
use crate::resolver::{FunctionHandle, Handle, PropertyHandle};

/// Options for a write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ModifyFlags {
    /// Do not fire change hooks for this write.
    pub skip_change_events: bool,
}

impl ModifyFlags {
    /// Flags for a silent write.
    pub fn silent() -> Self {
        Self {
            skip_change_events: true,
        }
    }
}

/// A command against a resolved handle.
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    /// Read the current value.
    Get,
    /// Write a value.
    Set {
        /// New value, coerced to the declared type before writing.
        value: Value,
        /// Write options.
        flags: ModifyFlags,
    },
    /// Call a function.
    Invoke {
        /// Positional arguments.
        args: Vec<Value>,
    },
    /// Describe the owning object.
    Describe,
}

impl Operation {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set { .. } => "set",
            Self::Invoke { .. } => "invoke",
            Self::Describe => "describe",
        }
    }
}

/// Apply `op` to `handle`.
///
/// `Set` returns `Null`; `Get` and `Invoke` return the value; `Describe` the
/// object description.
pub fn execute(engine: &mut dyn Reflection, handle: &Handle, op: Operation) -> Result<Value> {
    trace!(object = %handle.object(), op = op.name(), "executing");
    match (handle, op) {
        (Handle::Property(p), Operation::Get) => get(engine, p),
        (Handle::Property(p), Operation::Set { value, flags }) => set(engine, p, value, flags).map(|()| Value::Null),
        (Handle::Function(f), Operation::Invoke { args }) => invoke(engine, f, args),
        (handle, Operation::Describe) => describe(engine, handle.object()),
        (Handle::Function(f), op) => Err(RcError::type_mismatch(format!(
            "cannot {} function '{}'",
            op.name(),
            f.function.name
        ))),
        (Handle::Property(p), Operation::Invoke { .. }) => Err(RcError::type_mismatch(format!(
            "'{}' is a property, not a function",
            p.field_path()
        ))),
    }
}

/// Read the value at a property handle.
pub fn get(engine: &dyn Reflection, handle: &PropertyHandle) -> Result<Value> {
    ensure_alive(engine, &handle.object)?;
    let top = engine.get_property(&handle.object, &handle.property)?;
    if handle.segments.is_empty() {
        return Ok(top);
    }
    top.at(&handle.segments).cloned().ok_or_else(|| missing_slot(handle))
}

/// Write the value at a property handle.
///
/// Nested writes read the enclosing top-level value, patch the addressed slot,
/// and write the whole value back, so sibling members are kept.
pub fn set(engine: &mut dyn Reflection, handle: &PropertyHandle, value: Value, flags: ModifyFlags) -> Result<()> {
    ensure_alive(engine, &handle.object)?;
    if handle.read_only {
        return Err(RcError::ReadOnly {
            property: handle.property.clone(),
        });
    }

    let current = engine.get_property(&handle.object, &handle.property)?;
    let next = if handle.segments.is_empty() {
        handle.ty.coerce(value, Some(&current))?
    } else {
        let mut whole = current;
        let slot = whole.at_mut(&handle.segments).ok_or_else(|| missing_slot(handle))?;
        *slot = handle.ty.coerce(value, Some(&*slot))?;
        whole
    };

    engine.set_property(&handle.object, &handle.property, next, !flags.skip_change_events)?;
    debug!(
        object = %handle.object,
        path = %handle.field_path(),
        silent = flags.skip_change_events,
        "property written"
    );
    Ok(())
}

/// Call the function at a function handle.
///
/// Arguments are checked before the engine is touched.
pub fn invoke(engine: &mut dyn Reflection, handle: &FunctionHandle, args: Vec<Value>) -> Result<Value> {
    ensure_alive(engine, &handle.object)?;
    let args = handle.function.coerce_args(args)?;
    let result = engine.invoke_function(&handle.object, &handle.function.name, args)?;
    debug!(object = %handle.object, function = %handle.function.name, "function invoked");
    Ok(result)
}

/// Describe a live object.
pub fn describe(engine: &dyn Reflection, object: &ObjectRef) -> Result<Value> {
    engine
        .describe(object)
        .map(|desc| desc.to_value())
        .ok_or_else(|| RcError::StaleReference { object: object.token() })
}

fn ensure_alive(engine: &dyn Reflection, object: &ObjectRef) -> Result<()> {
    if engine.is_alive(object) {
        Ok(())
    } else {
        Err(RcError::StaleReference { object: object.token() })
    }
}

fn missing_slot(handle: &PropertyHandle) -> RcError {
    // the declared type allowed the path, so the value is missing an element or key
    let segment = handle.segments.last().map(ToString::to_string);
    RcError::NotFound {
        message: format!("'{}' has no value at this position", handle.field_path()),
        segment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::resolve_engine_path;
    use crate::scene::SceneGraph;
    use assert_matches::assert_matches;
    use parking_lot::Mutex;
    use rc_core::{FunctionDesc, ParamDesc, PropertyDesc, TypeDesc};
    use std::sync::Arc;

    const LIGHT: &str = "/Game/Main.Main:Light_1";

    fn color_ty() -> TypeDesc {
        TypeDesc::structure(
            "LinearColor",
            [("R", TypeDesc::Float), ("G", TypeDesc::Float), ("B", TypeDesc::Float)],
        )
    }

    fn scene() -> (SceneGraph, ObjectRef) {
        let mut scene = SceneGraph::new();
        let light = scene
            .spawn("PointLight", LIGHT)
            .property(PropertyDesc::new("Intensity", TypeDesc::Float), Value::Float(1.0))
            .property(
                PropertyDesc::new("LightColor", color_ty()),
                Value::map([("R", Value::Float(0.1)), ("G", Value::Float(0.2)), ("B", Value::Float(0.3))]),
            )
            .property(PropertyDesc::new("Mobility", TypeDesc::String).read_only(), "Movable".into())
            .property(
                PropertyDesc::new("Tags", TypeDesc::array(TypeDesc::String)),
                Value::Array(vec!["a".into()]),
            )
            .function(
                FunctionDesc {
                    name: "SetIntensity".into(),
                    params: vec![ParamDesc::new("Value", TypeDesc::Float)],
                    returns: None,
                },
                |scene, object, args| {
                    scene
                        .write(object, "Intensity", args[0].clone())
                        .map(|()| Value::Null)
                        .map_err(|e| e.to_string())
                },
            )
            .function(
                FunctionDesc {
                    name: "Explode".into(),
                    params: vec![],
                    returns: None,
                },
                |_, _, _| Err("fuse missing".into()),
            )
            .finish();
        (scene, light)
    }

    fn handle(scene: &SceneGraph, member: &str) -> Handle {
        resolve_engine_path(scene, &format!("{LIGHT}.{member}")).unwrap()
    }

    fn set_op(value: Value) -> Operation {
        Operation::Set {
            value,
            flags: ModifyFlags::default(),
        }
    }

    #[test]
    fn read_after_write() {
        let (mut scene, _) = scene();
        let h = handle(&scene, "Intensity");
        let _ = execute(&mut scene, &h, set_op(Value::Float(5000.0))).unwrap();
        assert_eq!(execute(&mut scene, &h, Operation::Get).unwrap(), Value::Float(5000.0));
    }

    #[test]
    fn int_written_to_float_property() {
        let (mut scene, _) = scene();
        let h = handle(&scene, "Intensity");
        let _ = execute(&mut scene, &h, set_op(Value::Int(3))).unwrap();
        assert_eq!(execute(&mut scene, &h, Operation::Get).unwrap(), Value::Float(3.0));
    }

    #[test]
    fn nested_write_keeps_siblings() {
        let (mut scene, _) = scene();
        let g = handle(&scene, "LightColor.G");
        let _ = execute(&mut scene, &g, set_op(Value::Float(0.9))).unwrap();

        let h = handle(&scene, "LightColor");

        let whole = execute(&mut scene, &h, Operation::Get).unwrap();
        assert_eq!(whole.get("R"), Some(&Value::Float(0.1)));
        assert_eq!(whole.get("G"), Some(&Value::Float(0.9)));
        assert_eq!(whole.get("B"), Some(&Value::Float(0.3)));
    }

    #[test]
    fn partial_struct_write_merges() {
        let (mut scene, _) = scene();
        let h = handle(&scene, "LightColor");
        let _ = execute(&mut scene, &h, set_op(Value::map([("B", Value::Float(1.0))]))).unwrap();
        let whole = execute(&mut scene, &h, Operation::Get).unwrap();
        assert_eq!(whole.get("R"), Some(&Value::Float(0.1)));
        assert_eq!(whole.get("B"), Some(&Value::Float(1.0)));
    }

    #[test]
    fn type_mismatch_leaves_value() {
        let (mut scene, _) = scene();
        let h = handle(&scene, "Intensity");
        let err = execute(&mut scene, &h, set_op("bright".into())).unwrap_err();
        assert_matches!(err, RcError::TypeMismatch { .. });
        assert_eq!(execute(&mut scene, &h, Operation::Get).unwrap(), Value::Float(1.0));
    }

    #[test]
    fn read_only_rejected_and_unchanged() {
        let (mut scene, _) = scene();
        let h = handle(&scene, "Mobility");
        let err = execute(&mut scene, &h, set_op("Static".into())).unwrap_err();
        assert_matches!(err, RcError::ReadOnly { property } if property == "Mobility");
        assert_eq!(execute(&mut scene, &h, Operation::Get).unwrap(), Value::from("Movable"));
    }

    #[test]
    fn out_of_range_index_not_found() {
        let (mut scene, _) = scene();
        let h = handle(&scene, "Tags[4]");
        assert_matches!(execute(&mut scene, &h, Operation::Get), Err(RcError::NotFound { .. }));
        assert_matches!(
            execute(&mut scene, &h, set_op("x".into())),
            Err(RcError::NotFound { .. })
        );
    }

    #[test]
    fn stale_handle_rejected() {
        let (mut scene, light) = scene();
        let h = handle(&scene, "Intensity");
        scene.destroy(&light).unwrap();
        assert_matches!(execute(&mut scene, &h, Operation::Get), Err(RcError::StaleReference { .. }));
        assert_matches!(
            execute(&mut scene, &h, set_op(Value::Float(2.0))),
            Err(RcError::StaleReference { .. })
        );
        assert_matches!(execute(&mut scene, &h, Operation::Describe), Err(RcError::StaleReference { .. }));
    }

    #[test]
    fn invoke_with_side_effect() {
        let (mut scene, _) = scene();
        let f = handle(&scene, "SetIntensity");
        let out = execute(&mut scene, &f, Operation::Invoke { args: vec![Value::Int(42)] }).unwrap();
        assert_eq!(out, Value::Null);
        let h = handle(&scene, "Intensity");
        let v = execute(&mut scene, &h, Operation::Get).unwrap();
        assert_eq!(v, Value::Float(42.0));
    }

    #[test]
    fn wrong_arity_has_no_side_effect() {
        let (mut scene, light) = scene();
        let fired = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&fired);
        let _ = scene.register_change_hook(&light, "Intensity", Arc::new(move |_, _, _| *counter.lock() += 1));

        let f = handle(&scene, "SetIntensity");
        let err = execute(&mut scene, &f, Operation::Invoke { args: vec![] }).unwrap_err();
        assert_matches!(err, RcError::TypeMismatch { .. });
        assert!(err.to_string().contains("takes 1 argument(s), got 0"));
        assert_eq!(*fired.lock(), 0);
    }

    #[test]
    fn invocation_failure_reported() {
        let (mut scene, _) = scene();
        let f = handle(&scene, "Explode");
        let err = execute(&mut scene, &f, Operation::Invoke { args: vec![] }).unwrap_err();
        assert_matches!(err, RcError::InvocationFailed { message, .. } if message == "fuse missing");
    }

    #[test]
    fn silent_write_skips_hooks() {
        let (mut scene, light) = scene();
        let fired = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&fired);
        let _ = scene.register_change_hook(&light, "Intensity", Arc::new(move |_, _, _| *counter.lock() += 1));

        let h = handle(&scene, "Intensity");
        let silent = Operation::Set {
            value: Value::Float(7.0),
            flags: ModifyFlags::silent(),
        };
        let _ = execute(&mut scene, &h, silent).unwrap();
        assert_eq!(*fired.lock(), 0);
        let _ = execute(&mut scene, &h, set_op(Value::Float(8.0))).unwrap();
        assert_eq!(*fired.lock(), 1);
    }

    #[test]
    fn describe_lists_members() {
        let (mut scene, light) = scene();
        let h = handle(&scene, "Intensity");
        let desc = execute(&mut scene, &h, Operation::Describe).unwrap();
        assert_eq!(desc.get("object"), Some(&Value::Object(light)));
        assert_eq!(desc.get("properties").and_then(Value::as_array).map(Vec::len), Some(4));
    }

    #[test]
    fn mismatched_operation_rejected() {
        let (mut scene, _) = scene();
        let f = handle(&scene, "Explode");
        assert_matches!(execute(&mut scene, &f, Operation::Get), Err(RcError::TypeMismatch { .. }));
        let p = handle(&scene, "Intensity");
        assert_matches!(
            execute(&mut scene, &p, Operation::Invoke { args: vec![] }),
            Err(RcError::TypeMismatch { .. })
        );
    }
}
