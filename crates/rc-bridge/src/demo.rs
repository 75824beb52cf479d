//! The demo scene served by the binary.

use std::f64::consts::TAU;

use rc_core::{FunctionDesc, ObjectRef, ParamDesc, PropertyDesc, TypeDesc, Value};
use rc_engine::{Reflection, SceneGraph};
use tracing::warn;

fn linear_color() -> TypeDesc {
    TypeDesc::structure(
        "LinearColor",
        [
            ("R", TypeDesc::Float),
            ("G", TypeDesc::Float),
            ("B", TypeDesc::Float),
            ("A", TypeDesc::Float),
        ],
    )
}

fn white() -> Value {
    Value::map([
        ("R", Value::Float(1.0)),
        ("G", Value::Float(1.0)),
        ("B", Value::Float(1.0)),
        ("A", Value::Float(1.0)),
    ])
}

fn read_f64(scene: &SceneGraph, object: &ObjectRef, property: &str) -> Option<f64> {
    scene.get_property(object, property).ok().and_then(|v| v.as_f64())
}

/// Two point lights, a sun that orbits on every tick, and a camera.
pub fn scene() -> SceneGraph {
    let mut scene = SceneGraph::new();
    let mobility = TypeDesc::enumeration("ComponentMobility", &["Static", "Stationary", "Movable"]);

    for name in ["Light_1", "Light_2"] {
        let _ = scene
            .spawn("PointLight", &format!("/Game/Main.{name}"))
            .property(
                PropertyDesc::new("Intensity", TypeDesc::Float)
                    .with_meta("UIMin", "0")
                    .with_meta("UIMax", "100"),
                Value::Float(8.0),
            )
            .property(PropertyDesc::new("LightColor", linear_color()), white())
            .property(PropertyDesc::new("Mobility", mobility.clone()), Value::from("Movable"))
            .property(PropertyDesc::new("Visible", TypeDesc::Bool), Value::Bool(true))
            .function(
                FunctionDesc {
                    name: "ToggleVisibility".into(),
                    params: Vec::new(),
                    returns: Some(TypeDesc::Bool),
                },
                |scene, object, _| {
                    let visible = scene
                        .get_property(object, "Visible")
                        .map_err(|e| e.to_string())?
                        .as_bool()
                        .unwrap_or(false);
                    scene
                        .write(object, "Visible", Value::Bool(!visible))
                        .map_err(|e| e.to_string())?;
                    Ok(Value::Bool(!visible))
                },
            )
            .finish();
    }

    let sun = scene
        .spawn("DirectionalLight", "/Game/Main.Sun")
        .property(PropertyDesc::new("Angle", TypeDesc::Float), Value::Float(0.0))
        .property(
            PropertyDesc::new("DegreesPerSecond", TypeDesc::Float).with_meta("Units", "deg/s"),
            Value::Float(6.0),
        )
        .property(PropertyDesc::new("Elevation", TypeDesc::Float).read_only(), Value::Float(0.0))
        .finish();
    scene.on_tick(move |scene, dt| {
        let speed = read_f64(scene, &sun, "DegreesPerSecond").unwrap_or_default();
        if speed == 0.0 {
            return;
        }
        let angle = read_f64(scene, &sun, "Angle").unwrap_or_default();
        let next = (angle + speed * dt.as_secs_f64()).rem_euclid(360.0);
        let elevation = (next / 360.0 * TAU).sin() * 90.0;
        if let Err(e) = scene
            .write(&sun, "Angle", Value::Float(next))
            .and_then(|()| scene.write(&sun, "Elevation", Value::Float(elevation)))
        {
            warn!(error = %e, "sun update failed");
        }
    });

    let _ = scene
        .spawn("CineCamera", "/Game/Main.Camera")
        .property(
            PropertyDesc::new("FocalLength", TypeDesc::Float).with_meta("Units", "mm"),
            Value::Float(35.0),
        )
        .property(
            PropertyDesc::new("Tags", TypeDesc::array(TypeDesc::String)),
            Value::Array(vec![Value::from("hero")]),
        )
        .property(PropertyDesc::new("Snapshot", TypeDesc::Bytes), Value::Bytes(Vec::new()))
        .function(
            FunctionDesc {
                name: "Zoom".into(),
                params: vec![ParamDesc::new("Factor", TypeDesc::Float)],
                returns: Some(TypeDesc::Float),
            },
            |scene, object, args| {
                let factor = args.first().and_then(Value::as_f64).unwrap_or(1.0);
                let focal = read_f64(scene, object, "FocalLength").unwrap_or(35.0);
                let next = focal * factor;
                scene
                    .write(object, "FocalLength", Value::Float(next))
                    .map_err(|e| e.to_string())?;
                Ok(Value::Float(next))
            },
        )
        .finish();

    scene
}
