//! In-memory object graph implementing [`Reflection`].
//!
//! Used by the demo binary and throughout the tests. Objects are addressed by
//! engine path (`/Game/Main.Main:Light_1`), hold typed properties, and expose
//! functions backed by closures that may mutate the scene.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use rc_core::{FunctionDesc, ObjectDesc, ObjectRef, PropertyDesc, RcError, Result, Value};
use tracing::{debug, trace};

use crate::reflection::{ChangeHook, EngineEvent, EventSink, HookId, Reflection};

/// Function body: receives the scene, the called object, and checked arguments.
///
/// Returning `Err(reason)` reports an engine-side failure.
pub type SceneFunction =
    Arc<dyn Fn(&mut SceneGraph, &ObjectRef, &[Value]) -> std::result::Result<Value, String> + Send + Sync>;

/// Per-tick behaviour attached to the scene.
pub type TickFn = Box<dyn FnMut(&mut SceneGraph, Duration) + Send>;

struct SceneObject {
    path: String,
    properties: IndexMap<String, (PropertyDesc, Value)>,
    functions: IndexMap<String, (FunctionDesc, SceneFunction)>,
}

struct HookEntry {
    object: u64,
    property: String,
    hook: ChangeHook,
}

/// A mutable graph of reflected objects.
#[derive(Default)]
pub struct SceneGraph {
    objects: HashMap<u64, (ObjectRef, SceneObject)>,
    by_path: HashMap<String, u64>,
    next_id: u64,
    hooks: IndexMap<HookId, HookEntry>,
    next_hook: u64,
    event_sink: Option<EventSink>,
    tick_fns: Vec<TickFn>,
    ticks: u64,
    elapsed: Duration,
}

impl SceneGraph {
    /// Empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start building an object of `class` at `path`.
    pub fn spawn(&mut self, class: &str, path: &str) -> ObjectBuilder<'_> {
        self.next_id += 1;
        let object = ObjectRef::new(class, self.next_id);
        ObjectBuilder {
            scene: self,
            object,
            inner: SceneObject {
                path: path.to_owned(),
                properties: IndexMap::new(),
                functions: IndexMap::new(),
            },
        }
    }

    /// Remove an object. Its hooks are dropped and the event sink is told.
    pub fn destroy(&mut self, object: &ObjectRef) -> Result<()> {
        let Some((_, removed)) = self.objects.remove(&object.id) else {
            return Err(stale(object));
        };
        let _ = self.by_path.remove(&removed.path);
        self.hooks.retain(|_, entry| entry.object != object.id);
        debug!(object = %object, path = %removed.path, "object destroyed");
        if let Some(sink) = &self.event_sink {
            sink(&EngineEvent::ObjectDestroyed(object.clone()));
        }
        Ok(())
    }

    /// Write a property from engine-side code (simulation, function bodies).
    ///
    /// Type-checked against the declaration; fires change hooks.
    pub fn write(&mut self, object: &ObjectRef, property: &str, value: Value) -> Result<()> {
        let ty = {
            let (_, obj) = self.live(object)?;
            let (desc, _) = obj
                .properties
                .get(property)
                .ok_or_else(|| missing_property(object, property))?;
            desc.ty.clone()
        };
        let current = self.get_property(object, property)?;
        let value = ty.coerce(value, Some(&current))?;
        self.store(object, property, value, true)
    }

    /// Run `f` on every tick.
    pub fn on_tick(&mut self, f: impl FnMut(&mut SceneGraph, Duration) + Send + 'static) {
        self.tick_fns.push(Box::new(f));
    }

    /// Number of ticks so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Simulated time so far.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the scene has no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Number of registered change hooks.
    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }

    fn live(&self, object: &ObjectRef) -> Result<&(ObjectRef, SceneObject)> {
        self.objects
            .get(&object.id)
            .filter(|(r, _)| r.class == object.class)
            .ok_or_else(|| stale(object))
    }

    fn store(&mut self, object: &ObjectRef, property: &str, value: Value, notify: bool) -> Result<()> {
        let changed = {
            let entry = self
                .objects
                .get_mut(&object.id)
                .filter(|(r, _)| r.class == object.class)
                .ok_or_else(|| stale(object))?;
            let (_, slot) = entry
                .1
                .properties
                .get_mut(property)
                .ok_or_else(|| missing_property(object, property))?;
            if *slot == value {
                false
            } else {
                *slot = value.clone();
                true
            }
        };
        if changed && notify {
            self.fire(object, property, &value);
        }
        Ok(())
    }

    fn fire(&self, object: &ObjectRef, property: &str, value: &Value) {
        for entry in self.hooks.values() {
            if entry.object == object.id && entry.property == property {
                (entry.hook)(object, property, value);
            }
        }
    }
}

/// Builder returned by [`SceneGraph::spawn`].
pub struct ObjectBuilder<'a> {
    scene: &'a mut SceneGraph,
    object: ObjectRef,
    inner: SceneObject,
}

impl ObjectBuilder<'_> {
    /// Add a property with its initial value.
    #[must_use]
    pub fn property(mut self, desc: PropertyDesc, initial: Value) -> Self {
        let _ = self.inner.properties.insert(desc.name.clone(), (desc, initial));
        self
    }

    /// Add a function.
    #[must_use]
    pub fn function<F>(mut self, desc: FunctionDesc, body: F) -> Self
    where
        F: Fn(&mut SceneGraph, &ObjectRef, &[Value]) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        let _ = self.inner.functions.insert(desc.name.clone(), (desc, Arc::new(body)));
        self
    }

    /// Insert the object and return its reference.
    pub fn finish(self) -> ObjectRef {
        let ObjectBuilder { scene, object, inner } = self;
        let _ = scene.by_path.insert(inner.path.clone(), object.id);
        let _ = scene.objects.insert(object.id, (object.clone(), inner));
        object
    }
}

fn stale(object: &ObjectRef) -> RcError {
    RcError::StaleReference {
        object: object.token(),
    }
}

fn missing_property(object: &ObjectRef, property: &str) -> RcError {
    RcError::NotFound {
        message: format!("property '{property}' not found on {object}"),
        segment: Some(property.to_owned()),
    }
}

impl Reflection for SceneGraph {
    fn resolve_object(&self, id: &str) -> Option<ObjectRef> {
        let oid = self.by_path.get(id)?;
        self.objects.get(oid).map(|(r, _)| r.clone())
    }

    fn is_alive(&self, object: &ObjectRef) -> bool {
        self.live(object).is_ok()
    }

    fn describe(&self, object: &ObjectRef) -> Option<ObjectDesc> {
        let (r, obj) = self.live(object).ok()?;
        Some(ObjectDesc {
            object: r.clone(),
            path: obj.path.clone(),
            properties: obj.properties.values().map(|(d, _)| d.clone()).collect(),
            functions: obj.functions.values().map(|(d, _)| d.clone()).collect(),
        })
    }

    fn get_property(&self, object: &ObjectRef, property: &str) -> Result<Value> {
        let (_, obj) = self.live(object)?;
        obj.properties
            .get(property)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| missing_property(object, property))
    }

    fn set_property(&mut self, object: &ObjectRef, property: &str, value: Value, notify: bool) -> Result<()> {
        {
            let (_, obj) = self.live(object)?;
            let (desc, _) = obj
                .properties
                .get(property)
                .ok_or_else(|| missing_property(object, property))?;
            if !desc.ty.matches(&value) {
                return Err(RcError::type_mismatch(format!(
                    "value for '{property}' does not have type {}",
                    desc.ty
                )));
            }
        }
        self.store(object, property, value, notify)
    }

    fn invoke_function(&mut self, object: &ObjectRef, function: &str, args: Vec<Value>) -> Result<Value> {
        let body = {
            let (_, obj) = self.live(object)?;
            let (_, body) = obj.functions.get(function).ok_or_else(|| RcError::NotFound {
                message: format!("function '{function}' not found on {object}"),
                segment: Some(function.to_owned()),
            })?;
            Arc::clone(body)
        };
        trace!(object = %object, function, "invoking");
        body(self, object, &args).map_err(|message| RcError::InvocationFailed {
            function: function.to_owned(),
            message,
        })
    }

    fn register_change_hook(&mut self, object: &ObjectRef, property: &str, hook: ChangeHook) -> HookId {
        self.next_hook += 1;
        let id = HookId(self.next_hook);
        let _ = self.hooks.insert(
            id,
            HookEntry {
                object: object.id,
                property: property.to_owned(),
                hook,
            },
        );
        id
    }

    fn unregister_change_hook(&mut self, id: HookId) {
        let _ = self.hooks.shift_remove(&id);
    }

    fn set_event_sink(&mut self, sink: EventSink) {
        self.event_sink = Some(sink);
    }

    fn tick(&mut self, dt: Duration) {
        self.ticks += 1;
        self.elapsed += dt;
        let mut fns = std::mem::take(&mut self.tick_fns);
        for f in &mut fns {
            f(self, dt);
        }
        // keep callbacks registered during the tick
        fns.append(&mut self.tick_fns);
        self.tick_fns = fns;
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use parking_lot::Mutex;
    use rc_core::{ParamDesc, TypeDesc};

    fn scene_with_light() -> (SceneGraph, ObjectRef) {
        let mut scene = SceneGraph::new();
        let light = scene
            .spawn("PointLight", "/Game/Main.Main:Light_1")
            .property(PropertyDesc::new("Intensity", TypeDesc::Float), Value::Float(1.0))
            .property(
                PropertyDesc::new("Mobility", TypeDesc::String).read_only(),
                Value::from("Movable"),
            )
            .function(
                FunctionDesc {
                    name: "Double".into(),
                    params: vec![],
                    returns: Some(TypeDesc::Float),
                },
                |scene, this, _| {
                    let v = scene.get_property(this, "Intensity").map_err(|e| e.to_string())?;
                    let doubled = v.as_f64().unwrap_or_default() * 2.0;
                    scene
                        .write(this, "Intensity", Value::Float(doubled))
                        .map_err(|e| e.to_string())?;
                    Ok(Value::Float(doubled))
                },
            )
            .function(
                FunctionDesc {
                    name: "Explode".into(),
                    params: vec![ParamDesc::new("Reason", TypeDesc::String)],
                    returns: None,
                },
                |_, _, args| Err(format!("refused: {}", args[0].as_str().unwrap_or_default())),
            )
            .finish();
        (scene, light)
    }

    #[test]
    fn resolve_by_path() {
        let (scene, light) = scene_with_light();
        assert_eq!(scene.resolve_object("/Game/Main.Main:Light_1"), Some(light));
        assert_eq!(scene.resolve_object("/Game/Main.Main:Light_2"), None);
    }

    #[test]
    fn set_fires_hooks_only_on_change() {
        let (mut scene, light) = scene_with_light();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _ = scene.register_change_hook(
            &light,
            "Intensity",
            Arc::new(move |_, prop, v| sink.lock().push((prop.to_owned(), v.clone()))),
        );
        scene.set_property(&light, "Intensity", Value::Float(2.0), true).unwrap();
        scene.set_property(&light, "Intensity", Value::Float(2.0), true).unwrap();
        assert_eq!(*seen.lock(), vec![("Intensity".to_owned(), Value::Float(2.0))]);
    }

    #[test]
    fn silent_set_skips_hooks() {
        let (mut scene, light) = scene_with_light();
        let count = Arc::new(Mutex::new(0));
        let c = Arc::clone(&count);
        let _ = scene.register_change_hook(&light, "Intensity", Arc::new(move |_, _, _| *c.lock() += 1));
        scene.set_property(&light, "Intensity", Value::Float(3.0), false).unwrap();
        assert_eq!(*count.lock(), 0);
        assert_eq!(scene.get_property(&light, "Intensity").unwrap(), Value::Float(3.0));
    }

    #[test]
    fn set_rejects_wrong_shape() {
        let (mut scene, light) = scene_with_light();
        assert_matches!(
            scene.set_property(&light, "Intensity", Value::from("hot"), true),
            Err(RcError::TypeMismatch { .. })
        );
    }

    #[test]
    fn function_side_effect_fires_hook() {
        let (mut scene, light) = scene_with_light();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _ = scene.register_change_hook(&light, "Intensity", Arc::new(move |_, _, v| sink.lock().push(v.clone())));
        let out = scene.invoke_function(&light, "Double", vec![]).unwrap();
        assert_eq!(out, Value::Float(2.0));
        assert_eq!(*seen.lock(), vec![Value::Float(2.0)]);
    }

    #[test]
    fn function_failure_is_data() {
        let (mut scene, light) = scene_with_light();
        let err = scene
            .invoke_function(&light, "Explode", vec![Value::from("test")])
            .unwrap_err();
        assert_matches!(err, RcError::InvocationFailed { .. });
        assert!(err.to_string().contains("refused: test"));
    }

    #[test]
    fn destroy_makes_refs_stale_and_emits_event() {
        let (mut scene, light) = scene_with_light();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        scene.set_event_sink(Arc::new(move |e| sink.lock().push(e.clone())));
        let _ = scene.register_change_hook(&light, "Intensity", Arc::new(|_, _, _| {}));

        scene.destroy(&light).unwrap();
        assert!(!scene.is_alive(&light));
        assert_eq!(scene.hook_count(), 0);
        assert_eq!(scene.resolve_object("/Game/Main.Main:Light_1"), None);
        assert_matches!(scene.get_property(&light, "Intensity"), Err(RcError::StaleReference { .. }));
        assert_eq!(*events.lock(), vec![EngineEvent::ObjectDestroyed(light.clone())]);
        assert_matches!(scene.destroy(&light), Err(RcError::StaleReference { .. }));
    }

    #[test]
    fn class_mismatch_is_not_alive() {
        let (scene, light) = scene_with_light();
        assert!(!scene.is_alive(&ObjectRef::new("Camera", light.id)));
    }

    #[test]
    fn tick_runs_callbacks() {
        let (mut scene, light) = scene_with_light();
        let target = light.clone();
        scene.on_tick(move |scene, _| {
            let _ = scene.write(&target, "Intensity", Value::Float(scene.ticks() as f64));
        });
        scene.tick(Duration::from_millis(16));
        scene.tick(Duration::from_millis(16));
        assert_eq!(scene.ticks(), 2);
        assert_eq!(scene.elapsed(), Duration::from_millis(32));
        assert_eq!(scene.get_property(&light, "Intensity").unwrap(), Value::Float(2.0));
    }

    #[test]
    fn describe_lists_members() {
        let (scene, light) = scene_with_light();
        let desc = scene.describe(&light).unwrap();
        assert_eq!(desc.path, "/Game/Main.Main:Light_1");
        assert!(desc.property("Mobility").unwrap().read_only);
        assert!(desc.function("Double").is_some());
    }
}
