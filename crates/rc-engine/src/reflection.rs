//! The engine reflection capability.
//!
//! Everything behind [`Reflection`] is owned by the engine thread. The bridge
//! never calls it from anywhere else; see [`crate::EngineContext`].

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rc_core::{ObjectDesc, ObjectRef, Result, Value};

/// Identifier of a registered change hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HookId(pub u64);

impl fmt::Display for HookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hook-{}", self.0)
    }
}

/// Callback fired on the engine thread after a watched property changes.
///
/// Receives the object, the top-level property name, and its new value.
pub type ChangeHook = Arc<dyn Fn(&ObjectRef, &str, &Value) + Send + Sync>;

/// Engine-wide occurrences that are not property changes.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    /// An object was destroyed. References to it are now stale.
    ObjectDestroyed(ObjectRef),
}

impl EngineEvent {
    /// Wire name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ObjectDestroyed(_) => "object.destroyed",
        }
    }

    /// Event payload.
    pub fn payload(&self) -> Value {
        match self {
            Self::ObjectDestroyed(object) => Value::map([("object", Value::Object(object.clone()))]),
        }
    }
}

/// Listener for [`EngineEvent`]s, called on the engine thread.
pub type EventSink = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

/// Access to a live object graph by name.
///
/// Implementations report engine-side function failures as
/// [`rc_core::RcError::InvocationFailed`] and operations on destroyed objects as
/// [`rc_core::RcError::StaleReference`].
pub trait Reflection: Send + 'static {
    /// Look up an object by engine path.
    fn resolve_object(&self, id: &str) -> Option<ObjectRef>;

    /// Whether the object still exists.
    fn is_alive(&self, object: &ObjectRef) -> bool;

    /// Reflected properties and functions of a live object.
    fn describe(&self, object: &ObjectRef) -> Option<ObjectDesc>;

    /// Read a top-level property.
    fn get_property(&self, object: &ObjectRef, property: &str) -> Result<Value>;

    /// Write a top-level property.
    ///
    /// The value has already been checked against the declared type. With
    /// `notify` unset, change hooks are not fired for this write.
    fn set_property(&mut self, object: &ObjectRef, property: &str, value: Value, notify: bool) -> Result<()>;

    /// Call a function with already-checked arguments.
    fn invoke_function(&mut self, object: &ObjectRef, function: &str, args: Vec<Value>) -> Result<Value>;

    /// Watch one property of one object.
    fn register_change_hook(&mut self, object: &ObjectRef, property: &str, hook: ChangeHook) -> HookId;

    /// Stop watching. Unknown ids are ignored.
    fn unregister_change_hook(&mut self, id: HookId);

    /// Install the listener for engine events, replacing any previous one.
    fn set_event_sink(&mut self, sink: EventSink);

    /// Advance the simulation by one step.
    fn tick(&mut self, _dt: Duration) {}

    /// Concrete engine access for engine-specific jobs.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destroyed_event_shape() {
        let ev = EngineEvent::ObjectDestroyed(ObjectRef::new("PointLight", 4));
        assert_eq!(ev.kind(), "object.destroyed");
        assert_eq!(
            ev.payload().get("object"),
            Some(&Value::Object(ObjectRef::new("PointLight", 4)))
        );
    }

    #[test]
    fn hook_id_display() {
        assert_eq!(HookId(7).to_string(), "hook-7");
    }
}
