//! Method handlers, one module per namespace.

pub mod object;
pub mod preset;
pub mod signature;
pub mod subscription;
pub mod system;

use futures::FutureExt;
use rc_core::{Result, Value};
use rc_engine::Reflection;
use rc_presets::PresetRegistry;

use crate::rpc::context::RpcContext;
use crate::rpc::registry::{HandlerFuture, MethodRegistry};

/// Register every method.
pub fn register_all(registry: &mut MethodRegistry) {
    registry.register("object.get", object::GetHandler);
    registry.register("object.set", object::SetHandler);
    registry.register("object.invoke", object::InvokeHandler);
    registry.register("object.describe", object::DescribeHandler);

    registry.register("preset.list", preset::ListHandler);
    registry.register("preset.create", preset::CreateHandler);
    registry.register("preset.delete", preset::DeleteHandler);
    registry.register("preset.listFields", preset::ListFieldsHandler);
    registry.register("preset.bind", preset::BindHandler);
    registry.register("preset.rebind", preset::RebindHandler);
    registry.register("preset.unbind", preset::UnbindHandler);
    registry.register("preset.get", preset::GetHandler);
    registry.register("preset.set", preset::SetHandler);
    registry.register("preset.invoke", preset::InvokeHandler);
    registry.register("preset.setProtocolValue", preset::SetProtocolValueHandler);
    registry.register("preset.setMetadata", preset::SetMetadataHandler);
    registry.register("preset.setRange", preset::SetRangeHandler);

    registry.register("signature.list", signature::ListHandler);
    registry.register("signature.create", signature::CreateHandler);
    registry.register("signature.delete", signature::DeleteHandler);
    registry.register("signature.addFields", signature::AddFieldsHandler);
    registry.register("signature.setEnabled", signature::SetEnabledHandler);
    registry.register("signature.apply", signature::ApplyHandler);

    registry.register("subscription.subscribe", subscription::SubscribeHandler);
    registry.register("subscription.unsubscribe", subscription::UnsubscribeHandler);
    registry.register("subscription.list", subscription::ListHandler);

    registry.register("system.ping", system::PingHandler);
}

/// Queue `job` on the engine thread with access to the preset registry.
///
/// Registry-only methods go through here as well, so a connection's commands
/// all run in the order they arrived.
pub(crate) fn engine_job<F>(ctx: &RpcContext, job: F) -> HandlerFuture
where
    F: FnOnce(&mut dyn Reflection, &PresetRegistry) -> Result<Value> + Send + 'static,
{
    let presets = ctx.presets.clone();
    ctx.engine.submit(move |engine| job(engine, &presets)).wait().boxed()
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use std::sync::Arc;
    use std::time::Duration;

    use rc_core::{FunctionDesc, ObjectRef, ParamDesc, PropertyDesc, TypeDesc, Value, WireCodec};
    use rc_engine::{EngineConfig, EngineContext, SceneGraph};
    use rc_presets::PresetRegistry;
    use tokio_util::sync::CancellationToken;

    use crate::rpc::context::{Caller, RpcContext};
    use crate::rpc::params::Params;
    use crate::rpc::registry::MethodHandler;
    use crate::subscriptions::SubscriptionManager;
    use crate::websocket::connection::ClientSession;

    /// Path of the main light in [`demo_scene`].
    pub const LIGHT: &str = "/Game/Main.Light_1";
    /// A second light with only an intensity.
    pub const LIGHT_2: &str = "/Game/Main.Light_2";

    /// One light with a float, a struct, a read-only property and two
    /// functions, plus a plain second light.
    pub fn demo_scene() -> (SceneGraph, ObjectRef) {
        let mut scene = SceneGraph::new();
        let color = TypeDesc::structure("Color", [("R", TypeDesc::Float), ("G", TypeDesc::Float)]);
        let light = scene
            .spawn("PointLight", LIGHT)
            .property(
                PropertyDesc::new("Intensity", TypeDesc::Float).with_meta("UIMax", "10"),
                Value::Float(1.0),
            )
            .property(
                PropertyDesc::new("Color", color),
                Value::map([("R", Value::Float(0.0)), ("G", Value::Float(0.0))]),
            )
            .property(PropertyDesc::new("Serial", TypeDesc::Int).read_only(), Value::Int(7))
            .function(
                FunctionDesc {
                    name: "Add".into(),
                    params: vec![ParamDesc::new("A", TypeDesc::Int), ParamDesc::new("B", TypeDesc::Int)],
                    returns: Some(TypeDesc::Int),
                },
                |_, _, args| {
                    let sum = args.iter().filter_map(Value::as_i64).sum::<i64>();
                    Ok(Value::Int(sum))
                },
            )
            .function(
                FunctionDesc {
                    name: "Fail".into(),
                    params: Vec::new(),
                    returns: None,
                },
                |_, _, _| Err("bulb blew".to_owned()),
            )
            .finish();
        let _ = scene
            .spawn("PointLight", LIGHT_2)
            .property(PropertyDesc::new("Intensity", TypeDesc::Float), Value::Float(1.0))
            .finish();
        (scene, light)
    }

    /// Context over [`demo_scene`] with an in-memory preset registry.
    pub fn make_test_context() -> RpcContext {
        let (scene, _) = demo_scene();
        let engine = EngineContext::spawn(
            scene,
            EngineConfig {
                request_timeout: Duration::from_secs(5),
                tick_interval: None,
            },
        )
        .unwrap();
        RpcContext::new(
            engine,
            Arc::new(PresetRegistry::new()),
            SubscriptionManager::new(Arc::new(WireCodec)),
        )
    }

    /// Registered session for `ctx`.
    pub fn open_session(ctx: &RpcContext) -> Caller {
        let session = Arc::new(ClientSession::new(64, CancellationToken::new()));
        ctx.subscriptions.register_session(session.clone());
        Caller::Session(session)
    }

    /// Run a handler to completion.
    pub async fn call<H: MethodHandler>(
        handler: &H,
        ctx: &RpcContext,
        caller: &Caller,
        params: Vec<(&str, Value)>,
    ) -> rc_core::Result<Value> {
        handler.call(Params::from_pairs(params), ctx, caller)?.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_namespace_registered() {
        let mut registry = MethodRegistry::new();
        register_all(&mut registry);
        let methods = registry.methods();
        assert_eq!(methods.len(), 27);
        for prefix in ["object.", "preset.", "signature.", "subscription.", "system."] {
            assert!(methods.iter().any(|m| m.starts_with(prefix)), "{prefix}");
        }
        assert!(registry.has_method("preset.setProtocolValue"));
    }
}
