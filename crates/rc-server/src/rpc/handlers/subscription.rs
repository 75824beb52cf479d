//! Subscription handlers. WebSocket only: pushes need a session to land in.

use rc_core::{RcError, Result, SubscriptionId, Value};
use rc_engine::resolve;
use rc_presets::PresetEvent;
use tracing::instrument;

use crate::rpc::context::{Caller, RpcContext};
use crate::rpc::handlers::engine_job;
use crate::rpc::params::Params;
use crate::rpc::registry::{HandlerFuture, MethodHandler};
use crate::subscriptions::{DeliveryMode, SubscriptionTarget};

/// Event kinds a client can subscribe to.
pub const EVENT_KINDS: [&str; 2] = ["object.destroyed", PresetEvent::KIND];

enum Wanted {
    Path(String),
    Field { preset: String, field: String },
    Event(String),
}

fn wanted(params: &Params) -> Result<Wanted> {
    if let Some(kind) = params.opt_str("event")? {
        if !EVENT_KINDS.contains(&kind.as_str()) {
            return Err(RcError::invalid_request(format!("unknown event '{kind}'")));
        }
        return Ok(Wanted::Event(kind));
    }
    if let Some(path) = params.opt_str("path")? {
        return Ok(Wanted::Path(path));
    }
    match (params.opt_str("preset")?, params.opt_str("field")?) {
        (Some(preset), Some(field)) => Ok(Wanted::Field { preset, field }),
        _ => Err(RcError::invalid_request(
            "subscribe needs 'path', 'preset' and 'field', or 'event'",
        )),
    }
}

/// Watch a property (by path or preset field) or an event kind.
pub struct SubscribeHandler;

impl MethodHandler for SubscribeHandler {
    #[instrument(skip_all, fields(method = "subscription.subscribe"))]
    fn call(&self, params: Params, ctx: &RpcContext, caller: &Caller) -> Result<HandlerFuture> {
        let session = caller.session()?.id.clone();
        let wanted = wanted(&params)?;
        let interval = params.opt_u64("intervalMs")?;
        let mode = DeliveryMode::parse(params.opt_str("mode")?.as_deref(), interval)?;
        let manager = ctx.subscriptions.clone();

        Ok(engine_job(ctx, move |engine, presets| {
            let target = match wanted {
                Wanted::Event(kind) => SubscriptionTarget::Event { kind },
                Wanted::Path(path) => SubscriptionTarget::Property {
                    handle: resolve(engine, presets, &path)?.into_property()?,
                    label: path,
                },
                Wanted::Field { preset, field } => SubscriptionTarget::Property {
                    handle: presets.resolve_field(engine, &preset, &field)?.into_property()?,
                    label: format!("{preset}.{field}"),
                },
            };
            let label = match &target {
                SubscriptionTarget::Property { label, .. } => label.clone(),
                SubscriptionTarget::Event { kind } => kind.clone(),
            };
            let id = manager.subscribe(engine, &session, target, mode)?;
            Ok(Value::map([
                ("subscription", Value::from(id.as_str())),
                ("target", Value::from(label)),
            ]))
        }))
    }
}

/// Cancel one of the caller's subscriptions.
pub struct UnsubscribeHandler;

impl MethodHandler for UnsubscribeHandler {
    fn call(&self, params: Params, ctx: &RpcContext, caller: &Caller) -> Result<HandlerFuture> {
        let session = caller.session()?.id.clone();
        let id = SubscriptionId::from(params.str("subscription")?);
        let manager = ctx.subscriptions.clone();
        Ok(engine_job(ctx, move |engine, _| {
            manager.unsubscribe(engine, &session, &id)?;
            Ok(Value::Null)
        }))
    }
}

/// The caller's subscriptions.
pub struct ListHandler;

impl MethodHandler for ListHandler {
    fn call(&self, _params: Params, ctx: &RpcContext, caller: &Caller) -> Result<HandlerFuture> {
        let session = caller.session()?.id.clone();
        let manager = ctx.subscriptions.clone();
        Ok(engine_job(ctx, move |_, _| Ok(Value::Array(manager.list(&session)))))
    }
}
