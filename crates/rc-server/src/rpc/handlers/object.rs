//! Object handlers: get, set, invoke, describe.
//!
//! Addresses are engine paths or `preset.field` aliases.

use rc_core::Result;
use rc_engine::executor::{self, ModifyFlags, Operation};
use rc_engine::{resolve, resolver};
use tracing::instrument;

use crate::rpc::context::{Caller, RpcContext};
use crate::rpc::handlers::engine_job;
use crate::rpc::params::Params;
use crate::rpc::registry::{HandlerFuture, MethodHandler};

/// Read a property.
pub struct GetHandler;

impl MethodHandler for GetHandler {
    #[instrument(skip_all, fields(method = "object.get"))]
    fn call(&self, params: Params, ctx: &RpcContext, _caller: &Caller) -> Result<HandlerFuture> {
        let path = params.str("path")?;
        Ok(engine_job(ctx, move |engine, presets| {
            let handle = resolve(engine, presets, &path)?;
            executor::execute(engine, &handle, Operation::Get)
        }))
    }
}

/// Write a property. `silent: true` suppresses change notifications.
pub struct SetHandler;

impl MethodHandler for SetHandler {
    #[instrument(skip_all, fields(method = "object.set"))]
    fn call(&self, params: Params, ctx: &RpcContext, _caller: &Caller) -> Result<HandlerFuture> {
        let path = params.str("path")?;
        let value = params.value("value")?;
        let flags = if params.flag("silent")? {
            ModifyFlags::silent()
        } else {
            ModifyFlags::default()
        };
        Ok(engine_job(ctx, move |engine, presets| {
            let handle = resolve(engine, presets, &path)?;
            executor::execute(engine, &handle, Operation::Set { value, flags })
        }))
    }
}

/// Call a function with positional `args`.
pub struct InvokeHandler;

impl MethodHandler for InvokeHandler {
    #[instrument(skip_all, fields(method = "object.invoke"))]
    fn call(&self, params: Params, ctx: &RpcContext, _caller: &Caller) -> Result<HandlerFuture> {
        let path = params.str("path")?;
        let args = params.args("args")?;
        Ok(engine_job(ctx, move |engine, presets| {
            let handle = resolve(engine, presets, &path)?;
            executor::execute(engine, &handle, Operation::Invoke { args })
        }))
    }
}

/// Describe an object's properties and functions.
pub struct DescribeHandler;

impl MethodHandler for DescribeHandler {
    #[instrument(skip_all, fields(method = "object.describe"))]
    fn call(&self, params: Params, ctx: &RpcContext, _caller: &Caller) -> Result<HandlerFuture> {
        let object = params.str("object")?;
        Ok(engine_job(ctx, move |engine, _| {
            let object = resolver::resolve_object(engine, &object)?;
            executor::describe(engine, &object)
        }))
    }
}
