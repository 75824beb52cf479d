//! Preset handlers.
//!
//! `preset` accepts a preset name or id. Registry edits run as engine jobs
//! too, so they interleave with property commands in arrival order.

use rc_core::{RcError, Result, Value};
use rc_engine::executor::{self, ModifyFlags, Operation};
use rc_presets::{PresetField, PresetSummary, RangePoint};
use tracing::instrument;

use crate::rpc::context::{Caller, RpcContext};
use crate::rpc::handlers::engine_job;
use crate::rpc::params::Params;
use crate::rpc::registry::{HandlerFuture, MethodHandler};

fn modify_flags(params: &Params) -> Result<ModifyFlags> {
    Ok(if params.flag("silent")? {
        ModifyFlags::silent()
    } else {
        ModifyFlags::default()
    })
}

fn fields_value(fields: Vec<PresetField>) -> Value {
    Value::Array(fields.iter().map(PresetField::to_value).collect())
}

fn parse_points(raw: Vec<Value>) -> Result<Vec<RangePoint>> {
    raw.into_iter()
        .enumerate()
        .map(|(i, point)| {
            let input = point
                .get("input")
                .and_then(Value::as_f64)
                .ok_or_else(|| RcError::invalid_request(format!("points[{i}] needs a numeric 'input'")))?;
            let output = point
                .get("output")
                .cloned()
                .ok_or_else(|| RcError::invalid_request(format!("points[{i}] needs an 'output'")))?;
            Ok(RangePoint::new(input, output))
        })
        .collect()
}

/// List presets.
pub struct ListHandler;

impl MethodHandler for ListHandler {
    fn call(&self, _params: Params, ctx: &RpcContext, _caller: &Caller) -> Result<HandlerFuture> {
        Ok(engine_job(ctx, |_, presets| {
            Ok(Value::Array(presets.list().iter().map(PresetSummary::to_value).collect()))
        }))
    }
}

/// Create a preset.
pub struct CreateHandler;

impl MethodHandler for CreateHandler {
    #[instrument(skip_all, fields(method = "preset.create"))]
    fn call(&self, params: Params, ctx: &RpcContext, _caller: &Caller) -> Result<HandlerFuture> {
        let name = params.str("name")?;
        Ok(engine_job(ctx, move |_, presets| Ok(presets.create(&name)?.to_value())))
    }
}

/// Delete a preset.
pub struct DeleteHandler;

impl MethodHandler for DeleteHandler {
    #[instrument(skip_all, fields(method = "preset.delete"))]
    fn call(&self, params: Params, ctx: &RpcContext, _caller: &Caller) -> Result<HandlerFuture> {
        let preset = params.str("preset")?;
        Ok(engine_job(ctx, move |_, presets| {
            let id = presets.delete(&preset)?;
            Ok(Value::map([("id", Value::from(id.as_str()))]))
        }))
    }
}

/// List a preset's fields.
pub struct ListFieldsHandler;

impl MethodHandler for ListFieldsHandler {
    fn call(&self, params: Params, ctx: &RpcContext, _caller: &Caller) -> Result<HandlerFuture> {
        let preset = params.str("preset")?;
        Ok(engine_job(ctx, move |_, presets| Ok(fields_value(presets.list_fields(&preset)?))))
    }
}

/// Expose a path as a new field.
pub struct BindHandler;

impl MethodHandler for BindHandler {
    #[instrument(skip_all, fields(method = "preset.bind"))]
    fn call(&self, params: Params, ctx: &RpcContext, _caller: &Caller) -> Result<HandlerFuture> {
        let preset = params.str("preset")?;
        let field = params.str("field")?;
        let path = params.str("path")?;
        Ok(engine_job(ctx, move |engine, presets| {
            Ok(presets.bind(engine, &preset, &field, &path)?.to_value())
        }))
    }
}

/// Point an existing field at a new path.
pub struct RebindHandler;

impl MethodHandler for RebindHandler {
    #[instrument(skip_all, fields(method = "preset.rebind"))]
    fn call(&self, params: Params, ctx: &RpcContext, _caller: &Caller) -> Result<HandlerFuture> {
        let preset = params.str("preset")?;
        let field = params.str("field")?;
        let path = params.str("path")?;
        Ok(engine_job(ctx, move |engine, presets| {
            Ok(presets.rebind(engine, &preset, &field, &path)?.to_value())
        }))
    }
}

/// Remove a field.
pub struct UnbindHandler;

impl MethodHandler for UnbindHandler {
    fn call(&self, params: Params, ctx: &RpcContext, _caller: &Caller) -> Result<HandlerFuture> {
        let preset = params.str("preset")?;
        let field = params.str("field")?;
        Ok(engine_job(ctx, move |_, presets| {
            presets.unbind(&preset, &field)?;
            Ok(Value::Null)
        }))
    }
}

/// Read the property behind a field.
pub struct GetHandler;

impl MethodHandler for GetHandler {
    fn call(&self, params: Params, ctx: &RpcContext, _caller: &Caller) -> Result<HandlerFuture> {
        let preset = params.str("preset")?;
        let field = params.str("field")?;
        Ok(engine_job(ctx, move |engine, presets| {
            let handle = presets.resolve_field(engine, &preset, &field)?;
            executor::execute(engine, &handle, Operation::Get)
        }))
    }
}

/// Write the property behind a field.
pub struct SetHandler;

impl MethodHandler for SetHandler {
    fn call(&self, params: Params, ctx: &RpcContext, _caller: &Caller) -> Result<HandlerFuture> {
        let preset = params.str("preset")?;
        let field = params.str("field")?;
        let value = params.value("value")?;
        let flags = modify_flags(&params)?;
        Ok(engine_job(ctx, move |engine, presets| {
            let handle = presets.resolve_field(engine, &preset, &field)?;
            executor::execute(engine, &handle, Operation::Set { value, flags })
        }))
    }
}

/// Call the function behind a field.
pub struct InvokeHandler;

impl MethodHandler for InvokeHandler {
    fn call(&self, params: Params, ctx: &RpcContext, _caller: &Caller) -> Result<HandlerFuture> {
        let preset = params.str("preset")?;
        let field = params.str("field")?;
        let args = params.args("args")?;
        Ok(engine_job(ctx, move |engine, presets| {
            let handle = presets.resolve_field(engine, &preset, &field)?;
            executor::execute(engine, &handle, Operation::Invoke { args })
        }))
    }
}

/// Write a protocol input through the field's range mapping.
pub struct SetProtocolValueHandler;

impl MethodHandler for SetProtocolValueHandler {
    #[instrument(skip_all, fields(method = "preset.setProtocolValue"))]
    fn call(&self, params: Params, ctx: &RpcContext, _caller: &Caller) -> Result<HandlerFuture> {
        let preset = params.str("preset")?;
        let field = params.str("field")?;
        let input = params.f64("value")?;
        let flags = modify_flags(&params)?;
        Ok(engine_job(ctx, move |engine, presets| {
            presets.set_protocol_value(engine, &preset, &field, input, flags)
        }))
    }
}

/// Set or clear one metadata entry. A missing `value` clears the key.
pub struct SetMetadataHandler;

impl MethodHandler for SetMetadataHandler {
    fn call(&self, params: Params, ctx: &RpcContext, _caller: &Caller) -> Result<HandlerFuture> {
        let preset = params.str("preset")?;
        let field = params.str("field")?;
        let key = params.str("key")?;
        let value = params.opt_str("value")?;
        Ok(engine_job(ctx, move |_, presets| {
            presets.set_metadata(&preset, &field, &key, value.as_deref())?;
            Ok(Value::Null)
        }))
    }
}

/// Replace a field's range mapping with `points: [{input, output}]`.
pub struct SetRangeHandler;

impl MethodHandler for SetRangeHandler {
    fn call(&self, params: Params, ctx: &RpcContext, _caller: &Caller) -> Result<HandlerFuture> {
        let preset = params.str("preset")?;
        let field = params.str("field")?;
        let points = parse_points(params.args("points")?)?;
        Ok(engine_job(ctx, move |_, presets| {
            presets.set_range_mapping(&preset, &field, points)?;
            Ok(Value::Null)
        }))
    }
}
