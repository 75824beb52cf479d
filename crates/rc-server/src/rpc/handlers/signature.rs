//! Signature handlers.
//!
//! `signature` accepts a signature name or id. Like preset edits, these run
//! as engine jobs so an `apply` sees every earlier edit.

use rc_core::{RcError, Result, Value};
use rc_presets::{Signature, SignatureField};
use tracing::instrument;

use crate::rpc::context::{Caller, RpcContext};
use crate::rpc::handlers::engine_job;
use crate::rpc::params::Params;
use crate::rpc::registry::{HandlerFuture, MethodHandler};

/// Entries are a bare path or `{path, supportedClass?, enabled?}`.
fn parse_fields(params: &Params) -> Result<Vec<SignatureField>> {
    let items = match params.get("fields") {
        Some(Value::Array(items)) if !items.is_empty() => items,
        _ => return Err(RcError::invalid_request("'fields' must be a non-empty array")),
    };
    items.iter().map(parse_field).collect()
}

fn parse_field(item: &Value) -> Result<SignatureField> {
    if let Some(path) = item.as_str() {
        return Ok(SignatureField::new(path));
    }
    let path = item
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| RcError::invalid_request("each field needs a string 'path'"))?;
    let mut field = SignatureField::new(path);
    match item.get("supportedClass") {
        None | Some(Value::Null) => {}
        Some(Value::String(class)) => field.supported_class = Some(class.clone()),
        Some(other) => {
            return Err(RcError::invalid_request(format!(
                "'supportedClass' must be a string, got {}",
                other.kind()
            )));
        }
    }
    if let Some(enabled) = item.get("enabled") {
        field.enabled = enabled
            .as_bool()
            .ok_or_else(|| RcError::invalid_request("'enabled' must be a boolean"))?;
    }
    Ok(field)
}

fn parse_objects(params: &Params) -> Result<Vec<String>> {
    params
        .args("objects")?
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_owned)
                .ok_or_else(|| RcError::invalid_request("'objects' must contain object paths"))
        })
        .collect()
}

/// List every signature.
pub struct ListHandler;

impl MethodHandler for ListHandler {
    fn call(&self, _params: Params, ctx: &RpcContext, _caller: &Caller) -> Result<HandlerFuture> {
        let signatures = ctx.signatures.clone();
        Ok(engine_job(ctx, move |_, _| {
            Ok(Value::Array(signatures.list().iter().map(Signature::to_value).collect()))
        }))
    }
}

/// Create an empty signature.
pub struct CreateHandler;

impl MethodHandler for CreateHandler {
    #[instrument(skip_all, fields(method = "signature.create"))]
    fn call(&self, params: Params, ctx: &RpcContext, _caller: &Caller) -> Result<HandlerFuture> {
        let name = params.str("name")?;
        let signatures = ctx.signatures.clone();
        Ok(engine_job(ctx, move |_, _| Ok(signatures.create(&name)?.to_value())))
    }
}

/// Delete a signature. Fields it already bound stay in their presets.
pub struct DeleteHandler;

impl MethodHandler for DeleteHandler {
    #[instrument(skip_all, fields(method = "signature.delete"))]
    fn call(&self, params: Params, ctx: &RpcContext, _caller: &Caller) -> Result<HandlerFuture> {
        let signature = params.str("signature")?;
        let signatures = ctx.signatures.clone();
        Ok(engine_job(ctx, move |_, _| {
            let id = signatures.remove(&signature)?;
            Ok(Value::map([("id", Value::from(id.as_str()))]))
        }))
    }
}

/// Append fields, skipping ones already present.
pub struct AddFieldsHandler;

impl MethodHandler for AddFieldsHandler {
    fn call(&self, params: Params, ctx: &RpcContext, _caller: &Caller) -> Result<HandlerFuture> {
        let signature = params.str("signature")?;
        let fields = parse_fields(&params)?;
        let signatures = ctx.signatures.clone();
        Ok(engine_job(ctx, move |_, _| {
            let added = signatures.add_fields(&signature, fields)?;
            Ok(Value::map([("added", Value::Int(i64::try_from(added).unwrap_or(i64::MAX)))]))
        }))
    }
}

/// Enable or disable a signature.
pub struct SetEnabledHandler;

impl MethodHandler for SetEnabledHandler {
    fn call(&self, params: Params, ctx: &RpcContext, _caller: &Caller) -> Result<HandlerFuture> {
        let signature = params.str("signature")?;
        let enabled = params
            .get("enabled")
            .and_then(Value::as_bool)
            .ok_or_else(|| RcError::invalid_request("'enabled' must be a boolean"))?;
        let signatures = ctx.signatures.clone();
        Ok(engine_job(ctx, move |_, _| {
            signatures.set_enabled(&signature, enabled)?;
            Ok(Value::Null)
        }))
    }
}

/// Bind a signature's fields on each object into a preset.
pub struct ApplyHandler;

impl MethodHandler for ApplyHandler {
    #[instrument(skip_all, fields(method = "signature.apply"))]
    fn call(&self, params: Params, ctx: &RpcContext, _caller: &Caller) -> Result<HandlerFuture> {
        let signature = params.str("signature")?;
        let preset = params.str("preset")?;
        let objects = parse_objects(&params)?;
        let signatures = ctx.signatures.clone();
        Ok(engine_job(ctx, move |engine, presets| {
            Ok(signatures.apply(engine, presets, &signature, &preset, &objects)?.to_value())
        }))
    }
}
