//! REST surface under `/remote`.
//!
//! Every route builds the same request a WebSocket client would send and
//! runs it through the method registry, so both surfaces share validation,
//! ordering and error codes. Bodies are JSON unless `Content-Type` says
//! `application/cbor`; responses are CBOR when `Accept` asks for it.

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use rc_core::errors::{
    ALREADY_EXISTS, AMBIGUOUS, DUPLICATE_FIELD, INVALID_REQUEST, MALFORMED, NOT_FOUND, PATH_UNRESOLVABLE, READ_ONLY,
    SESSION_CLOSED, STALE_REFERENCE, TIMEOUT, TYPE_MISMATCH, UNSUPPORTED_IN_TEXT_FORMAT,
};
use rc_core::{RcError, Result, Value, WireCodec, WireFormat};
use serde::Deserialize;
use tracing::{debug, error};

use crate::rpc::context::Caller;
use crate::rpc::types::{RpcErrorBody, RpcRequest};
use crate::server::AppState;

/// `/remote` routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/remote/property", get(get_property).put(set_property))
        .route("/remote/function", post(invoke_function))
        .route("/remote/describe", get(describe_object))
        .route("/remote/presets", get(list_presets).post(create_preset))
        .route("/remote/preset/{preset}", axum::routing::delete(delete_preset))
        .route("/remote/preset/{preset}/fields", get(list_fields))
        .route("/remote/preset/{preset}/binding/{field}", put(bind_field).delete(unbind_field))
        .route(
            "/remote/preset/{preset}/property/{field}",
            get(get_field).put(set_field),
        )
        .route("/remote/preset/{preset}/function/{field}", post(invoke_field))
        .route("/remote/preset/{preset}/protocol/{field}", put(set_protocol_value))
        .route("/remote/preset/{preset}/metadata/{field}/{key}", put(set_metadata))
        .route("/remote/preset/{preset}/range/{field}", put(set_range))
        .route("/remote/signatures", get(list_signatures).post(create_signature))
        .route("/remote/signature/{signature}", axum::routing::delete(delete_signature))
        .route("/remote/signature/{signature}/fields", post(add_signature_fields))
        .route("/remote/signature/{signature}/apply", post(apply_signature))
}

/// HTTP status for an error code.
pub fn status_for(code: &str) -> StatusCode {
    match code {
        NOT_FOUND => StatusCode::NOT_FOUND,
        TYPE_MISMATCH | MALFORMED | INVALID_REQUEST | SESSION_CLOSED => StatusCode::BAD_REQUEST,
        UNSUPPORTED_IN_TEXT_FORMAT => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        READ_ONLY => StatusCode::FORBIDDEN,
        AMBIGUOUS | DUPLICATE_FIELD | ALREADY_EXISTS => StatusCode::CONFLICT,
        STALE_REFERENCE => StatusCode::GONE,
        PATH_UNRESOLVABLE => StatusCode::UNPROCESSABLE_ENTITY,
        TIMEOUT => StatusCode::GATEWAY_TIMEOUT,
        // INVOCATION_FAILED, INTERNAL_ERROR
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Format the client wants back: the first recognised `Accept` entry, else JSON.
fn response_format(headers: &HeaderMap) -> WireFormat {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .and_then(|accept| accept.split(',').find_map(WireFormat::from_mime))
        .unwrap_or_default()
}

fn body_format(headers: &HeaderMap) -> WireFormat {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(WireFormat::from_mime)
        .unwrap_or_default()
}

/// Decode the request body; an empty body is `None`.
fn decode_body(headers: &HeaderMap, body: &Bytes) -> Result<Option<Value>> {
    if body.is_empty() {
        return Ok(None);
    }
    WireCodec::decode(body, body_format(headers)).map(Some)
}

fn require_body(headers: &HeaderMap, body: &Bytes) -> Result<Value> {
    decode_body(headers, body)?.ok_or_else(|| RcError::invalid_request("request body is required"))
}

fn bytes_response(status: StatusCode, bytes: Vec<u8>, format: WireFormat) -> Response {
    let mut response = (status, bytes).into_response();
    let _ = response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(format.mime()));
    response
}

fn encoded(status: StatusCode, value: &Value, format: WireFormat) -> Response {
    match WireCodec::encode(value, format) {
        Ok(bytes) => bytes_response(status, bytes, format),
        Err(e) => {
            error!(error = %e, "failed to encode error body");
            (status, e.to_string()).into_response()
        }
    }
}

fn error_response(body: &RpcErrorBody, format: WireFormat) -> Response {
    encoded(status_for(&body.code), &body.to_value(), format)
}

fn reject(err: &RcError, format: WireFormat) -> Response {
    debug!(code = err.code(), error = %err, "request rejected");
    error_response(&RpcErrorBody::from_error(err), format)
}

/// Run `method` through the registry and render the outcome.
async fn call(state: &AppState, method: &str, params: Vec<(&str, Value)>, format: WireFormat) -> Response {
    let request = RpcRequest::new("http", method, Value::map(params));
    let response = state.registry.dispatch(request, &state.ctx, &Caller::Http).await;
    match response.outcome {
        Ok(value) => match WireCodec::encode(&value, format) {
            Ok(bytes) => bytes_response(StatusCode::OK, bytes, format),
            Err(e) => reject(&e, format),
        },
        Err(body) => error_response(&body, format),
    }
}

#[derive(Debug, Deserialize)]
struct PathQuery {
    path: String,
    #[serde(default)]
    silent: bool,
}

#[derive(Debug, Deserialize)]
struct ObjectQuery {
    object: String,
}

#[derive(Debug, Default, Deserialize)]
struct WriteQuery {
    #[serde(default)]
    silent: bool,
}

#[derive(Debug, Default, Deserialize)]
struct BindQuery {
    #[serde(default)]
    rebind: bool,
}

async fn get_property(State(state): State<AppState>, Query(q): Query<PathQuery>, headers: HeaderMap) -> Response {
    call(&state, "object.get", vec![("path", Value::from(q.path))], response_format(&headers)).await
}

async fn set_property(
    State(state): State<AppState>,
    Query(q): Query<PathQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let format = response_format(&headers);
    let value = match require_body(&headers, &body) {
        Ok(v) => v,
        Err(e) => return reject(&e, format),
    };
    let params = vec![
        ("path", Value::from(q.path)),
        ("value", value),
        ("silent", Value::Bool(q.silent)),
    ];
    call(&state, "object.set", params, format).await
}

async fn invoke_function(
    State(state): State<AppState>,
    Query(q): Query<PathQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let format = response_format(&headers);
    let args = match decode_body(&headers, &body) {
        Ok(args) => args.unwrap_or(Value::Array(Vec::new())),
        Err(e) => return reject(&e, format),
    };
    call(&state, "object.invoke", vec![("path", Value::from(q.path)), ("args", args)], format).await
}

async fn describe_object(State(state): State<AppState>, Query(q): Query<ObjectQuery>, headers: HeaderMap) -> Response {
    call(&state, "object.describe", vec![("object", Value::from(q.object))], response_format(&headers)).await
}

async fn list_presets(State(state): State<AppState>, headers: HeaderMap) -> Response {
    call(&state, "preset.list", Vec::new(), response_format(&headers)).await
}

async fn create_preset(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let format = response_format(&headers);
    let name = match require_body(&headers, &body) {
        Ok(body) => body.get("name").cloned().unwrap_or(Value::Null),
        Err(e) => return reject(&e, format),
    };
    call(&state, "preset.create", vec![("name", name)], format).await
}

async fn delete_preset(State(state): State<AppState>, Path(preset): Path<String>, headers: HeaderMap) -> Response {
    call(&state, "preset.delete", vec![("preset", Value::from(preset))], response_format(&headers)).await
}

async fn list_fields(State(state): State<AppState>, Path(preset): Path<String>, headers: HeaderMap) -> Response {
    call(&state, "preset.listFields", vec![("preset", Value::from(preset))], response_format(&headers)).await
}

async fn bind_field(
    State(state): State<AppState>,
    Path((preset, field)): Path<(String, String)>,
    Query(q): Query<BindQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let format = response_format(&headers);
    let path = match require_body(&headers, &body) {
        Ok(body) => body.get("path").cloned().unwrap_or(Value::Null),
        Err(e) => return reject(&e, format),
    };
    let method = if q.rebind { "preset.rebind" } else { "preset.bind" };
    let params = vec![
        ("preset", Value::from(preset)),
        ("field", Value::from(field)),
        ("path", path),
    ];
    call(&state, method, params, format).await
}

async fn unbind_field(
    State(state): State<AppState>,
    Path((preset, field)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let params = vec![("preset", Value::from(preset)), ("field", Value::from(field))];
    call(&state, "preset.unbind", params, response_format(&headers)).await
}

async fn get_field(
    State(state): State<AppState>,
    Path((preset, field)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let params = vec![("preset", Value::from(preset)), ("field", Value::from(field))];
    call(&state, "preset.get", params, response_format(&headers)).await
}

async fn set_field(
    State(state): State<AppState>,
    Path((preset, field)): Path<(String, String)>,
    Query(q): Query<WriteQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let format = response_format(&headers);
    let value = match require_body(&headers, &body) {
        Ok(v) => v,
        Err(e) => return reject(&e, format),
    };
    let params = vec![
        ("preset", Value::from(preset)),
        ("field", Value::from(field)),
        ("value", value),
        ("silent", Value::Bool(q.silent)),
    ];
    call(&state, "preset.set", params, format).await
}

async fn invoke_field(
    State(state): State<AppState>,
    Path((preset, field)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let format = response_format(&headers);
    let args = match decode_body(&headers, &body) {
        Ok(args) => args.unwrap_or(Value::Array(Vec::new())),
        Err(e) => return reject(&e, format),
    };
    let params = vec![
        ("preset", Value::from(preset)),
        ("field", Value::from(field)),
        ("args", args),
    ];
    call(&state, "preset.invoke", params, format).await
}

async fn set_protocol_value(
    State(state): State<AppState>,
    Path((preset, field)): Path<(String, String)>,
    Query(q): Query<WriteQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let format = response_format(&headers);
    let input = match require_body(&headers, &body) {
        Ok(v) => v,
        Err(e) => return reject(&e, format),
    };
    let params = vec![
        ("preset", Value::from(preset)),
        ("field", Value::from(field)),
        ("value", input),
        ("silent", Value::Bool(q.silent)),
    ];
    call(&state, "preset.setProtocolValue", params, format).await
}

async fn set_metadata(
    State(state): State<AppState>,
    Path((preset, field, key)): Path<(String, String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let format = response_format(&headers);
    // an empty body or null clears the entry
    let value = match decode_body(&headers, &body) {
        Ok(v) => v.unwrap_or(Value::Null),
        Err(e) => return reject(&e, format),
    };
    let params = vec![
        ("preset", Value::from(preset)),
        ("field", Value::from(field)),
        ("key", Value::from(key)),
        ("value", value),
    ];
    call(&state, "preset.setMetadata", params, format).await
}

async fn set_range(
    State(state): State<AppState>,
    Path((preset, field)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let format = response_format(&headers);
    let points = match require_body(&headers, &body) {
        Ok(v) => v,
        Err(e) => return reject(&e, format),
    };
    let params = vec![
        ("preset", Value::from(preset)),
        ("field", Value::from(field)),
        ("points", points),
    ];
    call(&state, "preset.setRange", params, format).await
}

async fn list_signatures(State(state): State<AppState>, headers: HeaderMap) -> Response {
    call(&state, "signature.list", Vec::new(), response_format(&headers)).await
}

async fn create_signature(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let format = response_format(&headers);
    let name = match require_body(&headers, &body) {
        Ok(body) => body.get("name").cloned().unwrap_or(Value::Null),
        Err(e) => return reject(&e, format),
    };
    call(&state, "signature.create", vec![("name", name)], format).await
}

async fn delete_signature(
    State(state): State<AppState>,
    Path(signature): Path<String>,
    headers: HeaderMap,
) -> Response {
    call(&state, "signature.delete", vec![("signature", Value::from(signature))], response_format(&headers)).await
}

async fn add_signature_fields(
    State(state): State<AppState>,
    Path(signature): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let format = response_format(&headers);
    let fields = match require_body(&headers, &body) {
        Ok(body) => body.get("fields").cloned().unwrap_or(Value::Null),
        Err(e) => return reject(&e, format),
    };
    let params = vec![("signature", Value::from(signature)), ("fields", fields)];
    call(&state, "signature.addFields", params, format).await
}

async fn apply_signature(
    State(state): State<AppState>,
    Path(signature): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let format = response_format(&headers);
    let body = match require_body(&headers, &body) {
        Ok(body) => body,
        Err(e) => return reject(&e, format),
    };
    let params = vec![
        ("signature", Value::from(signature)),
        ("preset", body.get("preset").cloned().unwrap_or(Value::Null)),
        ("objects", body.get("objects").cloned().unwrap_or(Value::Null)),
    ];
    call(&state, "signature.apply", params, format).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let cases = [
            (NOT_FOUND, 404),
            (TYPE_MISMATCH, 400),
            (MALFORMED, 400),
            (INVALID_REQUEST, 400),
            (UNSUPPORTED_IN_TEXT_FORMAT, 415),
            (READ_ONLY, 403),
            (AMBIGUOUS, 409),
            (DUPLICATE_FIELD, 409),
            (ALREADY_EXISTS, 409),
            (STALE_REFERENCE, 410),
            (PATH_UNRESOLVABLE, 422),
            ("INVOCATION_FAILED", 500),
            ("INTERNAL_ERROR", 500),
            (TIMEOUT, 504),
        ];
        for (code, status) in cases {
            assert_eq!(status_for(code).as_u16(), status, "{code}");
        }
    }

    #[test]
    fn accept_picks_cbor() {
        let mut headers = HeaderMap::new();
        assert_eq!(response_format(&headers), WireFormat::Json);
        let _ = headers.insert(header::ACCEPT, HeaderValue::from_static("text/html, application/cbor"));
        assert_eq!(response_format(&headers), WireFormat::Cbor);
    }

    #[test]
    fn empty_body_is_none() {
        let headers = HeaderMap::new();
        assert_eq!(decode_body(&headers, &Bytes::new()).unwrap(), None);
        assert!(require_body(&headers, &Bytes::new()).is_err());
    }

    #[test]
    fn cbor_body_by_content_type() {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/cbor"));
        let bytes = WireCodec::encode(&Value::Bytes(vec![9]), WireFormat::Cbor).unwrap();
        assert_eq!(
            decode_body(&headers, &Bytes::from(bytes)).unwrap(),
            Some(Value::Bytes(vec![9]))
        );
    }
}
