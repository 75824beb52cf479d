//! Frame decoding and response encoding for WebSocket requests.

use futures::FutureExt;
use futures::future::BoxFuture;
use rc_core::{Value, WireCodec, WireFormat};
use tracing::{debug, error, warn};

use crate::rpc::context::{Caller, RpcContext};
use crate::rpc::registry::MethodRegistry;
use crate::rpc::types::{RpcRequest, RpcResponse};

/// Decode one inbound frame and start the request it carries.
///
/// Engine work is queued before this returns. A frame that cannot be
/// decoded, or is not a valid request envelope, resolves to an error
/// response right away.
pub fn handle_message(
    payload: &[u8],
    format: WireFormat,
    registry: &MethodRegistry,
    ctx: &RpcContext,
    caller: &Caller,
) -> BoxFuture<'static, RpcResponse> {
    let frame = match WireCodec::decode(payload, format) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(%format, error = %e, "undecodable frame");
            return futures::future::ready(RpcResponse::error(Value::Null, &e)).boxed();
        }
    };
    match RpcRequest::from_value(frame) {
        Ok(request) => {
            debug!(method = %request.method, "request received");
            registry.dispatch(request, ctx, caller)
        }
        Err(response) => futures::future::ready(response).boxed(),
    }
}

/// Encode a response in `format`.
///
/// A result the format cannot carry (bytes in JSON) turns into an error
/// response for the same id.
pub fn encode_response(response: &RpcResponse, format: WireFormat) -> Option<Vec<u8>> {
    match WireCodec::encode(&response.to_value(), format) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            debug!(%format, error = %e, "response not encodable, replying with the error");
            match WireCodec::encode(&RpcResponse::error(response.id.clone(), &e).to_value(), format) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    error!(error = %e, "failed to encode error response");
                    None
                }
            }
        }
    }
}
