//! System handlers.

use rc_core::{Result, Value};

use crate::rpc::context::{Caller, RpcContext};
use crate::rpc::handlers::engine_job;
use crate::rpc::params::Params;
use crate::rpc::registry::{HandlerFuture, MethodHandler};

/// Round trip through the engine thread.
pub struct PingHandler;

impl MethodHandler for PingHandler {
    fn call(&self, _params: Params, ctx: &RpcContext, _caller: &Caller) -> Result<HandlerFuture> {
        Ok(engine_job(ctx, |_, _| {
            Ok(Value::map([
                ("pong", Value::Bool(true)),
                ("timestamp", Value::from(chrono::Utc::now().to_rfc3339())),
            ]))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::handlers::test_helpers::{call, make_test_context};

    #[tokio::test]
    async fn ping_returns_pong() {
        let ctx = make_test_context();
        let result = call(&PingHandler, &ctx, &Caller::Http, vec![]).await.unwrap();
        assert_eq!(result.get("pong"), Some(&Value::Bool(true)));
        let ts = result.get("timestamp").and_then(Value::as_str).unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
    }
}
