//! Method registry and dispatch.
//!
//! Handlers start their work synchronously: by the time
//! [`MethodHandler::call`] returns, any engine job it needs is already queued.
//! The caller can therefore dispatch a connection's requests one after
//! another and await the results concurrently while the engine still sees
//! them in receipt order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::BoxFuture;
use metrics::{counter, histogram};
use rc_core::{RcError, Result, Value};
use tracing::{debug, warn};

use crate::metrics::{RC_ERRORS_TOTAL, RC_REQUEST_DURATION_SECONDS, RC_REQUESTS_TOTAL};
use crate::rpc::context::{Caller, RpcContext};
use crate::rpc::params::Params;
use crate::rpc::types::{RpcRequest, RpcResponse};

/// Future returned by a handler.
pub type HandlerFuture = BoxFuture<'static, Result<Value>>;

/// Requests slower than this are logged.
const SLOW_REQUEST: Duration = Duration::from_secs(5);

/// Implemented by every method handler.
pub trait MethodHandler: Send + Sync {
    /// Validate `params`, queue any engine work, and return the pending result.
    ///
    /// Parameter errors are returned directly; nothing has been queued then.
    fn call(&self, params: Params, ctx: &RpcContext, caller: &Caller) -> Result<HandlerFuture>;
}

/// Wrap an already-known outcome.
pub fn ready(result: Result<Value>) -> HandlerFuture {
    futures::future::ready(result).boxed()
}

/// Method name to handler.
pub struct MethodRegistry {
    handlers: HashMap<String, Arc<dyn MethodHandler>>,
}

impl MethodRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register `handler` under `method`, replacing any previous one.
    pub fn register(&mut self, method: &str, handler: impl MethodHandler + 'static) {
        let _ = self.handlers.insert(method.to_owned(), Arc::new(handler));
    }

    /// Start a request. The returned future resolves to its response.
    pub fn dispatch(&self, request: RpcRequest, ctx: &RpcContext, caller: &Caller) -> BoxFuture<'static, RpcResponse> {
        let RpcRequest { id, method, params } = request;
        counter!(RC_REQUESTS_TOTAL, "method" => method.clone()).increment(1);
        debug!(method, "dispatching request");

        let started = match self.handlers.get(&method) {
            None => {
                warn!(method, "unknown method");
                Err(RcError::invalid_request(format!("method '{method}' not found")))
            }
            Some(handler) => Params::new(params).and_then(|params| handler.call(params, ctx, caller)),
        };

        let start = Instant::now();
        async move {
            let result = match started {
                Ok(pending) => pending.await,
                Err(e) => Err(e),
            };
            let elapsed = start.elapsed();
            histogram!(RC_REQUEST_DURATION_SECONDS, "method" => method.clone()).record(elapsed.as_secs_f64());
            if elapsed >= SLOW_REQUEST {
                warn!(method, duration_secs = elapsed.as_secs_f64(), "slow request");
            }
            match result {
                Ok(value) => RpcResponse::success(id, value),
                Err(err) => {
                    counter!(RC_ERRORS_TOTAL, "method" => method.clone(), "code" => err.code()).increment(1);
                    debug!(method, code = err.code(), error = %err, "request failed");
                    RpcResponse::error(id, &err)
                }
            }
        }
        .boxed()
    }

    /// Registered method names, sorted.
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether `method` is registered.
    pub fn has_method(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}
