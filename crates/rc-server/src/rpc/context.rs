//! Dependencies shared by every request handler.

use std::sync::Arc;
use std::time::Instant;

use rc_core::{RcError, Result};
use rc_engine::EngineContext;
use rc_presets::{PresetRegistry, SignatureRegistry};

use crate::subscriptions::SubscriptionManager;
use crate::websocket::connection::ClientSession;

/// Shared handler context. Cheap to clone.
#[derive(Clone)]
pub struct RpcContext {
    /// The engine thread.
    pub engine: EngineContext,
    /// Presets; also the alias source for path resolution.
    pub presets: Arc<PresetRegistry>,
    /// Signatures, kept for the life of the process.
    pub signatures: Arc<SignatureRegistry>,
    /// Subscriptions and open sessions.
    pub subscriptions: Arc<SubscriptionManager>,
    /// When the server started.
    pub server_start_time: Instant,
}

impl RpcContext {
    /// Bundle the shared dependencies.
    pub fn new(engine: EngineContext, presets: Arc<PresetRegistry>, subscriptions: Arc<SubscriptionManager>) -> Self {
        Self {
            engine,
            presets,
            signatures: Arc::new(SignatureRegistry::new()),
            subscriptions,
            server_start_time: Instant::now(),
        }
    }
}

/// Who sent a request.
#[derive(Clone, Default)]
pub enum Caller {
    /// A WebSocket session.
    Session(Arc<ClientSession>),
    /// A one-shot HTTP request.
    #[default]
    Http,
}

impl Caller {
    /// The WebSocket session, for methods that need one.
    pub fn session(&self) -> Result<&Arc<ClientSession>> {
        match self {
            Self::Session(session) => Ok(session),
            Self::Http => Err(RcError::invalid_request("this method needs a WebSocket session")),
        }
    }
}
