//! # rc-server
//!
//! Axum HTTP + `WebSocket` surface of the bridge.
//!
//! - `WebSocket` gateway: per-session outbox, heartbeat, JSON text or CBOR
//!   binary frames, requests applied on the engine in receipt order
//! - REST routes under `/remote` that reuse the same method registry
//! - Subscriptions: one engine change hook per watched property, immediate or
//!   throttled delivery, teardown on disconnect
//! - `/health`, Prometheus `/metrics`, graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod http;
pub mod metrics;
pub mod rpc;
pub mod server;
pub mod shutdown;
pub mod subscriptions;
pub mod websocket;

pub use config::ServerConfig;
pub use rpc::context::{Caller, RpcContext};
pub use rpc::registry::{MethodHandler, MethodRegistry};
pub use server::BridgeServer;
pub use shutdown::ShutdownCoordinator;
pub use subscriptions::{DeliveryMode, SubscriptionManager, SubscriptionTarget};
