//! Server configuration.

use std::time::Duration;

use rc_settings::BridgeSettings;
use serde::{Deserialize, Serialize};

/// Configuration for the bridge server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close a connection that has not answered a ping for this long.
    pub heartbeat_timeout_secs: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Per-session outbound queue bound.
    pub outbound_queue_capacity: usize,
    /// Flush period for throttled subscriptions, in milliseconds.
    pub throttle_flush_interval_ms: u64,
    /// How long shutdown waits for connections to drain.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 64,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 16 * 1024 * 1024,
            outbound_queue_capacity: 256,
            throttle_flush_interval_ms: 10,
            shutdown_timeout_secs: 5,
        }
    }
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &BridgeSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_connections: settings.server.max_connections,
            heartbeat_interval_secs: settings.server.heartbeat_interval_secs,
            heartbeat_timeout_secs: settings.server.heartbeat_timeout_secs,
            max_message_size: settings.server.max_message_size,
            outbound_queue_capacity: settings.server.outbound_queue_capacity,
            throttle_flush_interval_ms: settings.engine.throttle_flush_interval_ms,
            ..Self::default()
        }
    }

    /// Heartbeat interval as a [`Duration`].
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    /// Heartbeat timeout as a [`Duration`].
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs.max(1))
    }

    /// Throttle flush period as a [`Duration`].
    pub fn throttle_flush_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_flush_interval_ms.max(1))
    }

    /// Shutdown drain timeout as a [`Duration`].
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
