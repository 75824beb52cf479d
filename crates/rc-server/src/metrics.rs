//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus recorder as the global `metrics` recorder.
///
/// Returns the handle used by `/metrics`. Fails if a recorder is already
/// installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// Requests handled (counter, labels: method).
pub const RC_REQUESTS_TOTAL: &str = "rc_requests_total";
/// Failed requests (counter, labels: method, code).
pub const RC_ERRORS_TOTAL: &str = "rc_errors_total";
/// Request duration (histogram, labels: method).
pub const RC_REQUEST_DURATION_SECONDS: &str = "rc_request_duration_seconds";
/// WebSocket connections opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Open WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Notifications queued for delivery (counter).
pub const RC_NOTIFICATIONS_TOTAL: &str = "rc_notifications_total";
/// Notifications dropped by outbox overflow (counter).
pub const RC_NOTIFICATIONS_DROPPED_TOTAL: &str = "rc_notifications_dropped_total";
/// Active subscriptions (gauge).
pub const RC_SUBSCRIPTIONS_ACTIVE: &str = "rc_subscriptions_active";

pub use rc_engine::context::{
    ENGINE_JOBS_TOTAL as RC_ENGINE_JOBS_TOTAL, ENGINE_TIMEOUTS_TOTAL as RC_ENGINE_TIMEOUTS_TOTAL,
};
