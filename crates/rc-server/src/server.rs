//! `BridgeServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use rc_engine::{EngineEvent, EventSink};
use rc_presets::{PresetEvent, PresetListener};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::rpc::context::RpcContext;
use crate::rpc::handlers::register_all;
use crate::rpc::registry::MethodRegistry;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::session::run_ws_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Engine, presets and subscriptions.
    pub ctx: RpcContext,
    /// Method registry shared by both surfaces.
    pub registry: Arc<MethodRegistry>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The bridge server.
pub struct BridgeServer {
    state: AppState,
}

impl BridgeServer {
    /// Create a server with every method registered.
    ///
    /// Preset changes and engine events are routed to event subscribers
    /// from here on.
    pub fn new(config: ServerConfig, ctx: RpcContext) -> Self {
        let mut registry = MethodRegistry::new();
        register_all(&mut registry);
        install_bridges(&ctx);
        Self {
            state: AppState {
                ctx,
                registry: Arc::new(registry),
                config: Arc::new(config),
                shutdown: Arc::new(ShutdownCoordinator::new()),
                metrics: None,
            },
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .merge(crate::http::routes())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind, start the throttle flusher, and serve until shutdown.
    ///
    /// Returns the bound address (useful with port 0) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let config = &self.state.config;
        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        let addr = listener.local_addr()?;
        self.spawn_throttle_flush();

        let app = self.router();
        let token = self.state.shutdown.token();
        let serve = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "server stopped with an error");
            }
        });
        info!(%addr, "bridge server listening");
        Ok((addr, serve))
    }

    fn spawn_throttle_flush(&self) {
        let subscriptions = self.state.ctx.subscriptions.clone();
        let period = self.state.config.throttle_flush_interval();
        let token = self.state.shutdown.token();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let sent = subscriptions.flush_throttled(Instant::now());
                        if sent > 0 {
                            debug!(sent, "throttled notifications flushed");
                        }
                    }
                }
            }
        });
        self.state.shutdown.track(handle);
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Get the method registry.
    pub fn registry(&self) -> &Arc<MethodRegistry> {
        &self.state.registry
    }

    /// Get the handler context.
    pub fn context(&self) -> &RpcContext {
        &self.state.ctx
    }
}

/// Route preset and engine events to their subscribers.
fn install_bridges(ctx: &RpcContext) {
    let subscriptions = ctx.subscriptions.clone();
    let listener: PresetListener = Arc::new(move |event: &PresetEvent| {
        subscriptions.publish_event(PresetEvent::KIND, &event.payload());
    });
    ctx.presets.set_listener(listener);

    let subscriptions = ctx.subscriptions.clone();
    let sink: EventSink = Arc::new(move |event: &EngineEvent| {
        subscriptions.publish_event(event.kind(), &event.payload());
    });
    // later jobs run after this one, so no result is needed
    let _ = ctx.engine.submit(move |engine| {
        engine.set_event_sink(sink);
        Ok(())
    });
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let subs = &state.ctx.subscriptions;
    Json(health::health_check(
        state.ctx.server_start_time,
        subs.session_count(),
        subs.subscription_count(),
        state.ctx.presets.len(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            crate::metrics::render(handle),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// GET /ws
async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "server is shutting down").into_response();
    }
    let open = state.ctx.subscriptions.session_count();
    if open >= state.config.max_connections {
        warn!(open, max = state.config.max_connections, "connection limit reached");
        return (StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response();
    }
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| async move {
            let token = state.shutdown.token();
            let task = tokio::spawn(run_ws_session(
                socket,
                state.registry.clone(),
                state.ctx.clone(),
                state.config.clone(),
                token,
            ));
            state.shutdown.track(task);
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::handlers::test_helpers::{LIGHT, make_test_context};
    use axum::body::Body;
    use axum::http::Request;
    use rc_core::{Value, WireCodec, WireFormat};
    use tower::ServiceExt;

    fn make_server() -> BridgeServer {
        BridgeServer::new(ServerConfig::default(), make_test_context())
    }

    async fn body_value(resp: Response) -> Value {
        let format = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(WireFormat::from_mime)
            .unwrap_or_default();
        let bytes = axum::body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
        WireCodec::decode(&bytes, format).unwrap()
    }

    fn request(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    #[test]
    fn every_method_registered() {
        let server = make_server();
        assert!(server.registry().has_method("object.get"));
        assert!(server.registry().has_method("subscription.subscribe"));
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let app = make_server().router();
        let resp = app.oneshot(request("GET", "/health", "")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert!(parsed["connections"].is_number());
        assert!(parsed["subscriptions"].is_number());
        assert!(parsed["presets"].is_number());
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_404() {
        let app = make_server().router();
        let resp = app.oneshot(request("GET", "/metrics", "")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = make_server().router();
        let resp = app.oneshot(request("GET", "/nonexistent", "")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ws_without_upgrade_is_rejected() {
        let app = make_server().router();
        let resp = app.oneshot(request("GET", "/ws", "")).await.unwrap();
        assert!(resp.status().is_client_error());
        assert_ne!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn property_put_then_get() {
        let app = make_server().router();
        let uri = format!("/remote/property?path={LIGHT}.Intensity");

        let put = app.clone().oneshot(request("PUT", &uri, "4.5")).await.unwrap();
        assert_eq!(put.status(), StatusCode::OK);

        let got = app.oneshot(request("GET", &uri, "")).await.unwrap();
        assert_eq!(got.status(), StatusCode::OK);
        assert_eq!(body_value(got).await, Value::Float(4.5));
    }

    #[tokio::test]
    async fn error_codes_map_to_status() {
        let app = make_server().router();

        let missing = app
            .clone()
            .oneshot(request("GET", &format!("/remote/property?path={LIGHT}.Nope"), ""))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        let body = body_value(missing).await;
        assert_eq!(body.get("code"), Some(&Value::from("NOT_FOUND")));
        assert_eq!(body.get("segment"), Some(&Value::from("Nope")));

        let read_only = app
            .clone()
            .oneshot(request("PUT", &format!("/remote/property?path={LIGHT}.Serial"), "3"))
            .await
            .unwrap();
        assert_eq!(read_only.status(), StatusCode::FORBIDDEN);

        let blob = app
            .oneshot(request(
                "PUT",
                &format!("/remote/property?path={LIGHT}.Intensity"),
                "\"@bytes:AAEC\"",
            ))
            .await
            .unwrap();
        assert_eq!(blob.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn preset_routes() {
        let app = make_server().router();

        let created = app
            .clone()
            .oneshot(request("POST", "/remote/presets", r#"{"name":"Lights"}"#))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::OK);

        let bind_body = format!(r#"{{"path":"{LIGHT}.Intensity"}}"#);
        let bound = app
            .clone()
            .oneshot(request("PUT", "/remote/preset/Lights/binding/Brightness", &bind_body))
            .await
            .unwrap();
        assert_eq!(bound.status(), StatusCode::OK);

        let again = app
            .clone()
            .oneshot(request("PUT", "/remote/preset/Lights/binding/Brightness", &bind_body))
            .await
            .unwrap();
        assert_eq!(again.status(), StatusCode::CONFLICT);

        let set = app
            .clone()
            .oneshot(request("PUT", "/remote/preset/Lights/property/Brightness", "2.0"))
            .await
            .unwrap();
        assert_eq!(set.status(), StatusCode::OK);

        let fields = app
            .oneshot(request("GET", "/remote/preset/Lights/fields", ""))
            .await
            .unwrap();
        let fields = body_value(fields).await;
        assert_eq!(fields.as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn shutdown_propagates_to_coordinator() {
        let server = make_server();
        assert!(!server.shutdown().is_shutting_down());
        server.shutdown().shutdown();
        assert!(server.shutdown().is_shutting_down());
    }
}
