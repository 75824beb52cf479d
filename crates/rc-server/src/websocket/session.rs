//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use rc_core::{Value, WireCodec, WireFormat};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::ServerConfig;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
};
use crate::rpc::context::{Caller, RpcContext};
use crate::rpc::registry::MethodRegistry;
use crate::rpc::types::{CONNECTION_ESTABLISHED, RpcEvent};

use super::connection::{ClientSession, Frame};
use super::handler::{encode_response, handle_message};
use super::heartbeat::{HeartbeatResult, run_heartbeat};

/// Run a WebSocket session until the client leaves, stops answering pings,
/// or the server shuts down.
///
/// 1. Registers the session and queues `connection.established`
/// 2. Starts the socket writer and the heartbeat
/// 3. Dispatches each inbound frame in arrival order; replies use the
///    frame's format
/// 4. On exit, drops the session's subscriptions and releases their hooks
pub async fn run_ws_session(
    ws: WebSocket,
    registry: Arc<MethodRegistry>,
    ctx: RpcContext,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
) {
    let session = Arc::new(ClientSession::new(config.outbound_queue_capacity, shutdown.child_token()));
    ctx.subscriptions.register_session(session.clone());
    run_registered(ws, session, registry, ctx, config).await;
}

#[instrument(skip_all, fields(session_id = %session.id))]
async fn run_registered(
    ws: WebSocket,
    session: Arc<ClientSession>,
    registry: Arc<MethodRegistry>,
    ctx: RpcContext,
    config: Arc<ServerConfig>,
) {
    let started = Instant::now();
    let cancel = session.cancel_token().clone();
    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let hello = RpcEvent::new(
        CONNECTION_ESTABLISHED,
        Value::map([("sessionId", Value::from(session.id.as_str()))]),
    );
    match WireCodec::encode(&hello.to_value(), WireFormat::Json) {
        Ok(bytes) => {
            let _ = session.push_response(bytes, WireFormat::Json);
        }
        Err(e) => warn!(error = %e, "failed to encode connection event"),
    }

    let (mut ws_tx, mut ws_rx) = ws.split();

    let writer_session = session.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = writer_session.recv().await {
            let message = match frame {
                Frame::Data {
                    bytes,
                    format: WireFormat::Json,
                } => match String::from_utf8(bytes) {
                    Ok(text) => Message::Text(text.into()),
                    Err(e) => {
                        warn!(error = %e, "JSON frame is not UTF-8, skipped");
                        continue;
                    }
                },
                Frame::Data {
                    bytes,
                    format: WireFormat::Cbor,
                } => Message::Binary(bytes.into()),
                Frame::Ping => Message::Ping(Bytes::new()),
            };
            if ws_tx.send(message).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let heartbeat_session = session.clone();
    let heartbeat_cancel = cancel.clone();
    let interval = config.heartbeat_interval();
    let timeout = config.heartbeat_timeout();
    let heartbeat = tokio::spawn(async move {
        if run_heartbeat(heartbeat_session.clone(), interval, timeout, heartbeat_cancel).await
            == HeartbeatResult::TimedOut
        {
            warn!(?timeout, "client unresponsive, disconnecting");
            heartbeat_session.close();
        }
    });

    let caller = Caller::Session(session.clone());
    loop {
        let inbound = tokio::select! {
            () = cancel.cancelled() => break,
            inbound = ws_rx.next() => inbound,
        };
        let message = match inbound {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                debug!(error = %e, "socket error");
                break;
            }
            None => break,
        };
        session.mark_alive();
        let (payload, format) = match message {
            Message::Text(text) => (Bytes::copy_from_slice(text.as_str().as_bytes()), WireFormat::Json),
            Message::Binary(data) => (data, WireFormat::Cbor),
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
        };
        session.set_format(format);

        let reply = handle_message(&payload, format, &registry, &ctx, &caller);
        let responder = session.clone();
        let _ = tokio::spawn(async move {
            let response = reply.await;
            if let Some(bytes) = encode_response(&response, format) {
                if !responder.push_response(bytes, format) {
                    debug!("session closed before the response was queued");
                }
            }
        });
    }

    info!("client disconnected");
    ctx.subscriptions.teardown_session(&ctx.engine, &session.id);
    cancel.cancel();
    heartbeat.abort();
    writer.abort();
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
}
