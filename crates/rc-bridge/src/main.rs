//! # rc-bridge
//!
//! Remote-control bridge binary. Loads settings, starts the engine thread
//! with the demo scene, opens the preset registry, and serves HTTP and
//! WebSocket clients until Ctrl-C.

#![deny(unsafe_code)]

mod demo;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use rc_core::WireCodec;
use rc_engine::{EngineConfig, EngineContext};
use rc_presets::{FsPresetStore, MemoryPresetStore, PresetRegistry, PresetStore};
use rc_server::metrics::install_recorder;
use rc_server::{BridgeServer, RpcContext, ServerConfig, SubscriptionManager};
use rc_settings::{BridgeSettings, LogLevel, load_settings_from_path, settings_path};
use tracing::{info, warn};

/// Remote-control bridge server.
#[derive(Parser, Debug)]
#[command(name = "rc-bridge", about = "Remote-control bridge for a live engine")]
struct Cli {
    /// Settings file (defaults to `~/.rc-bridge/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Log level: trace, debug, info, warn, error (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,

    /// Keep presets in memory only.
    #[arg(long)]
    no_autosave: bool,
}

impl Cli {
    fn apply(&self, settings: &mut BridgeSettings) -> Result<()> {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level =
                LogLevel::parse(level).with_context(|| format!("Unknown log level: {level}"))?;
        }
        if self.json_logs {
            settings.logging.json = true;
        }
        if self.no_autosave {
            settings.presets.autosave = false;
        }
        Ok(())
    }
}

/// Everything `main` has to tear down.
struct Bridge {
    server: Arc<BridgeServer>,
    engine: EngineContext,
    presets: Arc<PresetRegistry>,
}

async fn open_presets(settings: &BridgeSettings) -> Result<Arc<PresetRegistry>> {
    let store: Arc<dyn PresetStore> = if settings.presets.autosave {
        let dir = settings.presets.resolved_directory();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create preset directory: {}", dir.display()))?;
        info!(dir = %dir.display(), "presets stored on disk");
        Arc::new(FsPresetStore::new(dir))
    } else {
        Arc::new(MemoryPresetStore::new())
    };
    let registry = PresetRegistry::open(store).await.context("Failed to load presets")?;
    Ok(Arc::new(registry))
}

async fn build(settings: &BridgeSettings, metrics: Option<PrometheusHandle>) -> Result<Bridge> {
    let tick = settings.engine.tick_interval();
    let engine = EngineContext::spawn(
        demo::scene(),
        EngineConfig {
            request_timeout: settings.engine.request_timeout(),
            tick_interval: (!tick.is_zero()).then_some(tick),
        },
    )
    .context("Failed to start engine thread")?;

    let presets = open_presets(settings).await?;
    let ctx = RpcContext::new(
        engine.clone(),
        Arc::clone(&presets),
        SubscriptionManager::new(Arc::new(WireCodec)),
    );
    let mut server = BridgeServer::new(ServerConfig::from_settings(settings), ctx);
    if let Some(handle) = metrics {
        server = server.with_metrics(handle);
    }
    let server = Arc::new(server);
    Ok(Bridge {
        server,
        engine,
        presets,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let path = args.settings.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    args.apply(&mut settings)?;

    rc_core::logging::init_subscriber(settings.logging.level.as_filter_str(), settings.logging.json);

    let metrics = install_recorder()
        .inspect_err(|e| warn!(error = %e, "metrics recorder not installed"))
        .ok();
    let bridge = build(&settings, metrics).await?;

    let (addr, handle) = bridge.server.listen().await.context("Failed to bind server")?;
    let method_count = bridge.server.registry().methods().len();
    info!("rc-bridge listening on http://{addr} ({method_count} methods registered)");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    info!("shutting down");
    let shutdown = Arc::clone(bridge.server.shutdown());
    shutdown
        .graceful_shutdown(Some(bridge.server.config().shutdown_timeout()))
        .await;
    let _ = handle.await;

    if let Err(e) = bridge.presets.flush().await {
        warn!(error = %e, "preset flush failed");
    }
    bridge.engine.shutdown();
    let engine = bridge.engine.clone();
    tokio::task::spawn_blocking(move || engine.join())
        .await
        .context("Engine join task failed")?;
    Ok(())
}
