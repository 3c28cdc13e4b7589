//! Edge gateway binary.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────▶ http server ──▶ adapter ──▶ PRE ──▶ ROUTE ──▶ POST ──┐
//!                                               │        │        │   │
//!                                               └────────┴──▶ ERROR   │
//!     Client Response                                          │      │
//!     ◀────────── http server ◀── adapter ◀────────────────────┴──────┘
//!
//!     config watcher ──▶ live settings + filter reloader
//!     signals        ──▶ shutdown / reload
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use edge_gateway::config::{load_config, ConfigWatcher, GatewayConfig, LiveSettings};
use edge_gateway::context::{Attributes, DefaultStateFactory};
use edge_gateway::engine::FilterChain;
use edge_gateway::filter::{
    reload_now, run_reloader, EchoFilter, FilterLoader, FilterRegistry, RegistryError,
    ReloadTrigger, SharedFilter,
};
use edge_gateway::http::GatewayServer;
use edge_gateway::lifecycle::{signals::spawn_signal_handlers, Shutdown};
use edge_gateway::observability::{logging::init_logging, metrics::init_metrics};

#[derive(Parser, Debug)]
#[command(name = "edge-gateway", version, about = "Filter-chain HTTP edge gateway")]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn builtin_filters() -> Result<Vec<SharedFilter<Attributes>>, RegistryError> {
    let echo: SharedFilter<Attributes> = Arc::new(EchoFilter);
    Ok(vec![echo])
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "edge-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        max_body_bytes = config.request.max_body_bytes,
        deadline_secs = config.request.deadline_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let registry = Arc::new(FilterRegistry::<Attributes>::empty());
    registry.set_disabled(config.filters.disabled.clone());
    let loader: Arc<dyn FilterLoader<Attributes>> = Arc::new(builtin_filters);
    reload_now(&registry, loader.as_ref(), ReloadTrigger::Manual)?;

    let settings = Arc::new(LiveSettings::from_config(&config));
    let chain = Arc::new(FilterChain::new(registry.clone(), DefaultStateFactory).with_settings(settings));

    let shutdown = Shutdown::new();
    let (reload_tx, reload_rx) = mpsc::unbounded_channel();
    let reloader = tokio::spawn(run_reloader(
        registry.clone(),
        loader,
        reload_rx,
        shutdown.subscribe(),
    ));
    let signals = spawn_signal_handlers(shutdown.clone(), reload_tx.clone());

    // The watcher handle must outlive the server.
    let (config_updates, _watcher) = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (updates, Some(watcher.run()?))
        }
        None => {
            let (_tx, updates) = mpsc::unbounded_channel();
            (updates, None)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = GatewayServer::new(config, chain).with_reload_trigger(reload_tx);
    let result = server.run(listener, config_updates, shutdown.subscribe()).await;

    shutdown.trigger();
    let _ = tokio::join!(reloader, signals);

    result?;
    tracing::info!("Shutdown complete");
    Ok(())
}
