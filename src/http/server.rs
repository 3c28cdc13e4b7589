//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum Router with a catch-all handler into the adapter
//! - Wire up middleware (tracing, concurrency limit)
//! - Serve with graceful shutdown
//! - Apply configuration updates to live settings and the filter registry

use std::io;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{Request, Response},
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::GatewayConfig;
use crate::engine::FilterChain;
use crate::filter::ReloadTrigger;
use crate::http::adapter::{ConnectionAddrs, TransportAdapter};

/// HTTP front end for the filter chain.
pub struct GatewayServer<T> {
    config: GatewayConfig,
    adapter: Arc<TransportAdapter<T>>,
    reload_tx: Option<mpsc::UnboundedSender<ReloadTrigger>>,
}

impl<T: Send + 'static> GatewayServer<T> {
    /// Create a server. The config is applied to the chain's live settings.
    pub fn new(config: GatewayConfig, chain: Arc<FilterChain<T>>) -> Self {
        chain.settings().apply(&config);
        chain.registry().set_disabled(config.filters.disabled.clone());
        Self {
            config,
            adapter: Arc::new(TransportAdapter::new(chain)),
            reload_tx: None,
        }
    }

    /// Request a filter reload whenever a config update arrives.
    pub fn with_reload_trigger(mut self, reload_tx: mpsc::UnboundedSender<ReloadTrigger>) -> Self {
        self.reload_tx = Some(reload_tx);
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn adapter(&self) -> &Arc<TransportAdapter<T>> {
        &self.adapter
    }

    /// Build the Axum router with all middleware layers.
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(dispatch::<T>)
            .with_state(self.adapter.clone())
            .layer(ConcurrencyLimitLayer::new(self.config.listener.max_connections))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Gateway server starting");

        let updater = tokio::spawn(apply_updates(
            self.adapter.clone(),
            self.config.clone(),
            self.reload_tx.clone(),
            config_updates,
            shutdown.resubscribe(),
        ));

        let app = self
            .router()
            .into_make_service_with_connect_info::<ConnectionAddrs>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        updater.abort();
        tracing::info!("Gateway server stopped");
        Ok(())
    }
}

async fn dispatch<T: Send + 'static>(
    State(adapter): State<Arc<TransportAdapter<T>>>,
    request: Request<Body>,
) -> Response<Body> {
    adapter.handle(request).await
}

async fn apply_updates<T: Send + 'static>(
    adapter: Arc<TransportAdapter<T>>,
    mut current: GatewayConfig,
    reload_tx: Option<mpsc::UnboundedSender<ReloadTrigger>>,
    mut updates: mpsc::UnboundedReceiver<GatewayConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(config) = update else { break };
                if config == current {
                    tracing::debug!("Config unchanged, skipping update");
                    continue;
                }
                if config.listener != current.listener {
                    tracing::warn!("Listener settings changed; a restart is required to apply them");
                }

                let chain = adapter.chain();
                chain.settings().apply(&config);
                chain.registry().set_disabled(config.filters.disabled.clone());
                if let Some(tx) = &reload_tx {
                    if tx.send(ReloadTrigger::ConfigChange).is_err() {
                        tracing::warn!("Filter reloader is gone, skipping reload");
                    }
                }
                current = config;
            }
            _ = shutdown.recv() => break,
        }
    }
}
