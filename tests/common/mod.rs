//! Shared utilities for integration and load testing.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;

use edge_gateway::config::{GatewayConfig, LiveSettings};
use edge_gateway::context::{Attributes, DefaultStateFactory, SessionContext};
use edge_gateway::engine::FilterChain;
use edge_gateway::error::FilterError;
use edge_gateway::filter::{
    reload_now, run_reloader, BoxFuture, Filter, FilterLoader, FilterPhase, FilterRegistry,
    RegistryError, ReloadTrigger, SharedFilter,
};
use edge_gateway::http::GatewayServer;
use edge_gateway::lifecycle::Shutdown;

/// Filter backed by a synchronous closure.
pub struct FnFilter<F> {
    name: &'static str,
    phase: FilterPhase,
    order: i32,
    f: F,
}

impl<F> Filter<Attributes> for FnFilter<F>
where
    F: Fn(&mut SessionContext<Attributes>) -> Result<(), FilterError> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        self.name
    }

    fn phase(&self) -> FilterPhase {
        self.phase
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn apply<'a>(
        &'a self,
        ctx: &'a mut SessionContext<Attributes>,
    ) -> BoxFuture<'a, Result<(), FilterError>> {
        Box::pin(async move { (self.f)(ctx) })
    }
}

pub fn filter<F>(name: &'static str, phase: FilterPhase, order: i32, f: F) -> SharedFilter<Attributes>
where
    F: Fn(&mut SessionContext<Attributes>) -> Result<(), FilterError> + Send + Sync + 'static,
{
    Arc::new(FnFilter { name, phase, order, f })
}

/// Filter that sleeps before succeeding.
pub struct SleepFilter {
    pub name: &'static str,
    pub phase: FilterPhase,
    pub delay: Duration,
}

impl Filter<Attributes> for SleepFilter {
    fn name(&self) -> &str {
        self.name
    }

    fn phase(&self) -> FilterPhase {
        self.phase
    }

    fn order(&self) -> i32 {
        0
    }

    fn apply<'a>(
        &'a self,
        _ctx: &'a mut SessionContext<Attributes>,
    ) -> BoxFuture<'a, Result<(), FilterError>> {
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            Ok(())
        })
    }
}

/// A running gateway bound to an ephemeral port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub registry: Arc<FilterRegistry<Attributes>>,
    pub config_tx: mpsc::UnboundedSender<GatewayConfig>,
    pub reload_tx: mpsc::UnboundedSender<ReloadTrigger>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a gateway whose loader always yields `filters`.
pub async fn start_gateway(config: GatewayConfig, filters: Vec<SharedFilter<Attributes>>) -> TestGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let registry = Arc::new(FilterRegistry::<Attributes>::empty());
    registry.set_disabled(config.filters.disabled.clone());
    let loader: Arc<dyn FilterLoader<Attributes>> =
        Arc::new(move || -> Result<Vec<SharedFilter<Attributes>>, RegistryError> { Ok(filters.clone()) });
    reload_now(&registry, loader.as_ref(), ReloadTrigger::Manual).unwrap();

    let settings = Arc::new(LiveSettings::from_config(&config));
    let chain = Arc::new(FilterChain::new(registry.clone(), DefaultStateFactory).with_settings(settings));

    let shutdown = Shutdown::new();
    let (reload_tx, reload_rx) = mpsc::unbounded_channel();
    let (config_tx, config_rx) = mpsc::unbounded_channel();

    tokio::spawn(run_reloader(registry.clone(), loader, reload_rx, shutdown.subscribe()));

    let server = GatewayServer::new(config, chain).with_reload_trigger(reload_tx.clone());
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, config_rx, server_shutdown).await;
    });

    TestGateway {
        addr,
        shutdown,
        registry,
        config_tx,
        reload_tx,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
