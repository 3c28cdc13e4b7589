//! OS signal handling.
//!
//! # Responsibilities
//! - Translate Ctrl-C / SIGTERM into a graceful shutdown
//! - Translate SIGHUP into a filter reload

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::filter::ReloadTrigger;
use crate::lifecycle::Shutdown;

/// Spawn the signal listener task. It exits after triggering shutdown.
pub fn spawn_signal_handlers(
    shutdown: Shutdown,
    reload_tx: mpsc::UnboundedSender<ReloadTrigger>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stop = shutdown.subscribe();
        tokio::select! {
            _ = terminate_signal() => {
                tracing::info!("Shutdown signal received");
                shutdown.trigger();
            }
            _ = forward_hangups(reload_tx) => {}
            _ = stop.recv() => {}
        }
    })
}

async fn terminate_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(unix)]
async fn forward_hangups(reload_tx: mpsc::UnboundedSender<ReloadTrigger>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangups = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for SIGHUP");
            return std::future::pending().await;
        }
    };

    while hangups.recv().await.is_some() {
        tracing::info!("SIGHUP received, reloading filters");
        if reload_tx.send(ReloadTrigger::Signal).is_err() {
            break;
        }
    }
    std::future::pending::<()>().await;
}

#[cfg(not(unix))]
async fn forward_hangups(_reload_tx: mpsc::UnboundedSender<ReloadTrigger>) {
    std::future::pending::<()>().await;
}
