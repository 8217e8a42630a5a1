//! HTTP listener lifecycle: bind, serve, drain on SIGINT/SIGTERM.

use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::build_router;
use crate::config::ServerConfig;
use crate::delivery::DeliveryController;

/// Bind `config`'s address and serve until a shutdown signal arrives.
///
/// # Errors
///
/// Fails when the address cannot be bound, the server errors, or in-flight
/// requests do not drain within `shutdown_timeout_secs`.
pub async fn serve(config: &ServerConfig, controller: Arc<DeliveryController>) -> Result<()> {
    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind webhook listener on {addr}"))?;
    serve_with(
        listener,
        controller,
        shutdown_signal(),
        Duration::from_secs(config.shutdown_timeout_secs),
    )
    .await
}

/// Serve on an already-bound listener until `shutdown` resolves.
///
/// After `shutdown` resolves, in-flight requests get `drain_timeout` to finish.
///
/// # Errors
///
/// Fails on server I/O errors or when draining exceeds `drain_timeout`.
pub async fn serve_with(
    listener: TcpListener,
    controller: Arc<DeliveryController>,
    shutdown: impl Future<Output = ()> + Send + 'static,
    drain_timeout: Duration,
) -> Result<()> {
    let local = listener
        .local_addr()
        .context("failed to read listener address")?;
    info!(addr = %local, "webhook server listening");

    let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, build_router(controller))
        .with_graceful_shutdown(async move {
            shutdown.await;
            let _ = signalled_tx.send(());
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.context("webhook server failed")?;
        }
        Ok(()) = signalled_rx => {
            info!(timeout_secs = drain_timeout.as_secs(), "shutting down, draining connections");
            match tokio::time::timeout(drain_timeout, &mut server).await {
                Ok(result) => result.context("webhook server failed during shutdown")?,
                Err(_) => bail!("could not close connections in time, forcing shutdown"),
            }
        }
    }

    info!("webhook server closed");
    Ok(())
}

/// Resolve on SIGINT, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!(signal = "SIGINT", "received shutdown signal"),
        () = terminate => info!(signal = "SIGTERM", "received shutdown signal"),
    }
}
