use anyhow::Result;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Resolves on the first Ctrl+C or SIGTERM.
pub async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate()).map_err(|e| {
        tracing::error!(%e, "Failed to install SIGTERM handler");
        e
    })?;

    #[cfg(unix)]
    let sigterm = async move {
        terminate.recv().await;
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        result = signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(%e, "Error handling Ctrl+C signal");
                return Err(e.into());
            }
            tracing::info!("Received Ctrl+C signal");
        },
        _ = sigterm => tracing::info!("Received SIGTERM signal"),
    }

    tracing::info!("Shutdown signal received, initiating graceful shutdown");
    Ok(())
}

/// Cancel `token` once a termination signal arrives. Returns early, without
/// cancelling, if someone else cancels the token first.
pub async fn cancel_on_shutdown(token: CancellationToken) -> Result<()> {
    tokio::select! {
        result = wait_for_shutdown() => {
            token.cancel();
            result
        }
        _ = token.cancelled() => Ok(()),
    }
}
