/// Waits for `SIGINT` or `SIGTERM` (`Ctrl+C` only on non-Unix). Used to
/// trigger cancellation of the root leader context (`SPEC_FULL.md` §6,
/// "Process surface").
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt()).expect("install SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");

        tokio::select! {
            _ = sigint.recv()  => tracing::warn!("received SIGINT"),
            _ = sigterm.recv() => tracing::warn!("received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("install Ctrl+C handler");
        tracing::warn!("received Ctrl+C");
    }
}

/// Waits for a second shutdown signal, so an operator stuck behind a slow
/// graceful drain can force an immediate exit by signalling twice.
pub async fn force_shutdown_signal() {
    shutdown_signal().await;
    tracing::warn!("second signal received; forcing immediate exit");
}
