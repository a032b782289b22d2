use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Token for [`App::run`](crate::app::App::run), cancelled on the first
/// SIGTERM or SIGINT.
///
/// Cancelling it stops the dashboard, closes open scan-event streams and
/// shuts the job manager down in its configured mode. If the signal
/// handlers cannot be installed the error is logged and only the caller can
/// cancel the token.
pub fn install_shutdown_handler() -> CancellationToken {
    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();

    tokio::spawn(async move {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::error!(error = %e, signal = "SIGTERM", "Failed to install signal handler");
                return;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(sigint) => sigint,
            Err(e) => {
                tracing::error!(error = %e, signal = "SIGINT", "Failed to install signal handler");
                return;
            }
        };

        let received = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        tracing::info!(signal = received, "Stopping dashboard and job manager");
        trigger.cancel();
    });

    shutdown
}
