//! Process lifecycle helpers.

use tokio::signal;
use tracing::{error, info};

/// Resolve once the process is asked to stop (Ctrl+C or SIGTERM).
///
/// Passed to `axum::serve(..).with_graceful_shutdown`, so in-flight requests
/// drain and release their reservations before the table is cleared. A signal
/// source that cannot be installed is logged and never fires; the other one
/// still works.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let source = tokio::select! {
        () = ctrl_c => "SIGINT",
        () = terminate => "SIGTERM",
    };

    info!(signal = source, "Shutdown requested, draining in-flight requests");
}
