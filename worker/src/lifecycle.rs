//! Shutdown signal handling and background task draining.

use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Time each background task gets to stop after shutdown is broadcast.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Wait for Ctrl+C or SIGTERM.
///
/// A handler that fails to install is logged and never fires, so the
/// other signal still works.
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal"),
        () = terminate => info!("Received SIGTERM signal"),
    }
}

/// Await named background tasks, giving each [`DRAIN_TIMEOUT`] to finish.
pub async fn await_shutdown(handles: Vec<(&'static str, JoinHandle<()>)>) {
    for (task, handle) in handles {
        match tokio::time::timeout(DRAIN_TIMEOUT, handle).await {
            Ok(Ok(())) => info!(task, "Task stopped gracefully"),
            Ok(Err(e)) => warn!(task, error = %e, "Task failed"),
            Err(_) => warn!(task, "Task shutdown timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_await_shutdown_gives_up_on_stuck_task() {
        let finished = tokio::spawn(async {});
        let stuck = tokio::spawn(std::future::pending::<()>());

        let started = tokio::time::Instant::now();
        await_shutdown(vec![("finished", finished), ("stuck", stuck)]).await;

        assert!(started.elapsed() >= DRAIN_TIMEOUT);
    }
}
