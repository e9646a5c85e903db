use tokio::signal;
use tracing::{error, info};

/// Completes when SIGTERM or SIGINT is received.
///
/// If a handler cannot be registered, the error is logged and only the other
/// signal is awaited.
pub async fn graceful_shutdown() {
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to register SIGINT handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = terminate => info!("received SIGTERM, shutting down"),
        _ = interrupt => info!("received SIGINT, shutting down"),
    }
}
