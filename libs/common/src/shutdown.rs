//! Shutdown signal handling

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Wait for Ctrl+C, or SIGTERM on Unix
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let term_signal = match signal(SignalKind::terminate()) {
            Ok(sig) => Some(sig),
            Err(e) => {
                warn!("SIGTERM handler: {}, Ctrl+C only", e);
                None
            },
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                match term_signal {
                    Some(mut sig) => {
                        sig.recv().await;
                    },
                    None => std::future::pending::<()>().await,
                }
            } => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Cancel `token` on the first shutdown signal
///
/// Returns early, without cancelling, if the token is cancelled elsewhere.
pub async fn cancel_on_shutdown(token: CancellationToken) {
    tokio::select! {
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received");
            token.cancel();
        },
        _ = token.cancelled() => {},
    }
}
