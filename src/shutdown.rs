/// Shutdown signal handling
///
/// Blocks until the process receives Ctrl-C (or SIGTERM on unix). The caller
/// then walks the ServiceManager's reverse stop order: stream shards stop
/// feeding, the dispatcher drains its in-flight batch under its deadline, and
/// the price task exits.
use crate::logger::{self, LogTag};

/// Wait for an interrupt or termination signal
pub async fn wait_for_shutdown_signal() -> Result<(), String> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| format!("Failed to install SIGTERM handler: {}", e))?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.map_err(|e| format!("Failed to listen for Ctrl-C: {}", e))?;
                logger::info(LogTag::System, "Ctrl-C received, shutting down");
            }
            _ = sigterm.recv() => {
                logger::info(LogTag::System, "SIGTERM received, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| format!("Failed to listen for Ctrl-C: {}", e))?;
        logger::info(LogTag::System, "Ctrl-C received, shutting down");
    }

    Ok(())
}
