use tracing::info;

use super::orchestrator::NodeApp;
use super::types::ShutdownReason;
use crate::error::{NodeError, Result};

impl NodeApp {
    /// Blocks until Ctrl+C (or SIGTERM on Unix), then runs graceful shutdown.
    pub fn run(&mut self) -> Result<i32> {
        info!("sentryd is running");

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| NodeError::system(format!("failed to build signal-wait runtime: {}", e)))?;

        let reason = runtime.block_on(wait_for_signal());
        info!(?reason, "shutdown initiated");

        self.shutdown(reason)
    }
}

async fn wait_for_signal() -> ShutdownReason {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return ShutdownReason::Signal("SIGINT".to_string());
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => ShutdownReason::Signal("SIGINT".to_string()),
            _ = sigterm.recv() => ShutdownReason::Signal("SIGTERM".to_string()),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        ShutdownReason::Signal("SIGINT".to_string())
    }
}
