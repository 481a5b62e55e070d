use std::sync::atomic::Ordering;

use tracing::{info, warn};

use super::orchestrator::NodeApp;
use super::types::{ComponentState, ShutdownReason};
use crate::error::Result;

impl NodeApp {
    /// Stops every thread in dependency order and waits for each to exit.
    ///
    /// The streaming thread is not joined: axum has no handle into it from
    /// here, and it carries no pipeline state, so leaving it running until
    /// process exit is harmless.
    pub fn shutdown(&mut self, reason: ShutdownReason) -> Result<i32> {
        info!(?reason, "beginning graceful shutdown");
        let mut exit_code = 0;

        self.component_states.set("capture", ComponentState::Stopping);
        self.stop_capture.store(true, Ordering::Relaxed);
        if let Some(handle) = self.capture_thread.take() {
            if handle.join().is_err() {
                warn!("capture thread panicked during shutdown");
                exit_code = 1;
            }
        }
        self.component_states.set("capture", ComponentState::Stopped);

        self.component_states.set("analysis", ComponentState::Stopping);
        self.analysis_tx.take();
        if let Some(handle) = self.analysis_thread.take() {
            if handle.join().is_err() {
                warn!("analysis thread panicked during shutdown");
                exit_code = 1;
            }
        }
        self.component_states.set("analysis", ComponentState::Stopped);

        self.component_states.set("cloud", ComponentState::Stopping);
        self.cloud_tx.take();
        if let Some(handle) = self.cloud_thread.take() {
            if handle.join().is_err() {
                warn!("cloud thread panicked during shutdown");
                exit_code = 1;
            }
        }
        self.component_states.set("cloud", ComponentState::Stopped);

        info!(exit_code, "graceful shutdown complete");
        Ok(exit_code)
    }
}
