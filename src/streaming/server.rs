use std::net::ToSocketAddrs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use tracing::info;

use crate::config::StreamConfig;
use crate::core::{FrameRingQueue, SharedState};
use crate::error::{NodeError, StreamError};

use super::handlers;

/// Everything an axum handler needs; cloned per connection, cheap because
/// every field is an `Arc`.
#[derive(Clone)]
pub struct ServerState {
    pub shared: Arc<SharedState>,
    pub frame_ring: Arc<FrameRingQueue>,
    pub record_dir: PathBuf,
    pub target_frame_interval: Duration,
}

/// Threaded HTTP server exposing live state and package directories.
///
/// Handlers are read-only with respect to the capture loop: they take the
/// shared lock just long enough to copy out a snapshot, or read files
/// directly from disk, and never block capture on a client's socket.
pub struct StreamServer {
    config: StreamConfig,
    state: ServerState,
}

impl StreamServer {
    pub fn new(
        config: StreamConfig,
        shared: Arc<SharedState>,
        frame_ring: Arc<FrameRingQueue>,
        record_dir: PathBuf,
        target_fps: f64,
    ) -> Self {
        let target_frame_interval = Duration::from_secs_f64(1.0 / target_fps.max(1.0));
        Self {
            config,
            state: ServerState {
                shared,
                frame_ring,
                record_dir,
                target_frame_interval,
            },
        }
    }

    pub async fn start(self) -> Result<(), NodeError> {
        let app = Router::new()
            .route("/health", get(handlers::health_handler))
            .route("/results.json", get(handlers::results_handler))
            .route("/video.mjpg", get(handlers::mjpeg_handler))
            .route("/frame.jpg", get(handlers::frame_handler))
            .route("/events", get(handlers::events_list_handler))
            .route("/events/:filename", get(handlers::events_file_handler))
            .with_state(self.state);

        let addr_str = format!("{}:{}", self.config.host, self.config.port);
        let addr = addr_str
            .to_socket_addrs()
            .map_err(|e| {
                NodeError::Stream(StreamError::BindFailed {
                    address: addr_str.clone(),
                    source: e,
                })
            })?
            .next()
            .ok_or_else(|| {
                NodeError::Stream(StreamError::StartupFailed {
                    details: format!("no resolvable address for {}", addr_str),
                })
            })?;

        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            NodeError::Stream(StreamError::BindFailed {
                address: addr_str.clone(),
                source: e,
            })
        })?;

        info!(address = %addr_str, "http server listening");
        axum::serve(listener, app)
            .await
            .map_err(|e| NodeError::Stream(StreamError::StartupFailed { details: e.to_string() }))
    }
}
