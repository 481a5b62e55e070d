use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{error, info};

use crate::analysis::{AnalysisJob, AnalysisWorker};
use crate::capture::CaptureLoop;
use crate::cloud::{CloudJob, CloudStager, PendingCount};
use crate::config::NodeConfig;
use crate::core::{FrameRingQueue, SegmentRingBuffer, SharedState};
use crate::error::{NodeError, Result};

use super::state::ComponentStates;
use super::types::ComponentState;

#[cfg(feature = "streaming")]
use crate::streaming::StreamServer;

/// Owns every long-running thread in the node and the state they share.
///
/// Three threads carry the pipeline (capture, analysis, cloud-stage); a
/// fourth, optional thread runs its own Tokio runtime for the HTTP surface.
/// The capture loop is the only one with a hard real-time budget, so it is
/// the only component signalled cooperatively rather than by closing a
/// channel.
pub struct NodeApp {
    pub(super) config: NodeConfig,
    pub(super) record_dir: PathBuf,

    pub(super) segment_ring: Arc<SegmentRingBuffer>,
    pub(super) frame_ring: Arc<FrameRingQueue>,
    pub(super) shared: Arc<SharedState>,
    pub(super) cloud_pending: Arc<PendingCount>,

    pub(super) stop_capture: Arc<AtomicBool>,
    pub(super) analysis_tx: Option<crossbeam::channel::Sender<AnalysisJob>>,
    pub(super) cloud_tx: Option<crossbeam::channel::Sender<CloudJob>>,

    pub(super) capture_thread: Option<JoinHandle<()>>,
    pub(super) analysis_thread: Option<JoinHandle<()>>,
    pub(super) cloud_thread: Option<JoinHandle<()>>,
    #[cfg(feature = "streaming")]
    pub(super) streaming_thread: Option<JoinHandle<()>>,

    pub(super) component_states: Arc<ComponentStates>,
}

impl NodeApp {
    pub fn new(config: NodeConfig) -> Result<Self> {
        let record_dir = PathBuf::from(&config.storage.record_dir);
        std::fs::create_dir_all(&record_dir).map_err(|e| NodeError::Capture(
            crate::error::CaptureError::DirectoryCreation { path: record_dir.display().to_string(), source: e },
        ))?;

        let segment_ring = Arc::new(SegmentRingBuffer::new(
            config.event.preroll_seconds.max(config.event.postroll_seconds) + config.event.max_event_seconds,
        ));
        let frame_ring = Arc::new(FrameRingQueue::new(
            config.event.frame_ring_seconds,
            config.camera.fps as f64,
        ));
        let shared = Arc::new(SharedState::new());
        let cloud_pending = Arc::new(PendingCount::default());

        let component_states = Arc::new(ComponentStates::new());
        for name in ["capture", "analysis", "cloud", "streaming"] {
            component_states.set(name, ComponentState::Stopped);
        }

        Ok(Self {
            config,
            record_dir,
            segment_ring,
            frame_ring,
            shared,
            cloud_pending,
            stop_capture: Arc::new(AtomicBool::new(false)),
            analysis_tx: None,
            cloud_tx: None,
            capture_thread: None,
            analysis_thread: None,
            cloud_thread: None,
            #[cfg(feature = "streaming")]
            streaming_thread: None,
            component_states,
        })
    }

    /// Spawn every background thread. Returns once all threads are running;
    /// it does not wait for the camera to produce a first frame.
    pub fn start(&mut self) -> Result<()> {
        info!("starting sentryd node");

        let (cloud_tx, cloud_rx) = crossbeam::channel::bounded(self.config.cloud.queue_capacity);
        let stager = CloudStager::new(self.record_dir.clone(), Arc::clone(&self.cloud_pending));
        self.component_states.set("cloud", ComponentState::Starting);
        self.cloud_thread = Some(std::thread::Builder::new()
            .name("cloud-stager".into())
            .spawn(move || stager.run(cloud_rx))
            .map_err(|e| NodeError::system(format!("failed to spawn cloud thread: {}", e)))?);
        self.cloud_tx = Some(cloud_tx.clone());
        self.component_states.set("cloud", ComponentState::Running);

        let (analysis_tx, analysis_rx) = crossbeam::channel::bounded(self.config.analysis.queue_capacity);
        let analysis_worker = AnalysisWorker::new(self.config.analysis.clone(), cloud_tx);
        self.component_states.set("analysis", ComponentState::Starting);
        self.analysis_thread = Some(std::thread::Builder::new()
            .name("analysis-worker".into())
            .spawn(move || analysis_worker.run(analysis_rx))
            .map_err(|e| NodeError::system(format!("failed to spawn analysis thread: {}", e)))?);
        self.analysis_tx = Some(analysis_tx.clone());
        self.component_states.set("analysis", ComponentState::Running);

        self.component_states.set("capture", ComponentState::Starting);
        let mut capture_loop = CaptureLoop::new(
            &self.config,
            Arc::clone(&self.segment_ring),
            Arc::clone(&self.frame_ring),
            Arc::clone(&self.shared),
            analysis_tx,
        )
        .map_err(NodeError::Capture)?;
        let stop_capture = Arc::clone(&self.stop_capture);
        let record_dir = self.record_dir.clone();
        self.capture_thread = Some(std::thread::Builder::new()
            .name("capture-loop".into())
            .spawn(move || {
                capture_loop.run(&record_dir, || stop_capture.load(Ordering::Relaxed));
            })
            .map_err(|e| NodeError::system(format!("failed to spawn capture thread: {}", e)))?);
        self.component_states.set("capture", ComponentState::Running);

        #[cfg(feature = "streaming")]
        {
            self.component_states.set("streaming", ComponentState::Starting);
            let stream_config = self.config.stream.clone();
            let shared = Arc::clone(&self.shared);
            let frame_ring = Arc::clone(&self.frame_ring);
            let record_dir = self.record_dir.clone();
            let target_fps = self.config.camera.fps as f64;
            self.streaming_thread = Some(std::thread::Builder::new()
                .name("http-server".into())
                .spawn(move || {
                    let runtime = match tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                    {
                        Ok(rt) => rt,
                        Err(e) => {
                            error!(error = %e, "failed to build streaming runtime");
                            return;
                        }
                    };
                    let server = StreamServer::new(stream_config, shared, frame_ring, record_dir, target_fps);
                    if let Err(e) = runtime.block_on(server.start()) {
                        error!(error = %e, "streaming server exited with error");
                    }
                })
                .map_err(|e| NodeError::system(format!("failed to spawn streaming thread: {}", e)))?);
            self.component_states.set("streaming", ComponentState::Running);
        }

        info!("sentryd node started");
        Ok(())
    }
}
