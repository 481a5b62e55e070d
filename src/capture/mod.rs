//! Owns the camera, drives motion/router/FSM, and publishes live state.

pub mod camera;
pub mod encode;
pub mod segment_writer;

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::Sender;
use tracing::{error, info, warn};

use crate::analysis::AnalysisJob;
use crate::config::NodeConfig;
use crate::core::{
    Event, FrameRingQueue, LiveSnapshot, SegmentRingBuffer, SharedState,
};
use crate::error::CaptureError;
use crate::incident::{EventFinalizer, EventFsm, FrameSignals, FsmState};
use crate::motion::MotionDetector;
use crate::router::Router;
use crate::storage::package::PackagePaths;
use crate::storage::{
    append_jsonl, build_incident, concat_mp4, make_browser_ready, write_done, write_incident,
};

use camera::{open_camera, Camera};
use encode::OverlayFont;
use segment_writer::SegmentWriter;

/// Finalizes an event onto disk and hands it to the analysis queue.
///
/// If the analysis queue is full, the package is still created and `DONE`
/// is written immediately without inference, so the capture loop never
/// blocks waiting for the analysis worker to catch up.
struct PackageFinalizer {
    record_dir: std::path::PathBuf,
    hub_id: String,
    camera_id: String,
    analysis_tx: Sender<AnalysisJob>,
}

impl EventFinalizer for PackageFinalizer {
    fn finalize(&self, event: Event) {
        let event_id = event.event_id;
        let inputs = event.concat_inputs();
        let paths = PackagePaths::new(&self.record_dir, event_id);

        if let Err(e) = concat_mp4(&paths.clip(), &inputs) {
            warn!(event_id, error = %e, "segment concat failed, discarding event");
            return;
        }

        make_browser_ready(&paths.clip());

        let incident = build_incident(&self.hub_id, &self.camera_id, &event);
        if let Err(e) = write_incident(&paths, &incident) {
            error!(event_id, error = %e, "failed to write incident.json, discarding event");
            return;
        }

        let log_path = self.record_dir.join("event_log.jsonl");
        if let Err(e) = append_jsonl(&log_path, &incident) {
            warn!(event_id, error = %e, "failed to append to event_log.jsonl");
        }

        let job = AnalysisJob {
            event_id,
            mp4_path: paths.clip(),
            package_dir: paths.dir.clone(),
            decision: event.router_snapshot.decision,
        };

        if self.analysis_tx.try_send(job).is_err() {
            warn!(event_id, "analysis queue full, writing DONE without inference");
            if let Err(e) = write_done(&paths) {
                error!(event_id, error = %e, "failed to write DONE marker after queue overflow");
            }
        }
    }
}

/// Rolling FPS counter over a window of at least two seconds, reset on close.
struct FpsWindow {
    window_start: Instant,
    count: usize,
    last_fps: f64,
}

impl FpsWindow {
    fn new() -> Self {
        Self { window_start: Instant::now(), count: 0, last_fps: 0.0 }
    }

    fn tick(&mut self) -> f64 {
        self.count += 1;
        let elapsed = self.window_start.elapsed();
        if elapsed >= Duration::from_secs(2) {
            self.last_fps = self.count as f64 / elapsed.as_secs_f64();
            self.count = 0;
            self.window_start = Instant::now();
        }
        self.last_fps
    }
}

/// Single-threaded per-frame pipeline: the capture loop never blocks on the
/// network or a subprocess, only on the camera read and bounded segment I/O.
pub struct CaptureLoop {
    camera: Box<dyn Camera>,
    motion: MotionDetector,
    router: Router,
    fsm: EventFsm,
    frame_ring: Arc<FrameRingQueue>,
    segment_ring: Arc<SegmentRingBuffer>,
    shared: Arc<SharedState>,
    overlay_font: OverlayFont,
    segment_seconds: f64,
    target_fps: f64,
    segment_writer: Option<(SegmentWriter, f64)>,
    fps_window: FpsWindow,
}

impl CaptureLoop {
    pub fn new(
        config: &NodeConfig,
        segment_ring: Arc<SegmentRingBuffer>,
        frame_ring: Arc<FrameRingQueue>,
        shared: Arc<SharedState>,
        analysis_tx: Sender<AnalysisJob>,
    ) -> Result<Self, CaptureError> {
        let camera = open_camera(&config.camera).map_err(|e| CaptureError::SegmentWrite {
            details: format!("camera open failed: {}", e),
        })?;

        let record_dir = std::path::PathBuf::from(&config.storage.record_dir);
        let finalizer = Arc::new(PackageFinalizer {
            record_dir,
            hub_id: config.identity.hub_id.clone(),
            camera_id: config.identity.camera_id.clone(),
            analysis_tx,
        });

        Ok(Self {
            camera,
            motion: MotionDetector::new(config.motion.clone()),
            router: Router::new(config.router.clone()),
            fsm: EventFsm::new(config.event.clone(), segment_ring.clone(), finalizer),
            frame_ring,
            segment_ring,
            shared,
            overlay_font: match &config.camera.overlay_font_path {
                Some(path) => OverlayFont::load(path),
                None => OverlayFont::none(),
            },
            segment_seconds: config.event.segment_seconds,
            target_fps: config.camera.fps as f64,
            segment_writer: None,
            fps_window: FpsWindow::new(),
        })
    }

    /// Runs forever until `should_stop` reports true, checked once per frame.
    pub fn run(&mut self, record_dir: &std::path::Path, should_stop: impl Fn() -> bool) {
        let frame_budget = Duration::from_secs_f64(1.0 / self.target_fps.max(1.0));

        while !should_stop() {
            let tick_start = Instant::now();
            if let Err(e) = self.step(record_dir) {
                error!(error = %e, "capture step failed, continuing");
            }
            let elapsed = tick_start.elapsed();
            if elapsed < frame_budget {
                std::thread::sleep(frame_budget - elapsed);
            }
        }

        if let Some((writer, _)) = self.segment_writer.take() {
            let _ = writer.close();
        }
    }

    fn step(&mut self, record_dir: &std::path::Path) -> Result<(), CaptureError> {
        let frame = self.camera.read_frame().map_err(|e| CaptureError::SegmentWrite {
            details: format!("camera read failed: {}", e),
        })?;

        self.roll_segment_if_needed(record_dir, frame.ts, self.camera.width(), self.camera.height())?;
        if let Some((writer, _)) = self.segment_writer.as_mut() {
            if let Err(e) = writer.write_frame(&frame.rgb) {
                warn!(error = %e, "failed to write frame to segment, continuing");
            }
        }

        let gray = image::imageops::grayscale(&frame.rgb);
        self.router.observe(&gray);

        let (boxes, total_area) = match self.motion.detect(&gray) {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "motion detection unavailable this frame");
                (Vec::new(), 0.0)
            }
        };
        let motion_seen = !boxes.is_empty();
        let router_snapshot = self.router.decide();

        self.fsm.step(&FrameSignals {
            now: frame.ts,
            moved_area: total_area,
            box_count: boxes.len() as u32,
            motion_seen,
            router_snapshot: &router_snapshot,
            target_fps: self.target_fps,
        });

        let fsm_state = match self.fsm.state() {
            FsmState::Idle => "idle",
            FsmState::Active => "active",
            FsmState::Postroll => "postroll",
        };
        let status_text = format!("{} | {:.0}x{:.0} | motion={}", fsm_state, frame.rgb.width(), frame.rgb.height(), boxes.len());

        let rgba = image::DynamicImage::ImageRgb8(frame.rgb).to_rgba8();
        let jpeg = encode::draw_overlay_and_encode(rgba, &boxes, &status_text, &self.overlay_font);

        self.frame_ring.push(frame.ts, jpeg.clone());
        self.shared.publish_frame(Arc::new(jpeg), frame.ts);

        let fps = self.fps_window.tick();
        self.shared.publish_live(LiveSnapshot {
            latest_ts: frame.ts,
            fps,
            fsm_state: fsm_state.to_string(),
            motion_streak: 0,
            box_count: boxes.len() as u32,
            brightness: router_snapshot.brightness,
            blur_var: router_snapshot.blur_var,
            cpu_pct: router_snapshot.cpu_pct,
            net_latency_ms: router_snapshot.net_latency_ms,
            decision: Some(router_snapshot.decision),
            active_event_id: self.fsm.current_event_id(),
        });

        Ok(())
    }

    fn roll_segment_if_needed(
        &mut self,
        record_dir: &std::path::Path,
        now: f64,
        width: u32,
        height: u32,
    ) -> Result<(), CaptureError> {
        let should_roll = match &self.segment_writer {
            None => true,
            Some((_, opened_at)) => now - opened_at >= self.segment_seconds,
        };
        if !should_roll {
            return Ok(());
        }

        if let Some((writer, opened_at)) = self.segment_writer.take() {
            match writer.close() {
                Ok(path) => {
                    self.segment_ring.add(opened_at, path.clone());
                    self.fsm.on_segment_closed(path);
                }
                Err(e) => warn!(error = %e, "segment rolled over but did not close cleanly"),
            }
        }

        let segments_dir = record_dir.join("segments");
        let filename = format!("seg_{:.3}.mp4", now);
        let path = segments_dir.join(filename);
        let fps = self.target_fps.max(1.0) as u32;
        let writer = SegmentWriter::open(&path, width, height, fps)?;
        self.segment_writer = Some((writer, now));
        info!(path = %path.display(), "opened new segment");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RouterSnapshot, RoutingDecision};
    use tempfile::tempdir;

    fn sample_event(event_id: u64) -> Event {
        let snapshot = RouterSnapshot {
            brightness: 0.5,
            blur_var: 100.0,
            cpu_pct: 12.0,
            net_latency_ms: -1.0,
            decision: RoutingDecision::RecordOnly,
            decision_reason: vec![],
        };
        Event::new(event_id, 1700000000.0, vec![], snapshot)
    }

    #[test]
    fn fps_window_reports_zero_before_first_window_closes() {
        let mut window = FpsWindow::new();
        assert_eq!(window.tick(), 0.0);
        assert_eq!(window.tick(), 0.0);
    }

    #[test]
    fn finalize_with_too_few_segments_discards_event_without_creating_package() {
        let dir = tempdir().unwrap();
        let (analysis_tx, analysis_rx) = crossbeam::channel::bounded(4);
        let finalizer = PackageFinalizer {
            record_dir: dir.path().to_path_buf(),
            hub_id: "hub-1".to_string(),
            camera_id: "cam-1".to_string(),
            analysis_tx,
        };

        // concat_mp4 requires at least two surviving segments; this event has
        // none, so concat fails and the package directory must never appear.
        finalizer.finalize(sample_event(1));

        let paths = PackagePaths::new(dir.path(), 1);
        assert!(!paths.dir.exists());
        assert!(analysis_rx.try_recv().is_err());
    }

    #[test]
    fn finalize_never_panics_on_a_full_analysis_queue() {
        let dir = tempdir().unwrap();
        // A zero-capacity channel with no receiver is always full; finalize
        // must fall back to its own error path rather than block or panic,
        // regardless of whether concat succeeds in this sandbox.
        let (analysis_tx, _analysis_rx) = crossbeam::channel::bounded(0);
        let finalizer = PackageFinalizer {
            record_dir: dir.path().to_path_buf(),
            hub_id: "hub-1".to_string(),
            camera_id: "cam-1".to_string(),
            analysis_tx,
        };

        finalizer.finalize(sample_event(2));
    }
}
