//! Consumes finalized packages, runs (or skips) local inference, and hands
//! incomplete outcomes to the cloud-staging queue.

pub mod normalize;
pub mod runner;

use std::path::PathBuf;
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender};
use tracing::{error, info, warn};

use crate::cloud::CloudJob;
use crate::config::AnalysisConfig;
use crate::core::RoutingDecision;
use crate::storage::package::PackagePaths;
use crate::storage::{update_incident_after_analysis, write_done, write_needs_cloud, write_result};

/// One finalized package awaiting the analysis worker's attention.
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub event_id: u64,
    pub mp4_path: PathBuf,
    pub package_dir: PathBuf,
    pub decision: RoutingDecision,
}

/// Drains the analysis queue on its own thread, one job at a time.
///
/// Every branch — success, runner failure, or an internal write error —
/// still writes `DONE` last: a package must never be left ingestable-but-
/// inconsistent.
pub struct AnalysisWorker {
    config: AnalysisConfig,
    cloud_tx: Sender<CloudJob>,
}

impl AnalysisWorker {
    pub fn new(config: AnalysisConfig, cloud_tx: Sender<CloudJob>) -> Self {
        Self { config, cloud_tx }
    }

    pub fn run(&self, jobs: Receiver<AnalysisJob>) {
        for job in jobs {
            self.process(job);
        }
        info!("analysis worker queue closed, exiting");
    }

    fn process(&self, job: AnalysisJob) {
        let paths = PackagePaths { dir: job.package_dir.clone() };

        let (result, complete) = match job.decision {
            RoutingDecision::RecordOnly => (normalize::skipped_result(job.event_id), true),
            RoutingDecision::RunCloud => (normalize::pending_cloud_result(job.event_id), false),
            RoutingDecision::RunLocal => {
                let output = runner::invoke_runner(
                    &self.config.runner_path,
                    job.event_id,
                    &job.mp4_path,
                    &paths.result_json(),
                    self.config.local_infer_frames,
                    self.config.local_infer_thresh,
                    Duration::from_millis(self.config.runner_timeout_ms),
                );
                let result = normalize::normalize_result(job.event_id, &output.document);
                let complete = normalize::is_complete(&result, self.config.complete_confidence_thresh);
                (result, complete)
            }
        };

        self.finalize_package(&paths, job.event_id, &result, complete);
    }

    /// Runs unconditionally, regardless of which branch above produced `result`:
    /// write result.json, update incident.json, mark NEEDS_CLOUD if incomplete,
    /// mark DONE last, and enqueue cloud staging if incomplete.
    fn finalize_package(
        &self,
        paths: &PackagePaths,
        event_id: u64,
        result: &crate::storage::package::AnalysisResult,
        complete: bool,
    ) {
        if let Err(e) = write_result(paths, result) {
            error!(event_id, error = %e, "failed to write result.json");
        }

        if let Err(e) = update_incident_after_analysis(paths, result, complete) {
            error!(event_id, error = %e, "failed to update incident.json after analysis");
        }

        if !complete {
            if let Err(e) = write_needs_cloud(paths) {
                error!(event_id, error = %e, "failed to write NEEDS_CLOUD marker");
            }
        }

        if let Err(e) = write_done(paths) {
            error!(event_id, error = %e, "failed to write DONE marker, package may be stuck");
        }

        if !complete {
            let job = CloudJob {
                event_id,
                package_dir: paths.dir.clone(),
                reason: result.status.clone(),
            };
            if self.cloud_tx.try_send(job).is_err() {
                warn!(event_id, "cloud queue full, dropping staging job; NEEDS_CLOUD + DONE already written");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            complete_confidence_thresh: 0.70,
            local_infer_frames: 5,
            local_infer_thresh: 0.50,
            runner_path: "/does/not/exist".to_string(),
            runner_timeout_ms: 200,
            queue_capacity: 8,
        }
    }

    #[test]
    fn record_only_job_always_writes_done_and_skips_cloud_queue() {
        let dir = tempdir().unwrap();
        let (cloud_tx, cloud_rx) = crossbeam::channel::bounded(8);
        let worker = AnalysisWorker::new(config(), cloud_tx);
        let paths = PackagePaths::new(dir.path(), 1);
        std::fs::create_dir_all(&paths.dir).unwrap();
        std::fs::write(
            paths.incident_json(),
            serde_json::to_string(&crate::storage::build_incident(
                "hub",
                "cam",
                &sample_event(),
            ))
            .unwrap(),
        )
        .unwrap();

        worker.process(AnalysisJob {
            event_id: 1,
            mp4_path: dir.path().join("clip.mp4"),
            package_dir: paths.dir.clone(),
            decision: RoutingDecision::RecordOnly,
        });

        assert!(paths.done_marker().exists());
        assert!(!paths.needs_cloud_marker().exists());
        assert!(cloud_rx.try_recv().is_err());
    }

    #[test]
    fn run_cloud_job_marks_needs_cloud_and_enqueues_staging() {
        let dir = tempdir().unwrap();
        let (cloud_tx, cloud_rx) = crossbeam::channel::bounded(8);
        let worker = AnalysisWorker::new(config(), cloud_tx);
        let paths = PackagePaths::new(dir.path(), 2);
        std::fs::create_dir_all(&paths.dir).unwrap();
        std::fs::write(
            paths.incident_json(),
            serde_json::to_string(&crate::storage::build_incident(
                "hub",
                "cam",
                &sample_event(),
            ))
            .unwrap(),
        )
        .unwrap();

        worker.process(AnalysisJob {
            event_id: 2,
            mp4_path: dir.path().join("clip.mp4"),
            package_dir: paths.dir.clone(),
            decision: RoutingDecision::RunCloud,
        });

        assert!(paths.done_marker().exists());
        assert!(paths.needs_cloud_marker().exists());
        assert!(cloud_rx.try_recv().is_ok());
    }

    fn sample_event() -> crate::core::Event {
        use crate::core::RouterSnapshot;
        let snapshot = RouterSnapshot {
            brightness: 0.5,
            blur_var: 100.0,
            cpu_pct: 10.0,
            net_latency_ms: -1.0,
            decision: RoutingDecision::RunLocal,
            decision_reason: vec![],
        };
        crate::core::Event::new(1, 1.0, vec![], snapshot)
    }
}
