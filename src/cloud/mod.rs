//! Stages incomplete packages for the (out-of-scope) cloud re-analysis loop.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::channel::Receiver;
use serde::Serialize;
use tracing::{error, info};

use crate::storage::atomic_write_json;

/// One package awaiting a pointer in `cloud_pending/`.
#[derive(Debug, Clone)]
pub struct CloudJob {
    pub event_id: u64,
    pub package_dir: PathBuf,
    pub reason: String,
}

#[derive(Debug, Serialize)]
struct CloudJobDocument {
    event_id: String,
    pkg_dir: String,
    queued_at: String,
    reason: String,
}

/// Observable count of packages currently staged for cloud re-analysis.
#[derive(Default)]
pub struct PendingCount(AtomicU64);

impl PendingCount {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Drains the cloud-staging queue on its own thread.
///
/// Staging is idempotent on `event_id`: re-staging simply overwrites the
/// pointer file. Failures are logged and dropped — the `NEEDS_CLOUD` marker
/// on the package itself remains authoritative, so a later sweep can always
/// re-derive the staging set from disk.
pub struct CloudStager {
    record_dir: PathBuf,
    pending: Arc<PendingCount>,
}

impl CloudStager {
    pub fn new(record_dir: PathBuf, pending: Arc<PendingCount>) -> Self {
        Self { record_dir, pending }
    }

    pub fn run(&self, jobs: Receiver<CloudJob>) {
        for job in jobs {
            self.stage(job);
        }
        info!("cloud stager queue closed, exiting");
    }

    fn stage(&self, job: CloudJob) {
        let dir = self
            .record_dir
            .join("cloud_pending")
            .join(job.event_id.to_string());
        let doc = CloudJobDocument {
            event_id: job.event_id.to_string(),
            pkg_dir: job.package_dir.display().to_string(),
            queued_at: chrono::Utc::now().to_rfc3339(),
            reason: job.reason,
        };

        match atomic_write_json(&dir.join("cloud_job.json"), &doc) {
            Ok(()) => {
                self.pending.0.fetch_add(1, Ordering::Relaxed);
                info!(event_id = job.event_id, "staged package for cloud re-analysis");
            }
            Err(e) => {
                error!(event_id = job.event_id, error = %e, "failed to stage cloud job, dropping");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn staging_the_same_event_twice_leaves_one_job_file() {
        let dir = tempdir().unwrap();
        let pending = Arc::new(PendingCount::default());
        let stager = CloudStager::new(dir.path().to_path_buf(), pending.clone());
        let job = CloudJob {
            event_id: 42,
            package_dir: dir.path().join("final/42"),
            reason: "pending_cloud".to_string(),
        };
        stager.stage(job.clone());
        stager.stage(job);
        let job_path = dir.path().join("cloud_pending/42/cloud_job.json");
        assert!(job_path.exists());
        assert_eq!(pending.get(), 2);
    }
}
