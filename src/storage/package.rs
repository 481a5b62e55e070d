use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::core::{Event, RoutingDecision};
use crate::error::{AnalysisError, StorageError};

use super::atomic::{atomic_write_json, write_marker};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scores {
    pub threat_score: i64,
    pub quality_score: i64,
    pub confidence_score: f64,
    pub compute_pressure_score: Option<i64>,
    pub escalation_score: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub mode: String,
    pub model: Option<String>,
    pub status: String,
    pub result_path: String,
    pub summary: DetectionSummary,
    pub latency_ms: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub people: i64,
    pub cars: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingOutcome {
    pub complete: Option<bool>,
    pub cloud_needed: bool,
}

/// The canonical incident document written at finalize and updated by the
/// analysis worker. Field layout is a stable contract consumed by the
/// (out-of-scope) cloud uploader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub incident_id: String,
    pub hub_id: String,
    pub camera_id: String,
    pub primary_label: String,
    pub started_at: String,
    pub ended_at: String,
    pub route_mode: String,
    pub route_reason: String,
    pub scores: Scores,
    pub analysis: AnalysisSummary,
    pub routing: RoutingOutcome,
    pub raw: Value,
    pub schema_version: u32,
    pub created_at: String,
}

/// The inference outcome document written by the analysis worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub status: String,
    pub model_name: String,
    pub model_stage: String,
    pub labels: Vec<String>,
    pub detections: Vec<Value>,
    pub summary: DetectionSummary,
    pub latency_ms: i64,
    pub schema_version: u32,
    pub event_id: String,
    pub created_at: String,
}

pub fn build_incident(hub_id: &str, camera_id: &str, event: &Event) -> Incident {
    let decision = event.router_snapshot.decision;
    let route_mode = decision.route_mode().to_string();
    let route_reason = event
        .router_snapshot
        .decision_reason
        .first()
        .cloned()
        .unwrap_or_else(|| "router".to_string());

    let threat_score = ((event.motion_stats.max_area / 80.0) as i64).clamp(0, 100);
    let quality_score = ((event.router_snapshot.brightness.max(0.0) * 100.0) as i64).clamp(0, 100);
    let (mode, status) = match decision {
        RoutingDecision::RecordOnly => ("none", "ok"),
        RoutingDecision::RunCloud => ("cloud", "pending"),
        RoutingDecision::RunLocal => ("local", "pending"),
    };
    let cpu = event.router_snapshot.cpu_pct;
    let compute_pressure_score = if cpu >= 0.0 { Some(cpu as i64) } else { None };

    Incident {
        incident_id: event.event_id.to_string(),
        hub_id: hub_id.to_string(),
        camera_id: camera_id.to_string(),
        primary_label: "motion_detected".to_string(),
        started_at: iso_timestamp(event.start_ts),
        ended_at: iso_timestamp(event.end_ts),
        route_mode,
        route_reason,
        scores: Scores {
            threat_score,
            quality_score,
            confidence_score: 0.0,
            compute_pressure_score,
            escalation_score: 0,
        },
        analysis: AnalysisSummary {
            mode: mode.to_string(),
            model: None,
            status: status.to_string(),
            result_path: "result.json".to_string(),
            summary: DetectionSummary::default(),
            latency_ms: 0,
        },
        routing: RoutingOutcome {
            complete: None,
            cloud_needed: decision == RoutingDecision::RunCloud,
        },
        raw: serde_json::json!({
            "decision": decision,
            "decision_reason": event.router_snapshot.decision_reason,
            "router": event.router_snapshot,
            "motion": event.motion_stats,
        }),
        schema_version: SCHEMA_VERSION,
        created_at: now_iso(),
    }
}

/// Directory layout for one finalized package, e.g. `events/final/<id>/`.
pub struct PackagePaths {
    pub dir: PathBuf,
}

impl PackagePaths {
    pub fn new(record_dir: &Path, event_id: u64) -> Self {
        Self {
            dir: record_dir.join("final").join(event_id.to_string()),
        }
    }

    pub fn clip(&self) -> PathBuf {
        self.dir.join("clip.mp4")
    }
    pub fn incident_json(&self) -> PathBuf {
        self.dir.join("incident.json")
    }
    pub fn result_json(&self) -> PathBuf {
        self.dir.join("result.json")
    }
    pub fn needs_cloud_marker(&self) -> PathBuf {
        self.dir.join("NEEDS_CLOUD")
    }
    pub fn done_marker(&self) -> PathBuf {
        self.dir.join("DONE")
    }
}

/// Write `incident.json`; the caller writes `clip.mp4` and markers separately
/// once concat has succeeded, preserving the "DONE written last" invariant.
pub fn write_incident(paths: &PackagePaths, incident: &Incident) -> Result<(), StorageError> {
    std::fs::create_dir_all(&paths.dir).map_err(|e| StorageError::PackageIo {
        details: e.to_string(),
    })?;
    atomic_write_json(&paths.incident_json(), incident)
}

pub fn write_result(paths: &PackagePaths, result: &AnalysisResult) -> Result<(), StorageError> {
    atomic_write_json(&paths.result_json(), result)
}

pub fn write_needs_cloud(paths: &PackagePaths) -> Result<(), StorageError> {
    write_marker(&paths.needs_cloud_marker())
}

pub fn write_done(paths: &PackagePaths) -> Result<(), StorageError> {
    info!(dir = %paths.dir.display(), "package marked DONE");
    write_marker(&paths.done_marker())
}

/// Read-modify-write `incident.json`, updating the analysis and routing
/// sections in place once the analysis worker has a result.
pub fn update_incident_after_analysis(
    paths: &PackagePaths,
    result: &AnalysisResult,
    complete: bool,
) -> Result<(), AnalysisError> {
    let text = std::fs::read_to_string(paths.incident_json()).map_err(|e| AnalysisError::PackageUpdate {
        details: format!("failed to read incident.json: {}", e),
    })?;
    let mut incident: Incident = serde_json::from_str(&text).map_err(|e| AnalysisError::PackageUpdate {
        details: format!("failed to parse incident.json: {}", e),
    })?;

    incident.analysis.status = result.status.clone();
    incident.analysis.model = Some(result.model_name.clone());
    incident.analysis.mode = result.model_stage.clone();
    incident.analysis.summary = result.summary.clone();
    incident.analysis.latency_ms = result.latency_ms;
    incident.scores.confidence_score = if result.summary.people > 0 || result.summary.cars > 0 {
        1.0
    } else {
        0.0
    };
    incident.routing.complete = Some(complete);
    incident.routing.cloud_needed = !complete;

    debug!(event_id = %incident.incident_id, complete, "updated incident after analysis");

    atomic_write_json(&paths.incident_json(), &incident).map_err(|e| AnalysisError::PackageUpdate {
        details: e.to_string(),
    })
}

fn iso_timestamp(ts: f64) -> String {
    let secs = ts.trunc() as i64;
    let nanos = ((ts.fract()) * 1_000_000_000.0) as u32;
    DateTime::<Utc>::from_timestamp(secs, nanos)
        .unwrap_or_else(|| DateTime::<Utc>::from(UNIX_EPOCH))
        .to_rfc3339()
}

fn now_iso() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    iso_timestamp(now.as_secs_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RouterSnapshot;
    use tempfile::tempdir;

    fn sample_event() -> Event {
        let snapshot = RouterSnapshot {
            brightness: 0.5,
            blur_var: 100.0,
            cpu_pct: 12.0,
            net_latency_ms: -1.0,
            decision: RoutingDecision::RunLocal,
            decision_reason: vec![],
        };
        Event::new(1700000000000, 1700000000.0, vec![], snapshot)
    }

    #[test]
    fn build_incident_sets_schema_version_and_id() {
        let event = sample_event();
        let incident = build_incident("hub-1", "cam-1", &event);
        assert_eq!(incident.schema_version, SCHEMA_VERSION);
        assert_eq!(incident.incident_id, "1700000000000");
        assert_eq!(incident.primary_label, "motion_detected");
    }

    #[test]
    fn record_only_decision_never_marks_cloud_needed() {
        let mut event = sample_event();
        event.router_snapshot.decision = RoutingDecision::RecordOnly;
        let incident = build_incident("hub-1", "cam-1", &event);
        assert!(!incident.routing.cloud_needed);
    }

    #[test]
    fn writing_incident_twice_with_same_content_is_idempotent() {
        let dir = tempdir().unwrap();
        let paths = PackagePaths::new(dir.path(), 1);
        let incident = build_incident("hub-1", "cam-1", &sample_event());
        write_incident(&paths, &incident).unwrap();
        let first = std::fs::read(paths.incident_json()).unwrap();
        write_incident(&paths, &incident).unwrap();
        let second = std::fs::read(paths.incident_json()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn update_incident_after_analysis_sets_routing_complete() {
        let dir = tempdir().unwrap();
        let paths = PackagePaths::new(dir.path(), 1);
        let incident = build_incident("hub-1", "cam-1", &sample_event());
        write_incident(&paths, &incident).unwrap();

        let result = AnalysisResult {
            status: "ok".to_string(),
            model_name: "edgeimpulse_fomo_local".to_string(),
            model_stage: "local_fast".to_string(),
            labels: vec![],
            detections: vec![],
            summary: DetectionSummary { people: 1, cars: 0 },
            latency_ms: 120,
            schema_version: SCHEMA_VERSION,
            event_id: "1700000000000".to_string(),
            created_at: "2023-11-14T22:13:20Z".to_string(),
        };
        update_incident_after_analysis(&paths, &result, true).unwrap();

        let text = std::fs::read_to_string(paths.incident_json()).unwrap();
        let updated: Incident = serde_json::from_str(&text).unwrap();
        assert_eq!(updated.routing.complete, Some(true));
        assert_eq!(updated.scores.confidence_score, 1.0);
    }
}
