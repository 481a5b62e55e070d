use serde_json::Value;

use crate::storage::package::{AnalysisResult, DetectionSummary, SCHEMA_VERSION};

/// Normalize a raw runner (or synthesized) document into the stable
/// `result.json` contract: `labels`, `detections`, `summary`, `latency_ms`,
/// `status`, `model_name`, `model_stage` are always present.
pub fn normalize_result(event_id: u64, raw: &Value) -> AnalysisResult {
    let status = raw.get("status").and_then(Value::as_str).unwrap_or("ok").to_string();
    let model_name = raw
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or("edgeimpulse_fomo_local")
        .to_string();
    let latency_ms = raw.get("latency_ms").and_then(Value::as_i64).unwrap_or(-1);

    let detections: Vec<Value> = raw
        .get("detections")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let labels: Vec<String> = raw
        .get("labels")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let summary = raw
        .get("summary")
        .map(|s| DetectionSummary {
            people: s.get("people").and_then(Value::as_i64).unwrap_or(0),
            cars: s.get("cars").and_then(Value::as_i64).unwrap_or(0),
        })
        .unwrap_or_default();

    AnalysisResult {
        status,
        model_name,
        model_stage: "local_fast".to_string(),
        labels,
        detections,
        summary,
        latency_ms,
        schema_version: SCHEMA_VERSION,
        event_id: event_id.to_string(),
        created_at: chrono::Utc::now().to_rfc3339(),
    }
}

/// Build the `result.json` emitted directly for `RECORD_ONLY` events: no
/// inference ran, nothing to escalate.
pub fn skipped_result(event_id: u64) -> AnalysisResult {
    AnalysisResult {
        status: "skipped".to_string(),
        model_name: "none".to_string(),
        model_stage: "local_fast".to_string(),
        labels: Vec::new(),
        detections: Vec::new(),
        summary: DetectionSummary::default(),
        latency_ms: 0,
        schema_version: SCHEMA_VERSION,
        event_id: event_id.to_string(),
        created_at: chrono::Utc::now().to_rfc3339(),
    }
}

/// Build the `result.json` emitted for `RUN_CLOUD` events: local inference
/// is skipped entirely in favor of escalation, per the routing decision.
pub fn pending_cloud_result(event_id: u64) -> AnalysisResult {
    AnalysisResult {
        status: "pending_cloud".to_string(),
        model_name: "none".to_string(),
        model_stage: "local_fast".to_string(),
        labels: Vec::new(),
        detections: Vec::new(),
        summary: DetectionSummary::default(),
        latency_ms: 0,
        schema_version: SCHEMA_VERSION,
        event_id: event_id.to_string(),
        created_at: chrono::Utc::now().to_rfc3339(),
    }
}

/// Whether a result's analysis is authoritative (no cloud re-analysis needed).
pub fn is_complete(result: &AnalysisResult, complete_threshold: f64) -> bool {
    match result.status.as_str() {
        "error" | "pending_cloud" => false,
        "skipped" => true,
        _ => {
            if result.detections.is_empty() {
                return true;
            }
            let max_value = result
                .detections
                .iter()
                .filter_map(|d| d.get("value").and_then(Value::as_f64))
                .fold(f64::MIN, f64::max);
            max_value >= complete_threshold
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_is_never_complete() {
        let result = AnalysisResult {
            status: "error".to_string(),
            model_name: "x".to_string(),
            model_stage: "local_fast".to_string(),
            labels: vec![],
            detections: vec![],
            summary: DetectionSummary::default(),
            latency_ms: 10,
            schema_version: SCHEMA_VERSION,
            event_id: "1".to_string(),
            created_at: "2023-01-01T00:00:00Z".to_string(),
        };
        assert!(!is_complete(&result, 0.7));
    }

    #[test]
    fn skipped_status_is_always_complete() {
        let result = skipped_result(1);
        assert!(is_complete(&result, 0.7));
    }

    #[test]
    fn empty_detections_is_complete() {
        let result = normalize_result(1, &serde_json::json!({"status": "ok", "detections": []}));
        assert!(is_complete(&result, 0.7));
    }

    #[test]
    fn high_confidence_detection_is_complete() {
        let result = normalize_result(
            1,
            &serde_json::json!({"status": "ok", "detections": [{"label": "person", "value": 0.9}]}),
        );
        assert!(is_complete(&result, 0.7));
    }

    #[test]
    fn low_confidence_detection_is_incomplete() {
        let result = normalize_result(
            1,
            &serde_json::json!({"status": "ok", "detections": [{"label": "person", "value": 0.2}]}),
        );
        assert!(!is_complete(&result, 0.7));
    }

    #[test]
    fn normalize_result_defaults_missing_fields() {
        let result = normalize_result(1, &serde_json::json!({}));
        assert_eq!(result.model_name, "edgeimpulse_fomo_local");
        assert_eq!(result.latency_ms, -1);
        assert!(result.labels.is_empty());
    }
}
