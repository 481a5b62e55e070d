use std::path::{Path, PathBuf};

use serde::Serialize;

/// One row of the `/events` listing: disk truth, not cached state.
#[derive(Debug, Serialize)]
pub struct EventSummary {
    pub event_id: u64,
    pub bucket: String,
    pub has_result: bool,
    pub needs_cloud: bool,
    pub done: bool,
}

/// Scan `record_dir/final` and `record_dir/uploaded`, newest event first.
///
/// The `uploaded` bucket is populated by the out-of-scope cloud uploader;
/// an absent directory simply contributes no rows.
pub fn list_events(record_dir: &Path) -> Vec<EventSummary> {
    let mut rows = Vec::new();
    for bucket in ["final", "uploaded"] {
        scan_bucket(record_dir, bucket, &mut rows);
    }
    rows.sort_by(|a, b| b.event_id.cmp(&a.event_id));
    rows
}

fn scan_bucket(record_dir: &Path, bucket: &str, rows: &mut Vec<EventSummary>) {
    let dir = record_dir.join(bucket);
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(event_id) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.parse::<u64>().ok())
        else {
            continue;
        };
        rows.push(EventSummary {
            event_id,
            bucket: bucket.to_string(),
            has_result: path.join("result.json").exists(),
            needs_cloud: path.join("NEEDS_CLOUD").exists(),
            done: path.join("DONE").exists(),
        });
    }
}

/// Locate an event's package directory in whichever bucket holds it.
pub fn find_package_dir(record_dir: &Path, event_id: u64) -> Option<PathBuf> {
    for bucket in ["final", "uploaded"] {
        let dir = record_dir.join(bucket).join(event_id.to_string());
        if dir.is_dir() {
            return Some(dir);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn list_events_sorts_descending_across_buckets() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("final/10")).unwrap();
        std::fs::create_dir_all(dir.path().join("uploaded/20")).unwrap();
        std::fs::write(dir.path().join("final/10/DONE"), b"ok").unwrap();

        let rows = list_events(dir.path());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].event_id, 20);
        assert_eq!(rows[1].event_id, 10);
        assert!(rows[1].done);
    }

    #[test]
    fn find_package_dir_checks_both_buckets() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("uploaded/7")).unwrap();
        assert_eq!(
            find_package_dir(dir.path(), 7),
            Some(dir.path().join("uploaded/7"))
        );
        assert_eq!(find_package_dir(dir.path(), 99), None);
    }
}
