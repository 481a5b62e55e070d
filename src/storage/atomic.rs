use std::fs;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::error::StorageError;

/// Write `contents` to `path` via a temporary file in the same directory,
/// then rename over the target — readers never observe a partial write.
pub fn atomic_write_text(path: &Path, contents: &str) -> Result<(), StorageError> {
    let dir = path.parent().ok_or_else(|| StorageError::AtomicWrite {
        path: path.display().to_string(),
        details: "path has no parent directory".to_string(),
    })?;
    fs::create_dir_all(dir).map_err(|e| StorageError::AtomicWrite {
        path: path.display().to_string(),
        details: e.to_string(),
    })?;

    let tmp_path = tmp_path_for(path);
    fs::write(&tmp_path, contents).map_err(|e| StorageError::AtomicWrite {
        path: path.display().to_string(),
        details: e.to_string(),
    })?;
    fs::rename(&tmp_path, path).map_err(|e| StorageError::AtomicWrite {
        path: path.display().to_string(),
        details: e.to_string(),
    })?;
    Ok(())
}

/// Serialize `value` as pretty, sorted-key JSON and write it atomically.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| StorageError::AtomicWrite {
        path: path.display().to_string(),
        details: e.to_string(),
    })?;
    atomic_write_text(path, &json)
}

/// Write a zero-byte-content marker file (e.g. `DONE`, `NEEDS_CLOUD`) atomically.
pub fn write_marker(path: &Path) -> Result<(), StorageError> {
    atomic_write_text(path, "ok\n")
}

/// Append one JSON-serialized line to `path`, creating it if necessary.
///
/// Not rename-atomic like the other writers here — an append-only log has no
/// single "current" version to swap in, only a tail to grow. A torn write at
/// the exact moment of a crash can leave a partial trailing line; readers of
/// `event_log.jsonl` should tolerate that.
pub fn append_jsonl<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let dir = path.parent().ok_or_else(|| StorageError::AtomicWrite {
        path: path.display().to_string(),
        details: "path has no parent directory".to_string(),
    })?;
    fs::create_dir_all(dir).map_err(|e| StorageError::AtomicWrite {
        path: path.display().to_string(),
        details: e.to_string(),
    })?;

    let line = serde_json::to_string(value).map_err(|e| StorageError::AtomicWrite {
        path: path.display().to_string(),
        details: e.to_string(),
    })?;

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| StorageError::AtomicWrite {
            path: path.display().to_string(),
            details: e.to_string(),
        })?;
    writeln!(file, "{}", line).map_err(|e| StorageError::AtomicWrite {
        path: path.display().to_string(),
        details: e.to_string(),
    })
}

fn tmp_path_for(path: &Path) -> std::path::PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".tmp_{}", file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn atomic_write_text_creates_parent_dirs_and_writes_contents() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("nested/file.txt");
        atomic_write_text(&target, "hello").unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "hello");
    }

    #[test]
    fn atomic_write_json_round_trips() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("doc.json");
        let value = serde_json::json!({"a": 1, "b": "two"});
        atomic_write_json(&target, &value).unwrap();
        let read_back: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&target).unwrap()).unwrap();
        assert_eq!(read_back, value);
    }

    #[test]
    fn writing_twice_with_same_content_yields_same_bytes() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("doc.json");
        let value = serde_json::json!({"a": 1});
        atomic_write_json(&target, &value).unwrap();
        let first = std::fs::read(&target).unwrap();
        atomic_write_json(&target, &value).unwrap();
        let second = std::fs::read(&target).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn write_marker_creates_a_readable_file() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("DONE");
        write_marker(&target).unwrap();
        assert!(target.exists());
    }

    #[test]
    fn append_jsonl_adds_one_line_per_call() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("event_log.jsonl");
        append_jsonl(&target, &serde_json::json!({"a": 1})).unwrap();
        append_jsonl(&target, &serde_json::json!({"a": 2})).unwrap();

        let contents = std::fs::read_to_string(&target).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(lines[0]).unwrap(),
            serde_json::json!({"a": 1})
        );
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(lines[1]).unwrap(),
            serde_json::json!({"a": 2})
        );
    }
}
