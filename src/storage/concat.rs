use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, warn};

use crate::error::StorageError;

/// Concatenate MP4 segments into `out`, de-duplicating and dropping missing
/// files first. Tries a fast stream-copy concat, then falls back to a
/// re-encode if the fast path fails. Requires at least two surviving inputs.
pub fn concat_mp4(out: &Path, paths: &[PathBuf]) -> Result<(), StorageError> {
    let mut seen = HashSet::new();
    let deduped: Vec<&PathBuf> = paths.iter().filter(|p| seen.insert((*p).clone())).collect();

    let mut existing = Vec::new();
    let mut missing = 0usize;
    for p in deduped {
        if p.exists() {
            existing.push(p.clone());
        } else {
            missing += 1;
        }
    }

    if missing > 0 {
        warn!(missing, existing = existing.len(), "some segments missing at concat time");
    }

    if existing.len() < 2 {
        return Err(StorageError::InsufficientSegments {
            count: existing.len(),
        });
    }

    let manifest_path = manifest_path_for(out);
    write_manifest(&manifest_path, &existing)?;

    let result = run_ffmpeg_concat(&manifest_path, out, false)
        .or_else(|_| run_ffmpeg_concat(&manifest_path, out, true));

    let _ = std::fs::remove_file(&manifest_path);

    result
}

fn manifest_path_for(out: &Path) -> PathBuf {
    let mut manifest = out.to_path_buf();
    let mut name = manifest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    name.push_str(".txt");
    manifest.set_file_name(name);
    manifest
}

fn write_manifest(manifest_path: &Path, paths: &[PathBuf]) -> Result<(), StorageError> {
    let mut contents = String::new();
    for path in paths {
        let absolute = path
            .canonicalize()
            .unwrap_or_else(|_| path.clone());
        contents.push_str(&format!("file '{}'\n", absolute.display()));
    }
    std::fs::write(manifest_path, contents).map_err(|e| StorageError::ConcatFailed {
        details: format!("failed to write concat manifest: {}", e),
    })
}

fn run_ffmpeg_concat(manifest_path: &Path, out: &Path, reencode: bool) -> Result<(), StorageError> {
    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-y")
        .arg("-f")
        .arg("concat")
        .arg("-safe")
        .arg("0")
        .arg("-i")
        .arg(manifest_path)
        .arg("-fflags")
        .arg("+genpts");

    if reencode {
        cmd.args(["-c:v", "libx264", "-preset", "veryfast"]);
    } else {
        cmd.args(["-c", "copy"]);
    }
    cmd.arg(out);

    debug!(?cmd, reencode, "invoking ffmpeg for segment concat");

    let output = cmd.output().map_err(|e| StorageError::ConcatFailed {
        details: format!("failed to spawn ffmpeg: {}", e),
    })?;

    if !output.status.success() {
        return Err(StorageError::ConcatFailed {
            details: format!(
                "ffmpeg exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn concat_with_fewer_than_two_existing_segments_fails() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("clip.mp4");
        let missing_a = dir.path().join("a.mp4");
        let missing_b = dir.path().join("b.mp4");
        let result = concat_mp4(&out, &[missing_a, missing_b]);
        assert!(matches!(result, Err(StorageError::InsufficientSegments { count: 0 })));
    }

    #[test]
    fn concat_deduplicates_paths_preserving_order() {
        let dir = tempdir().unwrap();
        let seg = dir.path().join("seg.mp4");
        std::fs::write(&seg, b"x").unwrap();
        let mut seen = HashSet::new();
        let inputs = vec![seg.clone(), seg.clone()];
        let deduped: Vec<_> = inputs.iter().filter(|p| seen.insert((*p).clone())).collect();
        assert_eq!(deduped.len(), 1);
    }
}
