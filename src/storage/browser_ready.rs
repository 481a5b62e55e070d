use std::path::Path;
use std::process::Command;

use tracing::{error, info, warn};

/// Best-effort re-encode of `mp4_path` to a browser-friendly H.264/yuv420p
/// layout with a faststart moov atom. Replaces the file in-place on success.
///
/// Failure — including ffmpeg being entirely absent — is non-fatal: the
/// original concat output remains the package's `clip.mp4`.
pub fn make_browser_ready(mp4_path: &Path) -> bool {
    if !mp4_path.exists() {
        warn!(path = %mp4_path.display(), "clip not found, skipping browser-ready re-encode");
        return false;
    }

    let tmp_path = tmp_path_for(mp4_path);
    let output = Command::new("ffmpeg")
        .arg("-y")
        .arg("-i")
        .arg(mp4_path)
        .args([
            "-c:v", "libx264",
            "-pix_fmt", "yuv420p",
            "-preset", "veryfast",
            "-crf", "23",
            "-movflags", "+faststart",
            "-an",
        ])
        .arg(&tmp_path)
        .output();

    match output {
        Ok(out) if out.status.success() => match std::fs::rename(&tmp_path, mp4_path) {
            Ok(()) => {
                info!(path = %mp4_path.display(), "re-encoded clip to browser-ready H.264");
                true
            }
            Err(e) => {
                error!(path = %mp4_path.display(), error = %e, "failed to replace clip with re-encoded output");
                let _ = std::fs::remove_file(&tmp_path);
                false
            }
        },
        Ok(out) => {
            let stderr_tail = tail(&out.stderr, 400);
            error!(path = %mp4_path.display(), stderr = %stderr_tail, "ffmpeg browser-ready re-encode failed");
            let _ = std::fs::remove_file(&tmp_path);
            false
        }
        Err(e) => {
            error!(error = %e, "ffmpeg not found, skipping browser-ready re-encode");
            let _ = std::fs::remove_file(&tmp_path);
            false
        }
    }
}

fn tmp_path_for(path: &Path) -> std::path::PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    path.with_file_name(format!("{}.h264.tmp.mp4", stem))
}

fn tail(bytes: &[u8], max_len: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= max_len {
        text.to_string()
    } else {
        text.chars().rev().take(max_len).collect::<Vec<_>>().into_iter().rev().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_clip_is_reported_as_failure_without_panicking() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("clip.mp4");
        assert!(!make_browser_ready(&missing));
    }

    #[test]
    fn tail_truncates_to_last_n_bytes() {
        let long = vec![b'x'; 1000];
        assert_eq!(tail(&long, 400).len(), 400);
    }
}
