use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, warn};

/// Raw output of invoking the external local-inference runner: a parsed JSON
/// document plus the measured wall-clock latency.
pub struct RunnerOutput {
    pub document: Value,
    pub latency_ms: i64,
}

/// Invoke the external runner binary and read its result document.
///
/// The runner writes its own output file; this function's job is purely to
/// spawn it, bound it with a timeout, and read back what it wrote. A
/// non-zero exit, missing output, or unreadable JSON all become a
/// synthesized `{status: error, ...}` document rather than a Rust error,
/// since the never-stall invariant requires a document either way.
pub fn invoke_runner(
    runner_path: &str,
    event_id: u64,
    mp4_path: &Path,
    out_path: &Path,
    frames: u32,
    threshold: f64,
    timeout: Duration,
) -> RunnerOutput {
    if let Some(parent) = out_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    if !Path::new(runner_path).exists() {
        return synthesize_error(
            event_id,
            format!("runner not found: {}", runner_path),
            0,
        );
    }

    let mut command = Command::new(runner_path);
    command
        .arg("--event_id")
        .arg(event_id.to_string())
        .arg("--mp4")
        .arg(mp4_path)
        .arg("--out")
        .arg(out_path)
        .arg("--frames")
        .arg(frames.to_string())
        .arg("--threshold")
        .arg(threshold.to_string())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let started = Instant::now();
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            return synthesize_error(event_id, format!("failed to spawn runner: {}", e), 0);
        }
    };

    let status = wait_with_timeout(&mut child, timeout);
    let latency_ms = started.elapsed().as_millis() as i64;

    match status {
        Ok(Some(exit_status)) if exit_status.success() => read_output(event_id, out_path, latency_ms),
        Ok(Some(exit_status)) => {
            let output = child.wait_with_output();
            let tail = output
                .map(|o| {
                    let combined = if !o.stderr.is_empty() { o.stderr } else { o.stdout };
                    truncate(&String::from_utf8_lossy(&combined), 800)
                })
                .unwrap_or_default();
            warn!(event_id, status = %exit_status, "runner exited non-zero");
            synthesize_error(event_id, tail, latency_ms)
        }
        Ok(None) => {
            warn!(event_id, timeout_ms = timeout.as_millis(), "runner timed out, killing");
            let _ = child.kill();
            let _ = child.wait();
            synthesize_error(
                event_id,
                format!("runner timed out after {}ms", timeout.as_millis()),
                latency_ms,
            )
        }
        Err(e) => synthesize_error(event_id, format!("failed to wait on runner: {}", e), latency_ms),
    }
}

fn wait_with_timeout(
    child: &mut std::process::Child,
    timeout: Duration,
) -> std::io::Result<Option<std::process::ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        std::thread::sleep(Duration::from_millis(25));
    }
}

fn read_output(event_id: u64, out_path: &Path, latency_ms: i64) -> RunnerOutput {
    match std::fs::read_to_string(out_path) {
        Ok(text) => match serde_json::from_str::<Value>(&text) {
            Ok(mut document) => {
                if document.get("latency_ms").is_none() {
                    if let Value::Object(ref mut map) = document {
                        map.insert("latency_ms".to_string(), latency_ms.into());
                    }
                }
                RunnerOutput { document, latency_ms }
            }
            Err(e) => synthesize_error(event_id, format!("runner produced unreadable json: {}", e), latency_ms),
        },
        Err(e) => synthesize_error(event_id, format!("failed to read runner output: {}", e), latency_ms),
    }
}

fn synthesize_error(event_id: u64, error: String, latency_ms: i64) -> RunnerOutput {
    debug!(event_id, %error, "synthesizing error result for analysis job");
    RunnerOutput {
        document: serde_json::json!({
            "event_id": event_id.to_string(),
            "model": "edgeimpulse_fomo_local",
            "status": "error",
            "error": truncate(&error, 800),
            "latency_ms": latency_ms,
        }),
        latency_ms,
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        s.chars().take(max_len).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_runner_binary_synthesizes_error_result() {
        let dir = tempdir().unwrap();
        let mp4 = dir.path().join("clip.mp4");
        let out = dir.path().join("result.json");
        std::fs::write(&mp4, b"x").unwrap();
        let output = invoke_runner(
            "/does/not/exist/runner",
            1,
            &mp4,
            &out,
            5,
            0.5,
            Duration::from_millis(500),
        );
        assert_eq!(output.document["status"], "error");
    }

    #[test]
    fn truncate_caps_error_string_length() {
        let long = "x".repeat(2000);
        assert_eq!(truncate(&long, 800).len(), 800);
    }
}
