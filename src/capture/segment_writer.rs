use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use image::RgbImage;
use tracing::{debug, warn};

use crate::error::CaptureError;

/// One rolling MP4 segment, fed raw RGB frames over an `ffmpeg` subprocess's
/// stdin and muxed as they arrive.
///
/// A segment is "closed" (per the data model) once its `ffmpeg` process has
/// exited and the resulting file is larger than 1 KiB; a segment that never
/// reaches that size (a camera stall, a crash mid-write) is treated as
/// unusable and discarded by the caller rather than added to the ring.
pub struct SegmentWriter {
    path: PathBuf,
    child: Child,
    width: u32,
    height: u32,
}

const MIN_VALID_SEGMENT_BYTES: u64 = 1024;

impl SegmentWriter {
    pub fn open(path: &Path, width: u32, height: u32, fps: u32) -> Result<Self, CaptureError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CaptureError::SegmentWrite {
                details: format!("failed to create segment directory: {}", e),
            })?;
        }

        let child = Command::new("ffmpeg")
            .args([
                "-y",
                "-loglevel", "error",
                "-f", "rawvideo",
                "-pix_fmt", "rgb24",
                "-s", &format!("{}x{}", width, height),
                "-r", &fps.to_string(),
                "-i", "-",
                "-an",
                "-c:v", "mpeg4",
                "-pix_fmt", "yuv420p",
            ])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CaptureError::SegmentWrite {
                details: format!("failed to spawn ffmpeg for segment: {}", e),
            })?;

        debug!(path = %path.display(), width, height, fps, "opened segment writer");

        Ok(Self { path: path.to_path_buf(), child, width, height })
    }

    pub fn write_frame(&mut self, frame: &RgbImage) -> Result<(), CaptureError> {
        if frame.width() != self.width || frame.height() != self.height {
            return Err(CaptureError::SegmentWrite {
                details: "frame dimensions do not match segment writer".to_string(),
            });
        }
        let stdin = self.child.stdin.as_mut().ok_or_else(|| CaptureError::SegmentWrite {
            details: "segment writer stdin already closed".to_string(),
        })?;
        stdin.write_all(frame.as_raw()).map_err(|e| CaptureError::SegmentWrite {
            details: format!("failed to write frame to segment: {}", e),
        })
    }

    /// Closes stdin, waits for `ffmpeg` to finish muxing, and returns the
    /// path only if the resulting file looks valid.
    pub fn close(mut self) -> Result<PathBuf, CaptureError> {
        drop(self.child.stdin.take());
        let output = self.child.wait_with_output().map_err(|e| CaptureError::SegmentWrite {
            details: format!("failed to wait for segment writer: {}", e),
        })?;

        let size = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        if !output.status.success() || size < MIN_VALID_SEGMENT_BYTES {
            warn!(
                path = %self.path.display(),
                status = %output.status,
                size,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "segment did not close cleanly, discarding"
            );
            let _ = std::fs::remove_file(&self.path);
            return Err(CaptureError::SegmentWrite {
                details: "segment closed below minimum valid size".to_string(),
            });
        }

        Ok(self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_frame_rejects_mismatched_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.mp4");
        if Command::new("ffmpeg").arg("-version").output().is_err() {
            return;
        }
        let mut writer = SegmentWriter::open(&path, 16, 16, 5).unwrap();
        let wrong = RgbImage::new(8, 8);
        assert!(writer.write_frame(&wrong).is_err());
        let _ = writer.close();
    }
}
