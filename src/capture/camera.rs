use std::time::{SystemTime, UNIX_EPOCH};

use image::RgbImage;
use tracing::{info, warn};

use crate::config::CameraConfig;
use crate::error::CameraError;

/// One decoded RGB frame read from the camera, with its capture timestamp.
pub struct CapturedFrame {
    pub rgb: RgbImage,
    pub ts: f64,
}

/// Blocking, synchronous camera source.
///
/// Unlike the async push-callback pattern used elsewhere, the capture loop
/// pulls one frame per iteration on its own thread, so `read_frame` is
/// allowed to block up to the configured frame budget.
pub trait Camera: Send {
    fn read_frame(&mut self) -> Result<CapturedFrame, CameraError>;
    fn width(&self) -> u32;
    fn height(&self) -> u32;
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(all(target_os = "linux", feature = "camera"))]
pub struct GstCamera {
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    width: u32,
    height: u32,
}

#[cfg(all(target_os = "linux", feature = "camera"))]
impl GstCamera {
    pub fn open(config: &CameraConfig) -> Result<Self, CameraError> {
        use gstreamer::prelude::*;

        gstreamer::init().map_err(|e| CameraError::Configuration {
            details: format!("failed to initialize gstreamer: {}", e),
        })?;

        let (width, height) = config.resolution;
        let pipeline_desc = format!(
            "v4l2src device=/dev/video{} io-mode=mmap do-timestamp=true ! \
             videoconvert ! video/x-raw,format=RGB,width={},height={},framerate={}/1 ! \
             appsink name=sink sync=true max-buffers=2 drop=true",
            config.index, width, height, config.fps
        );

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| CameraError::Configuration {
                details: format!("failed to build pipeline: {}", e),
            })?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| CameraError::Configuration {
                details: "pipeline downcast failed".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| CameraError::Configuration {
                details: "appsink 'sink' not found in pipeline".to_string(),
            })?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| CameraError::Configuration {
                details: "appsink downcast failed".to_string(),
            })?;

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| CameraError::Configuration {
                details: format!("failed to start pipeline: {}", e),
            })?;

        info!(device = config.index, width, height, fps = config.fps, "camera pipeline playing");

        Ok(Self { pipeline, appsink, width, height })
    }
}

#[cfg(all(target_os = "linux", feature = "camera"))]
impl Camera for GstCamera {
    fn read_frame(&mut self) -> Result<CapturedFrame, CameraError> {
        let sample = self
            .appsink
            .pull_sample()
            .map_err(|e| CameraError::CaptureStream { details: e.to_string() })?;
        let buffer = sample.buffer().ok_or_else(|| CameraError::CaptureStream {
            details: "sample had no buffer".to_string(),
        })?;
        let map = buffer.map_readable().map_err(|e| CameraError::CaptureStream {
            details: format!("failed to map buffer: {}", e),
        })?;

        let rgb = RgbImage::from_raw(self.width, self.height, map.as_slice().to_vec())
            .ok_or_else(|| CameraError::CaptureStream {
                details: "frame buffer size did not match configured resolution".to_string(),
            })?;

        Ok(CapturedFrame { rgb, ts: now_secs() })
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

#[cfg(all(target_os = "linux", feature = "camera"))]
impl Drop for GstCamera {
    fn drop(&mut self) {
        use gstreamer::prelude::*;
        let _ = self.pipeline.set_state(gstreamer::State::Null);
    }
}

/// Synthetic frame source used on non-Linux hosts and wherever the `camera`
/// feature is disabled; produces a deterministic moving pattern so the rest
/// of the pipeline (motion, router, FSM) can still be exercised end to end.
pub struct MockCamera {
    width: u32,
    height: u32,
    tick: u64,
}

impl MockCamera {
    pub fn open(config: &CameraConfig) -> Self {
        warn!("camera feature disabled or non-Linux host, using synthetic frame source");
        let (width, height) = config.resolution;
        Self { width, height, tick: 0 }
    }
}

impl Camera for MockCamera {
    fn read_frame(&mut self) -> Result<CapturedFrame, CameraError> {
        let mut rgb = RgbImage::from_pixel(self.width, self.height, image::Rgb([40, 40, 40]));
        let offset = (self.tick % self.width.max(1) as u64) as u32;
        let size = 20.min(self.width).min(self.height);
        for dy in 0..size {
            for dx in 0..size {
                let x = (offset + dx) % self.width.max(1);
                let y = dy % self.height.max(1);
                rgb.put_pixel(x, y, image::Rgb([220, 220, 220]));
            }
        }
        self.tick += 1;
        Ok(CapturedFrame { rgb, ts: now_secs() })
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

/// Open the configured camera, falling back to the synthetic source when the
/// hardware path is unavailable at compile time.
pub fn open_camera(config: &CameraConfig) -> Result<Box<dyn Camera>, CameraError> {
    #[cfg(all(target_os = "linux", feature = "camera"))]
    {
        return Ok(Box::new(GstCamera::open(config)?));
    }
    #[cfg(not(all(target_os = "linux", feature = "camera")))]
    {
        Ok(Box::new(MockCamera::open(config)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_camera_reports_configured_resolution() {
        let config = CameraConfig { index: 0, resolution: (64, 48), fps: 10, overlay_font_path: None };
        let mut camera = MockCamera::open(&config);
        assert_eq!(camera.width(), 64);
        assert_eq!(camera.height(), 48);
        let frame = camera.read_frame().unwrap();
        assert_eq!(frame.rgb.width(), 64);
    }

    #[test]
    fn mock_camera_frames_change_over_time() {
        let config = CameraConfig { index: 0, resolution: (32, 32), fps: 10, overlay_font_path: None };
        let mut camera = MockCamera::open(&config);
        let a = camera.read_frame().unwrap();
        let b = camera.read_frame().unwrap();
        assert_ne!(a.rgb.as_raw(), b.rgb.as_raw());
    }
}
