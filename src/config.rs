#![allow(dead_code)]

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::ToSocketAddrs;
use std::path::Path;
use tracing::{debug, info};

/// Top-level configuration document for the surveillance node
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NodeConfig {
    pub identity: IdentityConfig,
    pub camera: CameraConfig,
    pub motion: MotionConfig,
    pub event: EventConfig,
    pub router: RouterConfig,
    pub analysis: AnalysisConfig,
    pub cloud: CloudConfig,
    pub stream: StreamConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IdentityConfig {
    /// Stable identifier for this hub, stamped into every incident document
    #[serde(default = "default_hub_id")]
    pub hub_id: String,
    /// Stable identifier for the camera attached to this hub
    #[serde(default = "default_camera_id")]
    pub camera_id: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Camera device index (e.g., 0 for /dev/video0)
    #[serde(default = "default_camera_index")]
    pub index: u32,
    /// Capture resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),
    /// Frames per second
    #[serde(default = "default_camera_fps")]
    pub fps: u32,
    /// Path to a TrueType font file for the overlay status line; boxes are
    /// always drawn, status text only when a font loads successfully
    #[serde(default)]
    pub overlay_font_path: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MotionConfig {
    /// Minimum contour area to trigger motion
    #[serde(default = "default_motion_area_min")]
    pub area_min: f64,
    /// Per-pixel delta threshold for motion detection
    #[serde(default = "default_motion_pixel_thresh")]
    pub pixel_thresh: u8,
    /// Number of dilation iterations applied to the motion mask
    #[serde(default = "default_motion_dilate_iters")]
    pub dilate_iters: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EventConfig {
    /// Consecutive motion frames required to open an event
    #[serde(default = "default_event_on_frames")]
    pub on_frames: u32,
    /// Seconds without motion required to close an event
    #[serde(default = "default_event_off_seconds")]
    pub off_seconds: f64,
    /// Preroll duration in seconds
    #[serde(default = "default_preroll_seconds")]
    pub preroll_seconds: f64,
    /// Postroll duration in seconds
    #[serde(default = "default_postroll_seconds")]
    pub postroll_seconds: f64,
    /// Length of one segment file in seconds
    #[serde(default = "default_segment_seconds")]
    pub segment_seconds: f64,
    /// Hard cap on a single event's duration in seconds
    #[serde(default = "default_max_event_seconds")]
    pub max_event_seconds: f64,
    /// How much JPEG-frame history the live frame ring keeps, in seconds
    #[serde(default = "default_frame_ring_seconds")]
    pub frame_ring_seconds: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RouterConfig {
    /// Minimum normalized brightness below which frames are too dark to route locally
    #[serde(default = "default_brightness_min")]
    pub brightness_min: f64,
    /// Minimum Laplacian-variance sharpness below which frames are too blurred
    #[serde(default = "default_blur_var_min")]
    pub blur_var_min: f64,
    /// CPU load percentage above which local inference is skipped
    #[serde(default = "default_cpu_high_pct")]
    pub cpu_high_pct: f64,
    /// Network latency in milliseconds above which the cloud is considered slow
    #[serde(default = "default_net_slow_ms")]
    pub net_slow_ms: f64,
    /// URL probed to determine cloud reachability and latency
    #[serde(default = "default_cloud_health_url")]
    pub cloud_health_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AnalysisConfig {
    /// Confidence above which a local-only result is considered complete
    #[serde(default = "default_complete_confidence_thresh")]
    pub complete_confidence_thresh: f64,
    /// Number of frames sampled from the clip for local inference
    #[serde(default = "default_local_infer_frames")]
    pub local_infer_frames: u32,
    /// Detection confidence threshold passed to the local inference runner
    #[serde(default = "default_local_infer_thresh")]
    pub local_infer_thresh: f64,
    /// Path to the external local-inference runner binary
    #[serde(default = "default_runner_path")]
    pub runner_path: String,
    /// Wall-clock timeout in milliseconds before the runner is killed
    #[serde(default = "default_runner_timeout_ms")]
    pub runner_timeout_ms: u64,
    /// Bounded capacity of the analysis job queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CloudConfig {
    /// Bounded capacity of the cloud upload queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StreamConfig {
    /// IP address to bind to
    #[serde(default = "default_stream_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_stream_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Base path under which events and their final packages are written
    #[serde(default = "default_record_dir")]
    pub record_dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Minimum log level (e.g. "info", "debug")
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log output format ("pretty" or "json")
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl NodeConfig {
    /// Load configuration from the default file name, falling back to compiled-in defaults
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_file("sentry.toml")
    }

    /// Load configuration from a specific file path, layered over defaults and environment
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("identity.hub_id", default_hub_id())?
            .set_default("identity.camera_id", default_camera_id())?
            .set_default("camera.index", default_camera_index())?
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("camera.fps", default_camera_fps())?
            .set_default("motion.area_min", default_motion_area_min())?
            .set_default("motion.pixel_thresh", default_motion_pixel_thresh() as i64)?
            .set_default("motion.dilate_iters", default_motion_dilate_iters())?
            .set_default("event.on_frames", default_event_on_frames())?
            .set_default("event.off_seconds", default_event_off_seconds())?
            .set_default("event.preroll_seconds", default_preroll_seconds())?
            .set_default("event.postroll_seconds", default_postroll_seconds())?
            .set_default("event.segment_seconds", default_segment_seconds())?
            .set_default("event.max_event_seconds", default_max_event_seconds())?
            .set_default("event.frame_ring_seconds", default_frame_ring_seconds())?
            .set_default("router.brightness_min", default_brightness_min())?
            .set_default("router.blur_var_min", default_blur_var_min())?
            .set_default("router.cpu_high_pct", default_cpu_high_pct())?
            .set_default("router.net_slow_ms", default_net_slow_ms())?
            .set_default("router.cloud_health_url", default_cloud_health_url())?
            .set_default(
                "analysis.complete_confidence_thresh",
                default_complete_confidence_thresh(),
            )?
            .set_default("analysis.local_infer_frames", default_local_infer_frames())?
            .set_default("analysis.local_infer_thresh", default_local_infer_thresh())?
            .set_default("analysis.runner_path", default_runner_path())?
            .set_default("analysis.runner_timeout_ms", default_runner_timeout_ms())?
            .set_default("analysis.queue_capacity", default_queue_capacity() as i64)?
            .set_default("cloud.queue_capacity", default_queue_capacity() as i64)?
            .set_default("stream.host", default_stream_host())?
            .set_default("stream.port", default_stream_port())?
            .set_default("storage.record_dir", default_record_dir())?
            .set_default("logging.level", default_log_level())?
            .set_default("logging.format", default_log_format())?
            .add_source(File::with_name(&path_str).required(false))
            .add_source(Environment::with_prefix("SENTRY").separator("_"))
            .build()?;

        let config: NodeConfig = settings.try_deserialize()?;

        info!("configuration loaded successfully");
        debug!("final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values; a fatal condition at startup if it fails
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(config::ConfigError::Message(
                "camera resolution must be greater than 0".to_string(),
            ));
        }
        if self.camera.fps == 0 {
            return Err(config::ConfigError::Message(
                "camera fps must be greater than 0".to_string(),
            ));
        }
        if self.event.preroll_seconds <= 0.0
            || self.event.postroll_seconds <= 0.0
            || self.event.segment_seconds <= 0.0
            || self.event.max_event_seconds <= 0.0
        {
            return Err(config::ConfigError::Message(
                "event timing fields must be positive".to_string(),
            ));
        }
        if self.analysis.queue_capacity == 0 || self.cloud.queue_capacity == 0 {
            return Err(config::ConfigError::Message(
                "queue capacities must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.analysis.complete_confidence_thresh)
            || !(0.0..=1.0).contains(&self.analysis.local_infer_thresh)
        {
            return Err(config::ConfigError::Message(
                "confidence thresholds must lie in [0, 1]".to_string(),
            ));
        }
        let addr = format!("{}:{}", self.stream.host, self.stream.port);
        if addr.to_socket_addrs().is_err() {
            return Err(config::ConfigError::Message(format!(
                "stream bind address is invalid: {}",
                addr
            )));
        }
        Ok(())
    }

    /// The segment ring buffer retention window: long enough to always contain
    /// a full preroll + the longest possible event + postroll, plus scheduling margin.
    pub fn segment_keep_seconds(&self) -> f64 {
        self.event.preroll_seconds + self.event.max_event_seconds + self.event.postroll_seconds
            + 15.0
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            identity: IdentityConfig {
                hub_id: default_hub_id(),
                camera_id: default_camera_id(),
            },
            camera: CameraConfig {
                index: default_camera_index(),
                resolution: default_camera_resolution(),
                fps: default_camera_fps(),
                overlay_font_path: None,
            },
            motion: MotionConfig {
                area_min: default_motion_area_min(),
                pixel_thresh: default_motion_pixel_thresh(),
                dilate_iters: default_motion_dilate_iters(),
            },
            event: EventConfig {
                on_frames: default_event_on_frames(),
                off_seconds: default_event_off_seconds(),
                preroll_seconds: default_preroll_seconds(),
                postroll_seconds: default_postroll_seconds(),
                segment_seconds: default_segment_seconds(),
                max_event_seconds: default_max_event_seconds(),
                frame_ring_seconds: default_frame_ring_seconds(),
            },
            router: RouterConfig {
                brightness_min: default_brightness_min(),
                blur_var_min: default_blur_var_min(),
                cpu_high_pct: default_cpu_high_pct(),
                net_slow_ms: default_net_slow_ms(),
                cloud_health_url: default_cloud_health_url(),
            },
            analysis: AnalysisConfig {
                complete_confidence_thresh: default_complete_confidence_thresh(),
                local_infer_frames: default_local_infer_frames(),
                local_infer_thresh: default_local_infer_thresh(),
                runner_path: default_runner_path(),
                runner_timeout_ms: default_runner_timeout_ms(),
                queue_capacity: default_queue_capacity(),
            },
            cloud: CloudConfig {
                queue_capacity: default_queue_capacity(),
            },
            stream: StreamConfig {
                host: default_stream_host(),
                port: default_stream_port(),
            },
            storage: StorageConfig {
                record_dir: default_record_dir(),
            },
            logging: LoggingConfig {
                level: default_log_level(),
                format: default_log_format(),
            },
        }
    }
}

fn default_hub_id() -> String {
    "HUB_UUID_MISSING".to_string()
}
fn default_camera_id() -> String {
    "CAM_UUID_MISSING".to_string()
}
fn default_camera_index() -> u32 {
    0
}
fn default_camera_resolution() -> (u32, u32) {
    (1280, 720)
}
fn default_camera_fps() -> u32 {
    10
}
fn default_motion_area_min() -> f64 {
    900.0
}
fn default_motion_pixel_thresh() -> u8 {
    25
}
fn default_motion_dilate_iters() -> u32 {
    2
}
fn default_event_on_frames() -> u32 {
    3
}
fn default_event_off_seconds() -> f64 {
    8.0
}
fn default_preroll_seconds() -> f64 {
    30.0
}
fn default_postroll_seconds() -> f64 {
    3.0
}
fn default_segment_seconds() -> f64 {
    1.0
}
fn default_max_event_seconds() -> f64 {
    300.0
}
fn default_frame_ring_seconds() -> f64 {
    35.0
}
fn default_brightness_min() -> f64 {
    0.20
}
fn default_blur_var_min() -> f64 {
    60.0
}
fn default_cpu_high_pct() -> f64 {
    85.0
}
fn default_net_slow_ms() -> f64 {
    250.0
}
fn default_cloud_health_url() -> String {
    String::new()
}
fn default_complete_confidence_thresh() -> f64 {
    0.70
}
fn default_local_infer_frames() -> u32 {
    5
}
fn default_local_infer_thresh() -> f64 {
    0.50
}
fn default_runner_path() -> String {
    "./bin/local_infer_runner".to_string()
}
fn default_runner_timeout_ms() -> u64 {
    30_000
}
fn default_queue_capacity() -> usize {
    64
}
fn default_stream_host() -> String {
    "0.0.0.0".to_string()
}
fn default_stream_port() -> u16 {
    8080
}
fn default_record_dir() -> String {
    "./events".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = NodeConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: NodeConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.camera.fps, config.camera.fps);
        assert_eq!(parsed.event.preroll_seconds, config.event.preroll_seconds);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(NodeConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_fps() {
        let mut config = NodeConfig::default();
        config.camera.fps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_thresholds() {
        let mut config = NodeConfig::default();
        config.analysis.complete_confidence_thresh = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_queue_capacity() {
        let mut config = NodeConfig::default();
        config.analysis.queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn segment_keep_seconds_matches_reference_formula() {
        let config = NodeConfig::default();
        let expected = config.event.preroll_seconds
            + config.event.max_event_seconds
            + config.event.postroll_seconds
            + 15.0;
        assert_eq!(config.segment_keep_seconds(), expected);
    }

    #[test]
    fn load_from_missing_file_falls_back_to_defaults() {
        let config = NodeConfig::load_from_file("does_not_exist.toml").expect("load");
        assert_eq!(config.camera.fps, default_camera_fps());
    }
}
