#![allow(dead_code)]

use thiserror::Error;

/// Top-level error type for the surveillance node
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Motion detection error: {0}")]
    Motion(#[from] MotionError),

    #[error("Capture loop error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Analysis worker error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Cloud stager error: {0}")]
    Cloud(#[from] CloudError),

    #[error("Streaming server error: {0}")]
    Stream(#[from] StreamError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },

    #[error("Graceful shutdown requested")]
    Shutdown,
}

/// Camera acquisition error types
#[derive(Error, Debug, Clone)]
pub enum CameraError {
    #[error("Failed to open camera device {device}")]
    DeviceOpen { device: u32 },

    #[error("Failed to open camera device {device}: {details}")]
    DeviceOpenWithSource { device: u32, details: String },

    #[error("Failed to configure camera: {details}")]
    Configuration { details: String },

    #[error("Capture stream error: {details}")]
    CaptureStream { details: String },

    #[error("Camera not available (feature disabled or platform unsupported)")]
    NotAvailable,

    #[error("Camera disconnected")]
    Disconnected,
}

/// Motion detection error types
#[derive(Error, Debug)]
pub enum MotionError {
    #[error("Frame decode failed: {details}")]
    FrameDecode { details: String },

    #[error("Frame processing failed: {details}")]
    FrameProcessing { details: String },

    #[error("Feature not available (motion detection disabled)")]
    NotAvailable,

    #[error("Image processing error: {0}")]
    ImageError(#[from] image::ImageError),
}

/// Capture loop error types
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Failed to create record directory {path}: {source}")]
    DirectoryCreation {
        path: String,
        source: std::io::Error,
    },

    #[error("Segment write failed: {details}")]
    SegmentWrite { details: String },

    #[error("Segment commit failed: {details}")]
    SegmentCommit { details: String },

    #[error("JPEG encode failed: {details}")]
    JpegEncode { details: String },
}

/// Local-analysis worker error types
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Runner invocation failed: {details}")]
    RunnerInvocation { details: String },

    #[error("Runner timed out after {timeout_ms}ms")]
    RunnerTimeout { timeout_ms: u64 },

    #[error("Runner produced unreadable output: {details}")]
    UnreadableOutput { details: String },

    #[error("Package read-modify-write failed: {details}")]
    PackageUpdate { details: String },
}

/// Cloud-staging worker error types
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Failed to stage event {event_id}: {details}")]
    StageFailed { event_id: String, details: String },
}

/// HTTP server error types
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Failed to bind to {address}: {source}")]
    BindFailed {
        address: String,
        source: std::io::Error,
    },

    #[error("Server startup failed: {details}")]
    StartupFailed { details: String },

    #[error("Client connection error: {details}")]
    ClientConnection { details: String },
}

/// Package/atomic-write/concat error types
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Atomic write failed for {path}: {details}")]
    AtomicWrite { path: String, details: String },

    #[error("Segment concatenation failed: {details}")]
    ConcatFailed { details: String },

    #[error("Too few segments to concatenate: {count}")]
    InsufficientSegments { count: usize },

    #[error("Package directory operation failed: {details}")]
    PackageIo { details: String },
}

impl NodeError {
    /// Create a system error with a message
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    /// Create a component error with component name and message
    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Whether a failure of this kind is expected to be transient and safe to retry
    pub fn is_recoverable(&self) -> bool {
        match self {
            NodeError::Camera(CameraError::Disconnected) => true,
            NodeError::Camera(CameraError::DeviceOpen { .. }) => true,
            NodeError::Camera(CameraError::DeviceOpenWithSource { .. }) => true,
            NodeError::Stream(StreamError::ClientConnection { .. }) => true,
            NodeError::Io(_) => true,
            NodeError::System { .. } => false,
            NodeError::Shutdown => false,
            _ => false,
        }
    }

    /// Component name for structured log correlation
    pub fn component_name(&self) -> String {
        match self {
            NodeError::Camera(_) => "camera".to_string(),
            NodeError::Motion(_) => "motion".to_string(),
            NodeError::Capture(_) => "capture".to_string(),
            NodeError::Analysis(_) => "analysis".to_string(),
            NodeError::Cloud(_) => "cloud".to_string(),
            NodeError::Stream(_) => "streaming".to_string(),
            NodeError::Storage(_) => "storage".to_string(),
            NodeError::Config(_) => "config".to_string(),
            NodeError::Component { component, .. } => component.clone(),
            _ => "system".to_string(),
        }
    }

    /// Severity classification used to pick the tracing level when an error is logged
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            NodeError::Shutdown => ErrorSeverity::Info,
            NodeError::Camera(CameraError::NotAvailable) => ErrorSeverity::Warning,
            NodeError::Motion(MotionError::NotAvailable) => ErrorSeverity::Warning,
            NodeError::Config(_) => ErrorSeverity::Critical,
            _ if self.is_recoverable() => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }
}

/// Error severity levels for structured logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Info => tracing::Level::INFO,
            ErrorSeverity::Warning => tracing::Level::WARN,
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Critical => tracing::Level::ERROR,
        }
    }
}

/// Convenience type alias for Results
pub type Result<T> = std::result::Result<T, NodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_formatting() {
        let camera_error = NodeError::Camera(CameraError::DeviceOpen { device: 0 });
        assert_eq!(
            camera_error.to_string(),
            "Camera error: Failed to open camera device 0"
        );

        let motion_error = NodeError::Motion(MotionError::FrameProcessing {
            details: "test error".to_string(),
        });
        assert_eq!(
            motion_error.to_string(),
            "Motion detection error: Frame processing failed: test error"
        );

        let system_error = NodeError::system("test system error");
        assert_eq!(system_error.to_string(), "System error: test system error");
    }

    #[test]
    fn test_error_source_chains() {
        use std::error::Error;

        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let node_error = NodeError::Io(io_error);

        assert!(node_error.source().is_some());
        assert_eq!(node_error.source().unwrap().to_string(), "file not found");
    }

    #[test]
    fn test_recoverable_error_classification() {
        assert!(NodeError::Camera(CameraError::Disconnected).is_recoverable());
        assert!(NodeError::Camera(CameraError::DeviceOpen { device: 0 }).is_recoverable());
        assert!(!NodeError::system("critical error").is_recoverable());
        assert!(!NodeError::Shutdown.is_recoverable());
    }

    #[test]
    fn test_component_name_extraction() {
        assert_eq!(
            NodeError::Camera(CameraError::Disconnected).component_name(),
            "camera"
        );
        assert_eq!(
            NodeError::Motion(MotionError::NotAvailable).component_name(),
            "motion"
        );
        assert_eq!(NodeError::system("test").component_name(), "system");
        assert_eq!(
            NodeError::component("custom", "test").component_name(),
            "custom"
        );
    }

    #[test]
    fn test_error_severity_levels() {
        use ErrorSeverity::*;

        assert_eq!(NodeError::Shutdown.severity(), Info);
        assert_eq!(
            NodeError::Camera(CameraError::NotAvailable).severity(),
            Warning
        );
        assert_eq!(NodeError::system("error").severity(), Error);
    }

    #[test]
    fn test_error_severity_to_tracing_level() {
        use ErrorSeverity::*;

        assert_eq!(Info.to_tracing_level(), tracing::Level::INFO);
        assert_eq!(Warning.to_tracing_level(), tracing::Level::WARN);
        assert_eq!(Error.to_tracing_level(), tracing::Level::ERROR);
        assert_eq!(Critical.to_tracing_level(), tracing::Level::ERROR);
    }
}
