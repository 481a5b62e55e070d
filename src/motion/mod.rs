//! Per-frame foreground detection.

#[cfg(feature = "motion")]
pub mod detector;

#[cfg(feature = "motion")]
pub use detector::{BoundingBox, MotionDetector};

#[cfg(not(feature = "motion"))]
mod disabled {
    use crate::config::MotionConfig;
    use crate::error::MotionError;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct BoundingBox {
        pub x: u32,
        pub y: u32,
        pub width: u32,
        pub height: u32,
        pub area: f64,
    }

    /// Stand-in used when the `motion` feature is compiled out: always reports no motion.
    pub struct MotionDetector;

    impl MotionDetector {
        pub fn new(_config: MotionConfig) -> Self {
            Self
        }

        pub fn update_config(&mut self, _config: MotionConfig) {}

        pub fn detect(
            &mut self,
            _gray: &image::GrayImage,
        ) -> Result<(Vec<BoundingBox>, f64), MotionError> {
            Err(MotionError::NotAvailable)
        }

        pub fn detect_jpeg(&mut self, _jpeg: &[u8]) -> Result<(Vec<BoundingBox>, f64), MotionError> {
            Err(MotionError::NotAvailable)
        }
    }
}

#[cfg(not(feature = "motion"))]
pub use disabled::{BoundingBox, MotionDetector};
