use std::collections::HashMap;

use image::{GrayImage, Luma};
use imageproc::contrast::threshold;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::dilate;
use imageproc::region_labelling::{connected_components, Connectivity};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::MotionConfig;
use crate::error::MotionError;

/// An axis-aligned bounding box around a qualifying moving region, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub area: f64,
}

/// Per-frame foreground detector.
///
/// Differences each incoming frame against the single immediately preceding
/// blurred grayscale frame — not a running background model — per the
/// frame-differencing design this node relies on for cheap, drift-free
/// motion sensing on static cameras.
pub struct MotionDetector {
    config: MotionConfig,
    previous_frame: Option<GrayImage>,
}

impl MotionDetector {
    pub fn new(config: MotionConfig) -> Self {
        Self {
            config,
            previous_frame: None,
        }
    }

    pub fn update_config(&mut self, config: MotionConfig) {
        self.config = config;
    }

    /// Run detection against a decoded grayscale frame.
    ///
    /// The first frame ever seen has no prior reference and always reports
    /// no motion while still seeding `previous_frame`.
    pub fn detect(&mut self, gray: &GrayImage) -> Result<(Vec<BoundingBox>, f64), MotionError> {
        let blurred = gaussian_blur_f32(gray, 2.0);

        let Some(previous) = self.previous_frame.take() else {
            trace!("motion detector seeding previous frame, no reference yet");
            self.previous_frame = Some(blurred);
            return Ok((Vec::new(), 0.0));
        };

        if previous.dimensions() != blurred.dimensions() {
            self.previous_frame = Some(blurred);
            return Ok((Vec::new(), 0.0));
        }

        let diff = absolute_difference(&previous, &blurred);
        let binary = threshold(&diff, self.config.pixel_thresh);
        let dilate_k = self.config.dilate_iters.clamp(1, 255) as u8;
        let dilated = dilate(&binary, imageproc::distance_transform::Norm::LInf, dilate_k);

        let components = connected_components(&dilated, Connectivity::Eight, Luma([0u8]));
        let (boxes, total_area) = self.qualifying_boxes(&components);

        self.previous_frame = Some(blurred);

        debug!(
            boxes = boxes.len(),
            total_area, "motion detection pass complete"
        );
        Ok((boxes, total_area))
    }

    /// Decode a JPEG frame to grayscale and run detection in one step.
    pub fn detect_jpeg(&mut self, jpeg: &[u8]) -> Result<(Vec<BoundingBox>, f64), MotionError> {
        let dynamic_image = image::load_from_memory(jpeg).map_err(MotionError::ImageError)?;
        self.detect(&dynamic_image.to_luma8())
    }

    fn qualifying_boxes(
        &self,
        components: &image::ImageBuffer<Luma<u32>, Vec<u32>>,
    ) -> (Vec<BoundingBox>, f64) {
        struct Accum {
            min_x: u32,
            min_y: u32,
            max_x: u32,
            max_y: u32,
            count: f64,
        }

        let mut accum: HashMap<u32, Accum> = HashMap::new();
        for (x, y, pixel) in components.enumerate_pixels() {
            let id = pixel[0];
            if id == 0 {
                continue;
            }
            let entry = accum.entry(id).or_insert(Accum {
                min_x: x,
                min_y: y,
                max_x: x,
                max_y: y,
                count: 0.0,
            });
            entry.min_x = entry.min_x.min(x);
            entry.min_y = entry.min_y.min(y);
            entry.max_x = entry.max_x.max(x);
            entry.max_y = entry.max_y.max(y);
            entry.count += 1.0;
        }

        let mut boxes = Vec::new();
        let mut total_area = 0.0;
        for a in accum.values() {
            if a.count >= self.config.area_min {
                boxes.push(BoundingBox {
                    x: a.min_x,
                    y: a.min_y,
                    width: a.max_x - a.min_x + 1,
                    height: a.max_y - a.min_y + 1,
                    area: a.count,
                });
                total_area += a.count;
            }
        }
        (boxes, total_area)
    }
}

fn absolute_difference(a: &GrayImage, b: &GrayImage) -> GrayImage {
    let (width, height) = a.dimensions();
    let mut out = GrayImage::new(width, height);
    for (x, y, pa) in a.enumerate_pixels() {
        let pb = b.get_pixel(x, y);
        let diff = (pa[0] as i16 - pb[0] as i16).unsigned_abs() as u8;
        out.put_pixel(x, y, Luma([diff]));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};

    fn solid(width: u32, height: u32, value: u8) -> GrayImage {
        ImageBuffer::from_pixel(width, height, Luma([value]))
    }

    fn default_config() -> MotionConfig {
        MotionConfig {
            area_min: 10.0,
            pixel_thresh: 25,
            dilate_iters: 2,
        }
    }

    #[test]
    fn first_frame_produces_no_motion() {
        let mut detector = MotionDetector::new(default_config());
        let (boxes, area) = detector.detect(&solid(32, 32, 50)).unwrap();
        assert!(boxes.is_empty());
        assert_eq!(area, 0.0);
    }

    #[test]
    fn identical_frames_produce_no_motion() {
        let mut detector = MotionDetector::new(default_config());
        detector.detect(&solid(32, 32, 50)).unwrap();
        let (boxes, area) = detector.detect(&solid(32, 32, 50)).unwrap();
        assert!(boxes.is_empty());
        assert_eq!(area, 0.0);
    }

    #[test]
    fn large_brightness_change_produces_a_bounding_box() {
        let mut detector = MotionDetector::new(default_config());
        detector.detect(&solid(32, 32, 10)).unwrap();
        let mut bright = solid(32, 32, 10);
        for y in 8..24 {
            for x in 8..24 {
                bright.put_pixel(x, y, Luma([250]));
            }
        }
        let (boxes, area) = detector.detect(&bright).unwrap();
        assert!(!boxes.is_empty());
        assert!(area > 0.0);
    }
}
