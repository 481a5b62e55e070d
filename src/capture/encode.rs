use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};
use tracing::warn;

use crate::motion::BoundingBox;

const JPEG_QUALITY: u8 = 80;
const OVERLAY_FONT_SIZE: f32 = 16.0;

/// Loads the overlay font lazily; a missing or unreadable font file is
/// logged once and overlay text is simply skipped from then on, since a
/// font is cosmetic and must never block the capture loop.
pub struct OverlayFont {
    font: Option<Font<'static>>,
}

impl OverlayFont {
    pub fn load(path: &str) -> Self {
        let font = match std::fs::read(path) {
            Ok(bytes) => Font::try_from_vec(bytes).or_else(|| {
                warn!(path, "overlay font file did not parse, drawing boxes only");
                None
            }),
            Err(e) => {
                warn!(path, error = %e, "overlay font unavailable, drawing boxes only");
                None
            }
        };
        Self { font }
    }

    pub fn none() -> Self {
        Self { font: None }
    }
}

/// Draws motion bounding boxes and a one-line status string onto `frame`,
/// then JPEG-encodes the result at a fixed quality.
pub fn draw_overlay_and_encode(
    mut frame: RgbaImage,
    boxes: &[BoundingBox],
    status_text: &str,
    font: &OverlayFont,
) -> Vec<u8> {
    for bbox in boxes {
        let rect = Rect::at(bbox.x as i32, bbox.y as i32).of_size(bbox.width.max(1), bbox.height.max(1));
        draw_hollow_rect_mut(&mut frame, rect, Rgba([0, 255, 0, 255]));
    }

    if let Some(font) = &font.font {
        let scale = Scale::uniform(OVERLAY_FONT_SIZE);
        let (_, text_height) = text_size(scale, font, status_text);
        let y = frame.height().saturating_sub(text_height as u32 + 6) as i32;
        draw_text_mut(&mut frame, Rgba([255, 255, 0, 255]), 6, y, scale, font, status_text);
    }

    encode_jpeg(&frame)
}

pub fn encode_jpeg(frame: &RgbaImage) -> Vec<u8> {
    let mut buf = Vec::new();
    let rgb = image::DynamicImage::ImageRgba8(frame.clone()).to_rgb8();
    let mut encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
    let _ = encoder.encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        image::ColorType::Rgb8,
    );
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_jpeg_produces_nonempty_output() {
        let img = RgbaImage::from_pixel(16, 16, Rgba([10, 20, 30, 255]));
        let jpeg = encode_jpeg(&img);
        assert!(!jpeg.is_empty());
        assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn draw_overlay_without_font_still_draws_boxes() {
        let img = RgbaImage::from_pixel(32, 32, Rgba([0, 0, 0, 255]));
        let boxes = vec![BoundingBox { x: 2, y: 2, width: 10, height: 10, area: 100.0 }];
        let jpeg = draw_overlay_and_encode(img, &boxes, "idle", &OverlayFont::none());
        assert!(!jpeg.is_empty());
    }
}
