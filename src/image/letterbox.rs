use crate::analysis::BoundingBox;
use crate::Result;
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};
use ndarray::Array4;

/// Gray used by YOLO exports for letterbox padding
const PAD_VALUE: u8 = 114;

/// Maps boxes predicted on the letterboxed square back to the source image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub source_width: u32,
    pub source_height: u32,
}

impl Letterbox {
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        let sx = ((x - self.pad_x) / self.scale).clamp(0.0, self.source_width as f32);
        let sy = ((y - self.pad_y) / self.scale).clamp(0.0, self.source_height as f32);
        (sx, sy)
    }

    /// Convert a centre/size box in model space to corners in source space
    pub fn box_to_source(&self, cx: f32, cy: f32, w: f32, h: f32) -> BoundingBox {
        let (x1, y1) = self.to_source(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = self.to_source(cx + w / 2.0, cy + h / 2.0);
        BoundingBox::new(x1, y1, x2, y2)
    }
}

/// Resize with preserved aspect ratio onto a padded square and lay it out as
/// a normalized NCHW batch of one.
pub fn letterbox(image: &DynamicImage, target_size: u32) -> Result<(Array4<f32>, Letterbox)> {
    let rgb = image.to_rgb8();
    let (orig_width, orig_height) = rgb.dimensions();

    let scale = target_size as f32 / orig_width.max(orig_height) as f32;
    let new_width = ((orig_width as f32 * scale).round() as u32).clamp(1, target_size);
    let new_height = ((orig_height as f32 * scale).round() as u32).clamp(1, target_size);

    let resized = image::imageops::resize(&rgb, new_width, new_height, FilterType::Triangle);

    let mut canvas = RgbImage::from_pixel(target_size, target_size, Rgb([PAD_VALUE; 3]));
    let x_offset = (target_size - new_width) / 2;
    let y_offset = (target_size - new_height) / 2;
    image::imageops::replace(&mut canvas, &resized, x_offset as i64, y_offset as i64);

    let size = target_size as usize;
    let input = Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
        canvas.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
    });

    let transform = Letterbox {
        scale,
        pad_x: x_offset as f32,
        pad_y: y_offset as f32,
        source_width: orig_width,
        source_height: orig_height,
    };

    Ok((input, transform))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_image_is_padded_vertically() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 100, Rgb([255, 255, 255])));
        let (input, transform) = letterbox(&image, 64).unwrap();

        assert_eq!(input.dim(), (1, 3, 64, 64));
        assert_eq!(transform.pad_x, 0.0);
        assert_eq!(transform.pad_y, 16.0);
        // padding row vs. content row
        assert!((input[[0, 0, 0, 10]] - 114.0 / 255.0).abs() < 1e-6);
        assert!((input[[0, 0, 32, 10]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn boxes_map_back_to_source_pixels() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(200, 100));
        let (_, transform) = letterbox(&image, 64).unwrap();

        // model-space box centred in the content area
        let bbox = transform.box_to_source(32.0, 32.0, 32.0, 16.0);
        assert!((bbox.x1 - 50.0).abs() < 1e-3);
        assert!((bbox.x2 - 150.0).abs() < 1e-3);
        assert!((bbox.y1 - 25.0).abs() < 1e-3);
        assert!((bbox.y2 - 75.0).abs() < 1e-3);
    }
}
