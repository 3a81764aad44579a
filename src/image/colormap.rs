//! Diverging colormap and compositing used for saliency overlays

use crate::utils::error::ScanError;
use crate::Result;
use image::{Rgb, RgbImage};
use ndarray::Array2;

/// ColorBrewer RdBu anchors, from dark red (0.0) to dark blue (1.0)
const RDBU_ANCHORS: [[u8; 3]; 11] = [
    [103, 0, 31],
    [178, 24, 43],
    [214, 96, 77],
    [244, 165, 130],
    [253, 219, 199],
    [247, 247, 247],
    [209, 229, 240],
    [146, 197, 222],
    [67, 147, 195],
    [33, 102, 172],
    [5, 48, 97],
];

/// Sample the RdBu scale at `value` in [0, 1] with linear interpolation
pub fn rdbu(value: f32) -> Rgb<u8> {
    let v = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
    let position = v * (RDBU_ANCHORS.len() - 1) as f32;
    let lower = (position.floor() as usize).min(RDBU_ANCHORS.len() - 1);
    let upper = (lower + 1).min(RDBU_ANCHORS.len() - 1);
    let t = position - lower as f32;

    let mut rgb = [0u8; 3];
    for (c, channel) in rgb.iter_mut().enumerate() {
        let a = RDBU_ANCHORS[lower][c] as f32;
        let b = RDBU_ANCHORS[upper][c] as f32;
        *channel = (a + (b - a) * t).round() as u8;
    }
    Rgb(rgb)
}

/// Importance in [0, 1] to color: high is red, low is blue
pub fn importance_color(importance: f32) -> Rgb<u8> {
    rdbu(1.0 - importance)
}

/// Render a normalized importance map; `map[[row, col]]` lands on pixel (col, row)
pub fn colorize(map: &Array2<f32>) -> RgbImage {
    let (rows, cols) = map.dim();
    RgbImage::from_fn(cols as u32, rows as u32, |x, y| importance_color(map[[y as usize, x as usize]]))
}

/// Render a map as grayscale RGB, min-max stretched to 0..255
pub fn grayscale(map: &Array2<f32>) -> RgbImage {
    let min = map.iter().copied().fold(f32::INFINITY, f32::min);
    let max = map.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    let (rows, cols) = map.dim();
    RgbImage::from_fn(cols as u32, rows as u32, |x, y| {
        let value = map[[y as usize, x as usize]];
        let level = if range.is_finite() && range > 0.0 {
            ((value - min) / range * 255.0) as u8
        } else {
            0
        };
        Rgb([level; 3])
    })
}

/// Alpha blending: `base * (1 - alpha) + overlay * alpha`
pub fn blend(base: &RgbImage, overlay: &RgbImage, alpha: f32) -> Result<RgbImage> {
    if base.dimensions() != overlay.dimensions() {
        return Err(ScanError::ImageProcessing(format!(
            "Cannot blend {:?} with {:?}",
            base.dimensions(),
            overlay.dimensions()
        )));
    }

    let alpha = alpha.clamp(0.0, 1.0);
    let mut result = base.clone();

    for (out, (b, o)) in result.pixels_mut().zip(base.pixels().zip(overlay.pixels())) {
        for c in 0..3 {
            out[c] = ((1.0 - alpha) * b[c] as f32 + alpha * o[c] as f32) as u8;
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rdbu_endpoints() {
        assert_eq!(rdbu(0.0), Rgb([103, 0, 31]));
        assert_eq!(rdbu(0.5), Rgb([247, 247, 247]));
        assert_eq!(rdbu(1.0), Rgb([5, 48, 97]));
        assert_eq!(rdbu(2.0), rdbu(1.0));
        assert_eq!(rdbu(f32::NAN), rdbu(0.0));
    }

    #[test]
    fn high_importance_is_red() {
        let hot = importance_color(1.0);
        let cold = importance_color(0.0);
        assert!(hot[0] > hot[2]);
        assert!(cold[2] > cold[0]);
    }

    #[test]
    fn colorize_uses_row_column_layout() {
        let mut map = Array2::zeros((2, 3));
        map[[1, 2]] = 1.0;
        let image = colorize(&map);
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(*image.get_pixel(2, 1), importance_color(1.0));
        assert_eq!(*image.get_pixel(0, 0), importance_color(0.0));
    }

    #[test]
    fn grayscale_handles_constant_input() {
        let image = grayscale(&Array2::from_elem((4, 4), 0.7));
        assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn blend_half_and_half() {
        let base = RgbImage::from_pixel(2, 2, Rgb([0, 100, 200]));
        let overlay = RgbImage::from_pixel(2, 2, Rgb([200, 100, 0]));
        let blended = blend(&base, &overlay, 0.5).unwrap();
        assert_eq!(*blended.get_pixel(1, 1), Rgb([100, 100, 100]));

        assert!(blend(&base, &RgbImage::new(3, 3), 0.5).is_err());
    }
}
