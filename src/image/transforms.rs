use crate::analysis::BoundingBox;
use crate::utils::error::ScanError;
use crate::Result;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, RgbImage};
use ndarray::{Array2, Array3};

/// Image and array transforms shared by the normalizer and the explainer
pub struct ImageTransforms;

impl ImageTransforms {
    /// Crop the region of interest out of the raw image.
    ///
    /// Box corners are rounded to whole pixels and clamped to the image.
    pub fn crop_region(image: &DynamicImage, bbox: &BoundingBox) -> Result<DynamicImage> {
        let (width, height) = image.dimensions();

        let clamp = |v: f32, max: u32| -> u32 {
            if v.is_nan() {
                0
            } else {
                v.round().clamp(0.0, max as f32) as u32
            }
        };

        let x1 = clamp(bbox.x1.min(bbox.x2), width);
        let x2 = clamp(bbox.x1.max(bbox.x2), width);
        let y1 = clamp(bbox.y1.min(bbox.y2), height);
        let y2 = clamp(bbox.y1.max(bbox.y2), height);

        if x2 <= x1 || y2 <= y1 {
            return Err(ScanError::InvalidInput(format!(
                "Empty crop region ({:.1}, {:.1}, {:.1}, {:.1}) in {}x{} image",
                bbox.x1, bbox.y1, bbox.x2, bbox.y2, width, height
            )));
        }

        Ok(image.crop_imm(x1, y1, x2 - x1, y2 - y1))
    }

    /// Area interpolation over the two spatial axes of a (C, A, B) array.
    ///
    /// Each output cell is the mean of the input cells it covers, with
    /// boundaries at `floor(i * in / out)` and `ceil((i + 1) * in / out)`.
    pub fn area_resize(array: &Array3<f32>, out_a: usize, out_b: usize) -> Result<Array3<f32>> {
        let (channels, in_a, in_b) = array.dim();
        if in_a == 0 || in_b == 0 || out_a == 0 || out_b == 0 {
            return Err(ScanError::InvalidInput(format!(
                "Cannot resize {}x{} array to {}x{}",
                in_a, in_b, out_a, out_b
            )));
        }

        let spans_a = Self::pool_spans(in_a, out_a);
        let spans_b = Self::pool_spans(in_b, out_b);
        let mut resized = Array3::<f32>::zeros((channels, out_a, out_b));

        for c in 0..channels {
            for (i, &(a0, a1)) in spans_a.iter().enumerate() {
                for (j, &(b0, b1)) in spans_b.iter().enumerate() {
                    let mut sum = 0.0f64;
                    for a in a0..a1 {
                        for b in b0..b1 {
                            sum += array[[c, a, b]] as f64;
                        }
                    }
                    let count = ((a1 - a0) * (b1 - b0)) as f64;
                    resized[[c, i, j]] = (sum / count) as f32;
                }
            }
        }

        Ok(resized)
    }

    fn pool_spans(input: usize, output: usize) -> Vec<(usize, usize)> {
        (0..output)
            .map(|i| {
                let start = (i * input) / output;
                let end = ((i + 1) * input + output - 1) / output;
                (start, end.max(start + 1).min(input))
            })
            .collect()
    }

    /// Bilinear resize of a 2D map using half-pixel centres
    pub fn bilinear_resize(map: &Array2<f32>, out_rows: usize, out_cols: usize) -> Array2<f32> {
        let (rows, cols) = map.dim();
        if rows == 0 || cols == 0 {
            return Array2::zeros((out_rows, out_cols));
        }

        let scale_r = rows as f32 / out_rows as f32;
        let scale_c = cols as f32 / out_cols as f32;

        Array2::from_shape_fn((out_rows, out_cols), |(r, c)| {
            let src_r = ((r as f32 + 0.5) * scale_r - 0.5).max(0.0);
            let src_c = ((c as f32 + 0.5) * scale_c - 0.5).max(0.0);

            let r0 = (src_r.floor() as usize).min(rows - 1);
            let c0 = (src_c.floor() as usize).min(cols - 1);
            let r1 = (r0 + 1).min(rows - 1);
            let c1 = (c0 + 1).min(cols - 1);
            let fr = src_r - r0 as f32;
            let fc = src_c - c0 as f32;

            let top = map[[r0, c0]] * (1.0 - fc) + map[[r0, c1]] * fc;
            let bottom = map[[r1, c0]] * (1.0 - fc) + map[[r1, c1]] * fc;
            top * (1.0 - fr) + bottom * fr
        })
    }

    /// Undo the normalizer's width/height transpose on a rendered image:
    /// mirror left-right, then rotate 90 degrees counter-clockwise.
    pub fn undo_transpose(image: &RgbImage) -> RgbImage {
        let mirrored = imageops::flip_horizontal(image);
        imageops::rotate270(&mirrored)
    }

    /// Bicubic resize to an exact size
    pub fn resize_to(image: &RgbImage, width: u32, height: u32) -> RgbImage {
        if image.dimensions() == (width, height) {
            return image.clone();
        }
        imageops::resize(image, width, height, FilterType::CatmullRom)
    }
}
