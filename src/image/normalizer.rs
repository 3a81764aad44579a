use crate::image::ImageTransforms;
use crate::utils::error::ScanError;
use crate::Result;
use image::{DynamicImage, GenericImageView};
use ndarray::{Array3, Array4, ArrayView3, Axis};

/// Fixed-shape (channels, size, size) tensor, min-max scaled to [0, 1].
///
/// The two spatial axes keep the normalizer's (width, height) orientation, so
/// `data[[c, x, y]]` is the pixel at column `x`, row `y` of the resized crop.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTensor {
    data: Array3<f32>,
}

impl NormalizedTensor {
    pub fn from_array(data: Array3<f32>) -> Self {
        Self { data }
    }

    pub fn channels(&self) -> usize {
        self.data.dim().0
    }

    /// (channels, width, height)
    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.data.view()
    }

    /// Add the batch axis, repeating a single grayscale channel when the
    /// model expects more.
    pub fn to_batch(&self, channels: usize) -> Result<Array4<f32>> {
        let current = self.channels();
        let data = if current == channels {
            self.data.clone()
        } else if current == 1 {
            let (_, w, h) = self.data.dim();
            let plane = self.data.index_axis(Axis(0), 0);
            let mut repeated = Array3::<f32>::zeros((channels, w, h));
            for mut channel in repeated.outer_iter_mut() {
                channel.assign(&plane);
            }
            repeated
        } else {
            return Err(ScanError::InvalidInput(format!(
                "Tensor has {} channels, model expects {}",
                current, channels
            )));
        };

        Ok(data.insert_axis(Axis(0)))
    }
}

/// Turns a cropped region into the classifier input tensor
#[derive(Debug, Clone)]
pub struct ImageNormalizer {
    size: usize,
}

impl ImageNormalizer {
    pub fn new(size: usize) -> Self {
        Self { size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Decode and normalize in one step; undecodable bytes are invalid input.
    pub fn normalize_bytes(&self, bytes: &[u8]) -> Result<NormalizedTensor> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| ScanError::InvalidInput(format!("Not a decodable image: {}", e)))?;
        self.normalize(&image)
    }

    pub fn normalize(&self, image: &DynamicImage) -> Result<NormalizedTensor> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(ScanError::InvalidInput(format!(
                "Cannot normalize an empty {}x{} image",
                width, height
            )));
        }

        let array = Self::to_channel_first(image);
        let scaled = Self::scale_intensity(array);
        let resized = ImageTransforms::area_resize(&scaled, self.size, self.size)?;

        Ok(NormalizedTensor { data: resized })
    }

    /// Pixel values as a (C, W, H) array; grayscale keeps a single channel
    /// and alpha is dropped.
    fn to_channel_first(image: &DynamicImage) -> Array3<f32> {
        let (width, height) = image.dimensions();
        let (w, h) = (width as usize, height as usize);

        match image {
            DynamicImage::ImageLuma8(_) | DynamicImage::ImageLumaA8(_) => {
                let gray = image.to_luma8();
                Array3::from_shape_fn((1, w, h), |(_, x, y)| gray.get_pixel(x as u32, y as u32)[0] as f32)
            }
            DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA16(_) => {
                let gray = image.to_luma16();
                Array3::from_shape_fn((1, w, h), |(_, x, y)| gray.get_pixel(x as u32, y as u32)[0] as f32)
            }
            DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => {
                let rgb = image.to_rgb32f();
                Array3::from_shape_fn((3, w, h), |(c, x, y)| rgb.get_pixel(x as u32, y as u32)[c])
            }
            _ => {
                let rgb = image.to_rgb8();
                Array3::from_shape_fn((3, w, h), |(c, x, y)| rgb.get_pixel(x as u32, y as u32)[c] as f32)
            }
        }
    }

    /// Global min-max scaling to [0, 1]; a constant array becomes zeros.
    fn scale_intensity(mut array: Array3<f32>) -> Array3<f32> {
        let min = array.iter().copied().fold(f32::INFINITY, f32::min);
        let max = array.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let range = max - min;

        if !range.is_finite() || range <= 0.0 {
            array.fill(0.0);
        } else {
            array.mapv_inplace(|v| (v - min) / range);
        }
        array
    }
}
