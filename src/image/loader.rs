use crate::utils::error::ScanError;
use crate::Result;
use base64::Engine;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;

/// Upload size limit for a single image (50MB)
pub const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024;

pub struct ImageLoader;

impl ImageLoader {
    /// Decode an image from a base64 string, with or without a data URL prefix
    pub fn from_base64(base64_data: &str) -> Result<DynamicImage> {
        let image_bytes = Self::decode_base64(base64_data)?;
        Self::from_bytes(&image_bytes)
    }

    /// Raw bytes of a base64 payload
    pub fn decode_base64(base64_data: &str) -> Result<Vec<u8>> {
        // data:image/png;base64,...
        let base64_clean = if base64_data.starts_with("data:") {
            base64_data.split(',').nth(1).unwrap_or(base64_data)
        } else {
            base64_data
        };

        Ok(base64::engine::general_purpose::STANDARD.decode(base64_clean.trim())?)
    }

    /// Decode raw PNG/JPEG/... bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(ScanError::InvalidInput("Empty image data".to_string()));
        }

        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(ScanError::FileTooLarge(bytes.len(), MAX_IMAGE_BYTES));
        }

        if let Some(format) = Self::detect_format(bytes) {
            if !Self::is_supported_format(format) {
                return Err(ScanError::UnsupportedFormat(format!("{:?}", format)));
            }
        }

        image::load_from_memory(bytes)
            .map_err(|e| ScanError::InvalidInput(format!("Not a decodable image: {}", e)))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<DynamicImage> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }

    pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
        image::guess_format(bytes).ok()
    }

    pub fn is_supported_format(format: ImageFormat) -> bool {
        matches!(
            format,
            ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Bmp | ImageFormat::Tiff | ImageFormat::WebP
        )
    }

    /// PNG-encode an image and return it as standard base64
    pub fn encode_png_base64(image: &DynamicImage) -> Result<String> {
        let mut buffer = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(|e| ScanError::ImageProcessing(format!("PNG encoding failed: {}", e)))?;

        Ok(base64::engine::general_purpose::STANDARD.encode(buffer))
    }
}
