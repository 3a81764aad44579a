use crate::image::ImageLoader;
use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Error text returned when the detector finds no region of interest.
pub const NO_REGION_ERROR: &str = "No objects detected in the image.";

/// Stages an image moves through inside the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineStage {
    Received,
    Detected,
    Routed,
    Classified,
    Explained,
    Completed,
    NoRegionFound,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Received => "decoding",
            PipelineStage::Detected => "region detection",
            PipelineStage::Routed => "plane routing",
            PipelineStage::Classified => "classification",
            PipelineStage::Explained => "saliency explanation",
            PipelineStage::Completed => "record assembly",
            PipelineStage::NoRegionFound => "no-region fallback",
        };
        f.write_str(name)
    }
}

/// Anatomical imaging plane of the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaneLabel {
    Sagittal,
    Axial,
}

impl PlaneLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaneLabel::Sagittal => "Sagittal",
            PlaneLabel::Axial => "Axial",
        }
    }
}

impl fmt::Display for PlaneLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Box corners in the raw image's pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

/// A single detector candidate before plane mapping
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: u32,
}

/// The highest-confidence region, with its plane resolved
#[derive(Debug, Clone, PartialEq)]
pub struct RegionOfInterest {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub plane: PlaneLabel,
}

/// Outcome of region detection. Detection failure is total: there is no box
/// without a plane and confidence, and vice versa.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionResult {
    Found(RegionOfInterest),
    Empty,
}

impl DetectionResult {
    pub fn region(&self) -> Option<&RegionOfInterest> {
        match self {
            DetectionResult::Found(region) => Some(region),
            DetectionResult::Empty => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, DetectionResult::Empty)
    }
}

/// Probability that the positive class (poor quality / pathology) holds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationResult {
    pub probability: f32,
}

/// Per-pixel importance for one classifier decision, blended over the input
/// and resized to the crop
#[derive(Debug, Clone)]
pub struct SaliencyMap {
    pub image: RgbImage,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaneInfo {
    pub prediction_prob: f32,
    #[serde(rename = "type")]
    pub plane_type: PlaneLabel,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreInfo {
    /// Rounded to two decimals
    pub prediction_prob: f32,
    #[serde(serialize_with = "serialize_rgb_png")]
    pub heatmap: RgbImage,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzedImage {
    pub img_name: String,
    #[serde(serialize_with = "serialize_dynamic_png")]
    pub cropped_img: DynamicImage,
    pub plane: PlaneInfo,
    pub quality: ScoreInfo,
    pub pathology: ScoreInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoRegionRecord {
    pub img_name: String,
    pub error: String,
}

/// The pipeline's only output for one input image
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ProcessedImageRecord {
    Analyzed(AnalyzedImage),
    NoRegion(NoRegionRecord),
}

impl ProcessedImageRecord {
    pub fn no_region(img_name: &str) -> Self {
        ProcessedImageRecord::NoRegion(NoRegionRecord {
            img_name: img_name.to_string(),
            error: NO_REGION_ERROR.to_string(),
        })
    }

    pub fn img_name(&self) -> &str {
        match self {
            ProcessedImageRecord::Analyzed(analyzed) => &analyzed.img_name,
            ProcessedImageRecord::NoRegion(record) => &record.img_name,
        }
    }

    pub fn analyzed(&self) -> Option<&AnalyzedImage> {
        match self {
            ProcessedImageRecord::Analyzed(analyzed) => Some(analyzed),
            ProcessedImageRecord::NoRegion(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ProcessedImageRecord::Analyzed(_) => None,
            ProcessedImageRecord::NoRegion(record) => Some(&record.error),
        }
    }
}

/// Round a probability to two decimal digits for the record.
pub fn round_probability(probability: f32) -> f32 {
    (probability * 100.0).round() / 100.0
}

/// Progress report for a single image
#[derive(Debug, Clone)]
pub struct ScanStatus {
    pub stage: PipelineStage,
    /// 0.0 - 1.0
    pub progress: f32,
    pub message: String,
}

impl ScanStatus {
    pub fn new(stage: PipelineStage, progress: f32, message: &str) -> Self {
        Self {
            stage,
            progress,
            message: message.to_string(),
        }
    }
}

fn serialize_rgb_png<S>(image: &RgbImage, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serialize_dynamic_png(&DynamicImage::ImageRgb8(image.clone()), serializer)
}

fn serialize_dynamic_png<S>(image: &DynamicImage, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let encoded = ImageLoader::encode_png_base64(image).map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&encoded)
}
