use crate::analysis::Detection;
use crate::Result;
use image::DynamicImage;
use ndarray::{Array1, Array3, Array4};

/// A trained object detector over the full, uncropped image
pub trait DetectionModel: Send + Sync {
    fn name(&self) -> &str;

    /// Candidate boxes in source pixel coordinates whose confidence exceeds
    /// `confidence_threshold`, in model output order.
    fn predict(&self, image: &DynamicImage, confidence_threshold: f32) -> Result<Vec<Detection>>;
}

/// A two-class image classifier
pub trait ClassifierModel: Send + Sync {
    fn name(&self) -> &str;

    /// Channel count of the expected input batch
    fn input_channels(&self) -> usize {
        3
    }

    /// Logits for a (1, C, H, W) batch
    fn forward(&self, input: &Array4<f32>) -> Result<Array1<f32>>;
}

/// Activations of the explainable layer with their gradients, captured in
/// one forward pass
#[derive(Debug, Clone)]
pub struct LayerCapture {
    pub logits: Array1<f32>,
    /// (channels, h, w)
    pub activations: Array3<f32>,
    /// (classes, channels, h, w): gradient of each class score with respect
    /// to the activations. A single-class capture holds the gradient of the
    /// predicted class.
    pub gradients: Array4<f32>,
}

/// A classifier that exposes an explainable target layer
pub trait ExplainableModel: ClassifierModel {
    fn target_layer(&self) -> &str;

    fn capture(&self, input: &Array4<f32>) -> Result<LayerCapture>;
}
