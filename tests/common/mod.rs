#![allow(dead_code)]

use fetal_scan::analysis::{BoundingBox, Detection};
use fetal_scan::config::PlaneClassMap;
use fetal_scan::models::{ClassifierModel, DetectionModel, ExplainableModel, LayerCapture, ModelPair};
use fetal_scan::{InferenceContext, Result, ScanError};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use ndarray::{array, Array1, Array3, Array4};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const AXIAL: u32 = 2;
pub const SAGITTAL: u32 = 1;

pub struct StubDetector {
    pub detections: Vec<Detection>,
    pub calls: AtomicUsize,
}

impl StubDetector {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            calls: AtomicUsize::new(0),
        }
    }
}

impl DetectionModel for StubDetector {
    fn name(&self) -> &str {
        "stub-detector"
    }

    fn predict(&self, _image: &DynamicImage, confidence_threshold: f32) -> Result<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .detections
            .iter()
            .filter(|d| d.confidence > confidence_threshold)
            .cloned()
            .collect())
    }
}

/// Two-class model with a fixed positive logit and a single hot activation
pub struct StubClassifier {
    pub name: String,
    pub logit: f32,
    /// Hot activation cell on an 8x8 grid, in tensor (x, y) order
    pub hot_cell: (usize, usize),
    pub fail: bool,
    pub forward_calls: AtomicUsize,
    pub capture_calls: AtomicUsize,
}

impl StubClassifier {
    pub fn new(name: &str, logit: f32) -> Self {
        Self {
            name: name.to_string(),
            logit,
            hot_cell: (0, 0),
            fail: false,
            forward_calls: AtomicUsize::new(0),
            capture_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_hot_cell(mut self, x: usize, y: usize) -> Self {
        self.hot_cell = (x, y);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.forward_calls.load(Ordering::SeqCst) + self.capture_calls.load(Ordering::SeqCst)
    }

    fn check_input(&self, input: &Array4<f32>) -> Result<()> {
        if self.fail {
            return Err(ScanError::Inference(format!("{} backend failure", self.name)));
        }
        assert_eq!(input.dim(), (1, 3, 255, 255), "unexpected input for {}", self.name);
        Ok(())
    }
}

impl ClassifierModel for StubClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, input: &Array4<f32>) -> Result<Array1<f32>> {
        self.forward_calls.fetch_add(1, Ordering::SeqCst);
        self.check_input(input)?;
        Ok(array![0.0, self.logit])
    }
}

impl ExplainableModel for StubClassifier {
    fn target_layer(&self) -> &str {
        "class_layers.relu"
    }

    fn capture(&self, input: &Array4<f32>) -> Result<LayerCapture> {
        self.capture_calls.fetch_add(1, Ordering::SeqCst);
        self.check_input(input)?;

        let mut activations = Array3::<f32>::from_elem((2, 8, 8), 0.1);
        activations[[0, self.hot_cell.0, self.hot_cell.1]] = 5.0;

        Ok(LayerCapture {
            logits: array![0.0, self.logit],
            activations,
            gradients: Array4::from_elem((1, 2, 8, 8), 0.5),
        })
    }
}

/// Handles on every stub so tests can count which models ran
pub struct Stubs {
    pub detector: Arc<StubDetector>,
    pub axial_quality: Arc<StubClassifier>,
    pub axial_pathology: Arc<StubClassifier>,
    pub sagittal_quality: Arc<StubClassifier>,
    pub sagittal_pathology: Arc<StubClassifier>,
}

impl Stubs {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            detector: Arc::new(StubDetector::new(detections)),
            axial_quality: Arc::new(StubClassifier::new("axial-quality", 0.0)),
            axial_pathology: Arc::new(StubClassifier::new("axial-pathology", 2.0).with_hot_cell(7, 7)),
            sagittal_quality: Arc::new(StubClassifier::new("sagittal-quality", -1.0)),
            sagittal_pathology: Arc::new(StubClassifier::new("sagittal-pathology", 1.0)),
        }
    }

    pub fn context(&self) -> Arc<InferenceContext> {
        Arc::new(InferenceContext::new(
            self.detector.clone(),
            PlaneClassMap::default(),
            ModelPair::new(self.axial_quality.clone(), self.axial_pathology.clone()),
            ModelPair::new(self.sagittal_quality.clone(), self.sagittal_pathology.clone()),
        ))
    }

    pub fn axial_calls(&self) -> usize {
        self.axial_quality.calls() + self.axial_pathology.calls()
    }

    pub fn sagittal_calls(&self) -> usize {
        self.sagittal_quality.calls() + self.sagittal_pathology.calls()
    }

    pub fn classifier_calls(&self) -> usize {
        self.axial_calls() + self.sagittal_calls()
    }
}

pub fn detection(confidence: f32, class_id: u32, bbox: BoundingBox) -> Detection {
    Detection {
        bbox,
        confidence,
        class_id,
    }
}

/// 64x48 RGB gradient
pub fn scan_image() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(64, 48, |x, y| {
        let v = ((x * 3 + y * 2) % 256) as u8;
        Rgb([v, v, v])
    }))
}

pub fn png_bytes(image: &DynamicImage) -> Vec<u8> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("png encoding");
    buf
}
