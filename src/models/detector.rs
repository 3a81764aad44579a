use crate::analysis::{Detection, DetectionResult, RegionOfInterest};
use crate::config::{Config, PlaneClassMap};
use crate::image::letterbox;
use crate::models::session::SharedSession;
use crate::models::DetectionModel;
use crate::utils::error::ScanError;
use crate::Result;
use image::DynamicImage;
use ndarray::{ArrayD, ArrayView2, Axis, Ix2};
use std::path::Path;
use std::sync::Arc;

/// YOLO-style ONNX detector: letterboxed square input, output laid out as
/// `[1, 4 + num_classes, num_anchors]` with centre/size boxes.
pub struct OnnxDetector {
    session: SharedSession,
    output_name: String,
    input_size: u32,
}

impl OnnxDetector {
    pub fn new(config: &Config) -> Result<Self> {
        Self::from_path(&config.detector_model_path(), config)
    }

    pub fn from_path(model_path: &Path, config: &Config) -> Result<Self> {
        let session = SharedSession::load(model_path, &config.onnx_config, "Detection")?;
        let output_name = session.output_names()[0].clone();
        tracing::info!("Detection model output: '{}'", output_name);

        Ok(Self {
            session,
            output_name,
            input_size: config.pipeline_config.detector_input_size,
        })
    }
}

impl DetectionModel for OnnxDetector {
    fn name(&self) -> &str {
        "onnx-detector"
    }

    fn predict(&self, image: &DynamicImage, confidence_threshold: f32) -> Result<Vec<Detection>> {
        let (input, transform) = letterbox(image, self.input_size)?;

        let prediction = self
            .session
            .run(input, &[self.output_name.as_str()])?
            .remove(0);

        let candidates = decode_predictions(&prediction, confidence_threshold)?;

        Ok(candidates
            .into_iter()
            .map(|(cx, cy, w, h, confidence, class_id)| Detection {
                bbox: transform.box_to_source(cx, cy, w, h),
                confidence,
                class_id,
            })
            .collect())
    }
}

/// Decode raw detector output into `(cx, cy, w, h, confidence, class_id)`
/// tuples above the threshold. Accepts both `[1, 4 + nc, n]` and the
/// transposed `[1, n, 4 + nc]` layout.
fn decode_predictions(
    prediction: &ArrayD<f32>,
    confidence_threshold: f32,
) -> Result<Vec<(f32, f32, f32, f32, f32, u32)>> {
    let shape = prediction.shape();
    if shape.len() != 3 || shape[0] != 1 {
        return Err(ScanError::Inference(format!(
            "Unsupported detection output shape: {:?}. Expected (1, 4 + classes, anchors)",
            shape
        )));
    }

    let rows = prediction
        .index_axis(Axis(0), 0)
        .into_dimensionality::<Ix2>()
        .map_err(|e| ScanError::Inference(format!("Detection output reshape failed: {}", e)))?;

    // Anchors outnumber attributes in every YOLO export
    let attrs_first: ArrayView2<f32> = if rows.nrows() <= rows.ncols() { rows } else { rows.reversed_axes() };

    let num_attrs = attrs_first.nrows();
    if num_attrs < 5 {
        return Err(ScanError::Inference(format!(
            "Detection output has {} attributes, expected at least 5",
            num_attrs
        )));
    }

    let mut candidates = Vec::new();
    for anchor in attrs_first.columns() {
        let mut best_class = 0u32;
        let mut best_score = f32::NEG_INFINITY;
        for (class_idx, &score) in anchor.iter().skip(4).enumerate() {
            if score > best_score {
                best_score = score;
                best_class = class_idx as u32;
            }
        }

        if best_score > confidence_threshold {
            candidates.push((anchor[0], anchor[1], anchor[2], anchor[3], best_score, best_class));
        }
    }

    tracing::debug!(
        "Detection output {:?}: {} candidates above {}",
        shape,
        candidates.len(),
        confidence_threshold
    );
    Ok(candidates)
}

/// Highest-confidence candidate strictly above the threshold; ties keep the
/// first one encountered.
pub fn select_best(candidates: &[Detection], confidence_threshold: f32) -> Option<&Detection> {
    let mut best: Option<&Detection> = None;
    for candidate in candidates {
        if !candidate.confidence.is_finite() || candidate.confidence <= confidence_threshold {
            continue;
        }
        match best {
            Some(current) if candidate.confidence <= current.confidence => {}
            _ => best = Some(candidate),
        }
    }
    best
}

/// Finds the single region of interest and resolves its plane
#[derive(Clone)]
pub struct RegionDetector {
    model: Arc<dyn DetectionModel>,
    plane_classes: PlaneClassMap,
}

impl RegionDetector {
    pub fn new(model: Arc<dyn DetectionModel>, plane_classes: PlaneClassMap) -> Self {
        Self { model, plane_classes }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn detect(&self, image: &DynamicImage, confidence_threshold: f32) -> Result<DetectionResult> {
        let candidates = self.model.predict(image, confidence_threshold)?;

        let Some(best) = select_best(&candidates, confidence_threshold) else {
            tracing::debug!("No region above confidence {}", confidence_threshold);
            return Ok(DetectionResult::Empty);
        };

        let plane = self.plane_classes.plane_for(best.class_id)?;

        tracing::debug!(
            "Selected region {:?} (confidence {:.3}, plane {}) from {} candidates",
            best.bbox,
            best.confidence,
            plane,
            candidates.len()
        );

        Ok(DetectionResult::Found(RegionOfInterest {
            bbox: best.bbox,
            confidence: best.confidence,
            plane,
        }))
    }
}
