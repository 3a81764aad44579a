use crate::{
    analysis::{
        round_probability, AnalyzedImage, DetectionResult, PipelineStage, PlaneInfo, ProcessedImageRecord,
        SaliencyExplainer, ScanStatus, ScoreInfo,
    },
    config::PipelineConfig,
    image::{ImageLoader, ImageNormalizer, ImageTransforms},
    models::{classify, InferenceContext},
    Result,
};
use image::{DynamicImage, GenericImageView};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// Per-image analysis: detect, crop, normalize, route, classify, explain.
///
/// Holds no state across calls besides the shared read-only models, so one
/// pipeline can serve concurrent callers.
#[derive(Clone)]
pub struct ScanPipeline {
    context: Arc<InferenceContext>,
    normalizer: ImageNormalizer,
    explainer: SaliencyExplainer,
    config: PipelineConfig,
    status_tx: Option<mpsc::UnboundedSender<ScanStatus>>,
}

impl ScanPipeline {
    pub fn new(context: Arc<InferenceContext>, config: PipelineConfig) -> Self {
        Self {
            context,
            normalizer: ImageNormalizer::new(config.input_size),
            explainer: SaliencyExplainer::new(config.heatmap_alpha),
            config,
            status_tx: None,
        }
    }

    /// Report stage progress on `tx`
    pub fn with_status(mut self, tx: mpsc::UnboundedSender<ScanStatus>) -> Self {
        self.status_tx = Some(tx);
        self
    }

    pub fn context(&self) -> &InferenceContext {
        &self.context
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Decode raw image bytes and analyze them
    pub fn process(&self, bytes: &[u8], img_name: &str) -> Result<ProcessedImageRecord> {
        let image = ImageLoader::from_bytes(bytes).map_err(|e| e.for_image(img_name))?;
        self.process_image(&image, img_name)
    }

    /// Analyze each (bytes, name) input in order. Stops at the first error.
    pub fn process_batch<'a, I>(&self, inputs: I) -> Result<Vec<ProcessedImageRecord>>
    where
        I: IntoIterator<Item = (&'a [u8], &'a str)>,
    {
        inputs
            .into_iter()
            .map(|(bytes, name)| self.process(bytes, name))
            .collect()
    }

    pub fn process_image(&self, image: &DynamicImage, img_name: &str) -> Result<ProcessedImageRecord> {
        let start_time = Instant::now();
        let (width, height) = image.dimensions();
        self.report(PipelineStage::Received, 0.1, &format!("Received {} ({}x{})", img_name, width, height));

        // Detection
        let detection = self
            .context
            .detector()
            .detect(image, self.config.confidence_threshold)
            .map_err(|e| e.in_stage(PipelineStage::Detected, img_name))?;
        let detection_time = start_time.elapsed();

        let region = match detection {
            DetectionResult::Found(region) => region,
            DetectionResult::Empty => {
                self.report(PipelineStage::NoRegionFound, 1.0, "No objects detected");
                tracing::info!("No region detected in {}", img_name);
                return Ok(ProcessedImageRecord::no_region(img_name));
            }
        };

        self.report(
            PipelineStage::Detected,
            0.3,
            &format!("{} region at confidence {:.3}", region.plane, region.confidence),
        );

        let cropped = ImageTransforms::crop_region(image, &region.bbox).map_err(|e| e.for_image(img_name))?;
        let (crop_width, crop_height) = cropped.dimensions();
        let tensor = self.normalizer.normalize(&cropped).map_err(|e| e.for_image(img_name))?;

        // Routing
        let models = self.context.router().select_models(region.plane);
        self.report(
            PipelineStage::Routed,
            0.4,
            &format!("Using {} / {}", models.quality.name(), models.pathology.name()),
        );

        // Classification
        let classification_start = Instant::now();
        let quality = classify(&tensor, models.quality.as_ref())
            .map_err(|e| e.in_stage(PipelineStage::Classified, img_name))?;
        let pathology = classify(&tensor, models.pathology.as_ref())
            .map_err(|e| e.in_stage(PipelineStage::Classified, img_name))?;
        let classification_time = classification_start.elapsed();

        self.report(
            PipelineStage::Classified,
            0.6,
            &format!("quality={:.3}, pathology={:.3}", quality.probability, pathology.probability),
        );

        // Explanation, each heatmap from its own model
        let explanation_start = Instant::now();
        let quality_map = self
            .explainer
            .explain(&tensor, models.quality.as_ref())
            .map_err(|e| e.in_stage(PipelineStage::Explained, img_name))?
            .resized(crop_width, crop_height);
        let pathology_map = self
            .explainer
            .explain(&tensor, models.pathology.as_ref())
            .map_err(|e| e.in_stage(PipelineStage::Explained, img_name))?
            .resized(crop_width, crop_height);
        let explanation_time = explanation_start.elapsed();

        self.report(PipelineStage::Explained, 0.9, "Saliency maps ready");

        let record = ProcessedImageRecord::Analyzed(AnalyzedImage {
            img_name: img_name.to_string(),
            cropped_img: cropped,
            plane: PlaneInfo {
                prediction_prob: region.confidence,
                plane_type: region.plane,
                bbox: region.bbox,
            },
            quality: ScoreInfo {
                prediction_prob: round_probability(quality.probability),
                heatmap: quality_map.image,
            },
            pathology: ScoreInfo {
                prediction_prob: round_probability(pathology.probability),
                heatmap: pathology_map.image,
            },
        });

        self.report(PipelineStage::Completed, 1.0, &format!("Analysis of {} completed", img_name));

        tracing::info!(
            "Analysis completed: image={}, plane={}, detection={:.3}s, classification={:.3}s, explanation={:.3}s, total={:.3}s",
            img_name,
            region.plane,
            detection_time.as_secs_f32(),
            classification_time.as_secs_f32(),
            explanation_time.as_secs_f32(),
            start_time.elapsed().as_secs_f32()
        );

        Ok(record)
    }

    fn report(&self, stage: PipelineStage, progress: f32, message: &str) {
        if let Some(ref tx) = self.status_tx {
            let _ = tx.send(ScanStatus::new(stage, progress, message));
        }
    }
}
