use crate::config::{Config, PlaneClassMap};
use crate::models::{
    DetectionModel, ModelPair, OnnxClassifier, OnnxDetector, PlaneRouter, RegionDetector,
};
use crate::Result;
use serde::Serialize;
use std::sync::Arc;

/// Models loaded once and shared read-only across every analysis
#[derive(Clone)]
pub struct InferenceContext {
    detector: RegionDetector,
    router: PlaneRouter,
}

impl InferenceContext {
    /// Assemble a context from already-constructed models
    pub fn new(
        detector: Arc<dyn DetectionModel>,
        plane_classes: PlaneClassMap,
        axial: ModelPair,
        sagittal: ModelPair,
    ) -> Self {
        Self {
            detector: RegionDetector::new(detector, plane_classes),
            router: PlaneRouter::new(axial, sagittal),
        }
    }

    /// Load the detector and the four classifiers from `config.models_dir`
    pub fn load(config: &Config) -> Result<Self> {
        tracing::info!("Loading inference models from {}", config.models_dir.display());
        config.validate_model_paths()?;

        let detector: Arc<dyn DetectionModel> = Arc::new(OnnxDetector::new(config)?);

        let axial = ModelPair::new(
            Arc::new(OnnxClassifier::new(&config.axial_quality_model_path(), "Axial quality", config)?),
            Arc::new(OnnxClassifier::new(&config.axial_pathology_model_path(), "Axial pathology", config)?),
        );
        let sagittal = ModelPair::new(
            Arc::new(OnnxClassifier::new(&config.sagittal_quality_model_path(), "Sagittal quality", config)?),
            Arc::new(OnnxClassifier::new(
                &config.sagittal_pathology_model_path(),
                "Sagittal pathology",
                config,
            )?),
        );

        tracing::info!("Inference models loaded successfully");
        Ok(Self::new(detector, config.pipeline_config.plane_classes, axial, sagittal))
    }

    pub fn detector(&self) -> &RegionDetector {
        &self.detector
    }

    pub fn router(&self) -> &PlaneRouter {
        &self.router
    }

    pub fn stats(&self, config: &Config) -> ModelStats {
        ModelStats {
            detector: self.detector.model_name().to_string(),
            classifiers: 4,
            target_layer: config.pipeline_config.target_layer.clone(),
            confidence_threshold: config.pipeline_config.confidence_threshold,
            intra_threads: config.onnx_config.intra_threads,
            optimization_level: config.onnx_config.optimization_level,
        }
    }
}

/// Summary reported by the info endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ModelStats {
    pub detector: String,
    pub classifiers: usize,
    pub target_layer: String,
    pub confidence_threshold: f32,
    pub intra_threads: usize,
    pub optimization_level: i32,
}
