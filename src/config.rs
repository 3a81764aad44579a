use crate::utils::error::ScanError;
use anyhow::Result;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub bind_addr: String,

    /// Directory holding the ONNX model files
    pub models_dir: PathBuf,

    /// Worker thread count
    pub workers: usize,

    /// Development mode
    pub dev_mode: bool,

    /// ONNX Runtime settings
    pub onnx_config: OnnxConfig,

    /// HTTP server settings
    pub server_config: ServerConfig,

    /// Inference pipeline settings
    pub pipeline_config: PipelineConfig,

    /// Result cache settings
    pub cache_config: CacheConfig,
}

#[derive(Debug, Clone)]
pub struct OnnxConfig {
    /// CPU threads per session
    pub intra_threads: usize,

    /// Graph optimization level
    pub optimization_level: i32,

    /// Enable graph optimization
    pub enable_optimization: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Request timeout (seconds)
    pub request_timeout: u64,

    /// Maximum request body size (bytes)
    pub max_request_size: usize,

    /// Maximum number of images in one batch request
    pub max_batch_files: usize,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Minimum detector confidence for a region to count
    pub confidence_threshold: f32,

    /// Side length of the classifier input tensor
    pub input_size: usize,

    /// Side length of the letterboxed detector input
    pub detector_input_size: u32,

    /// Channels the classifiers were trained on
    pub classifier_channels: usize,

    /// Opacity of the colorized saliency map over the grayscale input
    pub heatmap_alpha: f32,

    /// Layer whose activations drive the saliency maps
    pub target_layer: String,

    /// Detector class ids for each plane
    pub plane_classes: PlaneClassMap,
}

/// Detector class ids assigned to each imaging plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneClassMap {
    pub sagittal: u32,
    pub axial: u32,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Entry lifetime (seconds)
    pub ttl_secs: u64,

    /// Maximum cached records
    pub max_entries: usize,
}

impl Default for PlaneClassMap {
    fn default() -> Self {
        Self { sagittal: 1, axial: 2 }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.05,
            input_size: 255,
            detector_input_size: 640,
            classifier_channels: 3,
            heatmap_alpha: 0.5,
            target_layer: "class_layers.relu".to_string(),
            plane_classes: PlaneClassMap::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            max_entries: 10,
        }
    }
}

impl Config {
    pub fn new(
        bind_addr: String,
        models_dir: String,
        workers: Option<usize>,
        dev_mode: bool,
    ) -> Result<Self> {
        let cpu_cores = num_cpus::get();
        let workers = workers.unwrap_or(cpu_cores);

        let onnx_config = OnnxConfig {
            intra_threads: (cpu_cores * 3 / 4).max(1), // 75% of the cores
            optimization_level: 3,
            enable_optimization: true,
        };

        let server_config = ServerConfig {
            request_timeout: if dev_mode { 300 } else { 60 },
            max_request_size: 50 * 1024 * 1024, // 50MB
            max_batch_files: 2,
        };

        Ok(Self {
            bind_addr,
            models_dir: PathBuf::from(models_dir),
            workers,
            dev_mode,
            onnx_config,
            server_config,
            pipeline_config: PipelineConfig::default(),
            cache_config: CacheConfig::default(),
        })
    }

    /// Multi-threaded runtime with `workers` worker threads
    pub fn build_runtime(&self) -> Result<tokio::runtime::Runtime> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.workers.max(1))
            .enable_all()
            .build()?;
        Ok(runtime)
    }

    /// Detector weights
    pub fn detector_model_path(&self) -> PathBuf {
        self.models_dir.join("detector.onnx")
    }

    pub fn axial_quality_model_path(&self) -> PathBuf {
        self.models_dir.join("axial_quality.onnx")
    }

    pub fn axial_pathology_model_path(&self) -> PathBuf {
        self.models_dir.join("axial_pathology.onnx")
    }

    pub fn sagittal_quality_model_path(&self) -> PathBuf {
        self.models_dir.join("sagittal_quality.onnx")
    }

    pub fn sagittal_pathology_model_path(&self) -> PathBuf {
        self.models_dir.join("sagittal_pathology.onnx")
    }

    /// All five model files, labelled for diagnostics.
    pub fn model_paths(&self) -> [(&'static str, PathBuf); 5] {
        [
            ("detector", self.detector_model_path()),
            ("axial quality", self.axial_quality_model_path()),
            ("axial pathology", self.axial_pathology_model_path()),
            ("sagittal quality", self.sagittal_quality_model_path()),
            ("sagittal pathology", self.sagittal_pathology_model_path()),
        ]
    }

    /// Fails with `ModelLoad` listing every missing model file.
    pub fn validate_model_paths(&self) -> crate::Result<()> {
        let missing: Vec<String> = self
            .model_paths()
            .into_iter()
            .filter(|(_, path)| !path.exists())
            .map(|(label, path)| format!("{} ({})", label, path.display()))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ScanError::ModelLoad(format!(
                "Missing model files: {}",
                missing.join(", ")
            )))
        }
    }
}
