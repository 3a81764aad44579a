use crate::config::OnnxConfig;
use crate::utils::error::ScanError;
use crate::Result;
use ndarray::{Array4, ArrayD};
use ort::{
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

/// An ONNX session shared between threads; runs are serialized per model
pub struct SharedSession {
    session: Arc<Mutex<Session>>,
    input_name: String,
    output_names: Vec<String>,
}

impl SharedSession {
    pub fn load(model_path: &Path, onnx_config: &OnnxConfig, kind: &str) -> Result<Self> {
        if !model_path.exists() {
            return Err(ScanError::ModelLoad(format!(
                "{} model not found: {}",
                kind,
                model_path.display()
            )));
        }

        tracing::info!("Loading {} model from: {}", kind, model_path.display());

        let session = Session::builder()?
            .with_optimization_level(optimization_level(onnx_config))?
            .with_intra_threads(onnx_config.intra_threads)?
            .commit_from_file(model_path)?;

        let input_name = match session.inputs.first() {
            Some(input) => input.name.clone(),
            None => {
                return Err(ScanError::ModelLoad(format!("{} model has no inputs", kind)));
            }
        };

        if session.outputs.is_empty() {
            return Err(ScanError::ModelLoad(format!("{} model has no outputs", kind)));
        }

        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
        for (i, name) in output_names.iter().enumerate() {
            tracing::debug!("{} output[{}]: '{}'", kind, i, name);
        }

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
            output_names,
        })
    }

    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }

    pub fn has_output(&self, name: &str) -> bool {
        self.output_names.iter().any(|n| n == name)
    }

    /// Run one batch and copy the requested outputs out while the lock is held
    pub fn run(&self, input: Array4<f32>, outputs: &[&str]) -> Result<Vec<ArrayD<f32>>> {
        let input_tensor = Tensor::from_array(input)?;

        let mut session = self.session.lock();
        let results = session.run(inputs![self.input_name.as_str() => input_tensor])?;

        outputs
            .iter()
            .map(|name| match results.get(*name) {
                Some(output) => Ok(output.try_extract_array::<f32>()?.into_owned()),
                None => {
                    let available: Vec<String> = results.keys().map(|s| s.to_string()).collect();
                    Err(ScanError::Inference(format!(
                        "Output '{}' not found. Available outputs: {:?}",
                        name, available
                    )))
                }
            })
            .collect()
    }
}

fn optimization_level(config: &OnnxConfig) -> GraphOptimizationLevel {
    if !config.enable_optimization {
        return GraphOptimizationLevel::Disable;
    }
    match config.optimization_level {
        i32::MIN..=0 => GraphOptimizationLevel::Disable,
        1 => GraphOptimizationLevel::Level1,
        2 => GraphOptimizationLevel::Level2,
        _ => GraphOptimizationLevel::Level3,
    }
}
