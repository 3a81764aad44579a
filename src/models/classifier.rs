use crate::analysis::ClassificationResult;
use crate::config::Config;
use crate::image::NormalizedTensor;
use crate::models::session::SharedSession;
use crate::models::{ClassifierModel, ExplainableModel, LayerCapture};
use crate::utils::error::ScanError;
use crate::Result;
use ndarray::{Array1, Array4, ArrayD, Axis, Ix1, Ix3, Ix4};
use std::path::Path;

/// Index of the positive class (poor quality / pathology present)
pub const POSITIVE_CLASS: usize = 1;

/// Two-class ONNX classifier exported with its explainable layer.
///
/// The graph's first output is the logits. The target layer's activations are
/// exported under the layer name, their gradients under `<layer>/grad`.
pub struct OnnxClassifier {
    label: String,
    session: SharedSession,
    logits_name: String,
    activations_name: String,
    gradients_name: String,
    target_layer: String,
    input_channels: usize,
}

impl OnnxClassifier {
    pub fn new(model_path: &Path, label: &str, config: &Config) -> Result<Self> {
        let session = SharedSession::load(model_path, &config.onnx_config, label)?;

        let target_layer = config.pipeline_config.target_layer.clone();
        let logits_name = session.output_names()[0].clone();
        let activations_name = target_layer.clone();
        let gradients_name = format!("{}/grad", target_layer);

        for required in [&activations_name, &gradients_name] {
            if !session.has_output(required) {
                return Err(ScanError::ModelLoad(format!(
                    "{} model does not expose '{}' (outputs: {:?})",
                    label,
                    required,
                    session.output_names()
                )));
            }
        }

        tracing::info!("{} model logits output: '{}', target layer: '{}'", label, logits_name, target_layer);

        Ok(Self {
            label: label.to_string(),
            session,
            logits_name,
            activations_name,
            gradients_name,
            target_layer,
            input_channels: config.pipeline_config.classifier_channels,
        })
    }
}

impl ClassifierModel for OnnxClassifier {
    fn name(&self) -> &str {
        &self.label
    }

    fn input_channels(&self) -> usize {
        self.input_channels
    }

    fn forward(&self, input: &Array4<f32>) -> Result<Array1<f32>> {
        let logits = self
            .session
            .run(input.clone(), &[self.logits_name.as_str()])?
            .remove(0);
        first_batch_logits(logits)
    }
}

impl ExplainableModel for OnnxClassifier {
    fn target_layer(&self) -> &str {
        &self.target_layer
    }

    fn capture(&self, input: &Array4<f32>) -> Result<LayerCapture> {
        let outputs = self.session.run(
            input.clone(),
            &[
                self.logits_name.as_str(),
                self.activations_name.as_str(),
                self.gradients_name.as_str(),
            ],
        )?;

        let [logits, activations, gradients]: [ArrayD<f32>; 3] = outputs
            .try_into()
            .map_err(|_| ScanError::Inference("Expected three capture outputs".to_string()))?;

        let activations = drop_batch_axis(activations)
            .into_dimensionality::<Ix3>()
            .map_err(|e| ScanError::Inference(format!("Activations must be (1, C, h, w): {}", e)))?;

        let gradients = match gradients.ndim() {
            // (1, C, h, w): already the predicted-class gradient
            4 => drop_batch_axis(gradients).insert_axis(Axis(0)),
            // (1, K, C, h, w)
            5 => drop_batch_axis(gradients),
            n => {
                return Err(ScanError::Inference(format!(
                    "Gradients must be 4D or 5D, got {}D",
                    n
                )))
            }
        }
        .into_dimensionality::<Ix4>()
        .map_err(|e| ScanError::Inference(format!("Gradient reshape failed: {}", e)))?;

        Ok(LayerCapture {
            logits: first_batch_logits(logits)?,
            activations,
            gradients,
        })
    }
}

fn drop_batch_axis(array: ArrayD<f32>) -> ArrayD<f32> {
    if array.ndim() > 0 && array.shape()[0] == 1 {
        array.index_axis_move(Axis(0), 0)
    } else {
        array
    }
}

fn first_batch_logits(logits: ArrayD<f32>) -> Result<Array1<f32>> {
    let logits = match logits.ndim() {
        1 => logits,
        2 => drop_batch_axis(logits),
        n => {
            return Err(ScanError::Inference(format!(
                "Expected (1, classes) logits, got {}D output",
                n
            )))
        }
    };

    logits
        .into_dimensionality::<Ix1>()
        .map_err(|e| ScanError::Inference(format!("Logits reshape failed: {}", e)))
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// One forward pass over the batched tensor; the positive-class logit is
/// squashed into a probability.
pub fn classify<M>(tensor: &NormalizedTensor, model: &M) -> Result<ClassificationResult>
where
    M: ClassifierModel + ?Sized,
{
    let input = tensor.to_batch(model.input_channels())?;
    let logits = model.forward(&input)?;

    if logits.len() <= POSITIVE_CLASS {
        return Err(ScanError::Inference(format!(
            "{} returned {} logits, expected two classes",
            model.name(),
            logits.len()
        )));
    }

    let logit = logits[POSITIVE_CLASS];
    if !logit.is_finite() {
        return Err(ScanError::Inference(format!(
            "{} produced a non-finite logit ({})",
            model.name(),
            logit
        )));
    }

    Ok(ClassificationResult {
        probability: sigmoid(logit),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    struct FixedLogits(Vec<f32>);

    impl ClassifierModel for FixedLogits {
        fn name(&self) -> &str {
            "fixed"
        }

        fn forward(&self, input: &Array4<f32>) -> Result<Array1<f32>> {
            assert_eq!(input.dim(), (1, 3, 8, 8));
            Ok(Array1::from(self.0.clone()))
        }
    }

    fn tensor() -> NormalizedTensor {
        NormalizedTensor::from_array(Array3::zeros((1, 8, 8)))
    }

    #[test]
    fn sigmoid_is_bounded() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(50.0) <= 1.0);
        assert!(sigmoid(-50.0) >= 0.0);
    }

    #[test]
    fn classify_uses_positive_logit() {
        let result = classify(&tensor(), &FixedLogits(vec![5.0, 0.0])).unwrap();
        assert_eq!(result.probability, 0.5);

        let result = classify(&tensor(), &FixedLogits(vec![0.0, 3.0])).unwrap();
        assert!((result.probability - 0.952_574_1).abs() < 1e-5);
    }

    #[test]
    fn classify_rejects_short_or_nan_logits() {
        assert!(classify(&tensor(), &FixedLogits(vec![1.0])).is_err());
        assert!(classify(&tensor(), &FixedLogits(vec![0.0, f32::NAN])).is_err());
    }

    #[test]
    fn logits_accept_batched_and_flat_outputs() {
        let batched = array![[0.1f32, 0.9]].into_dyn();
        assert_eq!(first_batch_logits(batched).unwrap(), array![0.1f32, 0.9]);

        let flat = array![0.2f32, 0.8].into_dyn();
        assert_eq!(first_batch_logits(flat).unwrap().len(), 2);

        let bad = Array3::<f32>::zeros((1, 2, 2)).into_dyn();
        assert!(first_batch_logits(bad).is_err());
    }
}
