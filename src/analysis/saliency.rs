//! Class-activation saliency maps (Grad-CAM++) rendered over the model input

use crate::analysis::SaliencyMap;
use crate::image::colormap;
use crate::image::{ImageTransforms, NormalizedTensor};
use crate::models::{ExplainableModel, LayerCapture};
use crate::utils::error::ScanError;
use crate::Result;
use ndarray::{Array2, Axis, Zip};

const ALPHA_EPSILON: f32 = 1e-7;

#[derive(Debug, Clone)]
pub struct SaliencyExplainer {
    alpha: f32,
}

impl SaliencyExplainer {
    pub fn new(alpha: f32) -> Self {
        Self { alpha }
    }

    /// Saliency overlay at the model's input resolution, in the original
    /// image orientation.
    pub fn explain<M>(&self, tensor: &NormalizedTensor, model: &M) -> Result<SaliencyMap>
    where
        M: ExplainableModel + ?Sized,
    {
        let input = tensor.to_batch(model.input_channels())?;
        let capture = model.capture(&input)?;

        let cam = grad_cam_pp(&capture)?;
        let (_, width, height) = tensor.shape();
        let upsampled = ImageTransforms::bilinear_resize(&cam, width, height);
        let importance = normalize_map(&upsampled);

        tracing::debug!(
            "Saliency for {} via '{}': activations {:?}",
            model.name(),
            model.target_layer(),
            capture.activations.dim()
        );

        let image = render_overlay(tensor, &importance, self.alpha)?;
        Ok(SaliencyMap { image })
    }
}

impl SaliencyMap {
    /// Stretch the overlay onto the crop it explains
    pub fn resized(self, width: u32, height: u32) -> SaliencyMap {
        SaliencyMap {
            image: ImageTransforms::resize_to(&self.image, width, height),
        }
    }
}

/// Grad-CAM++ map over the captured layer for the predicted class.
///
/// weights_c = sum(alpha * relu(grad)), alpha = g^2 / (2 g^2 + sum(A g^3)),
/// map = relu(sum_c weights_c * A_c). The exp(score) factor on the gradients
/// scales every weight equally and is dropped; the map is min-max normalized
/// afterwards.
pub fn grad_cam_pp(capture: &LayerCapture) -> Result<Array2<f32>> {
    let class_idx = argmax(capture.logits.iter().copied())
        .ok_or_else(|| ScanError::Inference("Empty logits in layer capture".to_string()))?;

    let (num_grads, _, _, _) = capture.gradients.dim();
    let grad_idx = if num_grads == 1 { 0 } else { class_idx };
    if grad_idx >= num_grads {
        return Err(ScanError::Inference(format!(
            "No gradient for class {} ({} captured)",
            class_idx, num_grads
        )));
    }

    let grads = capture.gradients.index_axis(Axis(0), grad_idx);
    let acts = &capture.activations;
    if grads.dim() != acts.dim() {
        return Err(ScanError::Inference(format!(
            "Gradient shape {:?} does not match activations {:?}",
            grads.dim(),
            acts.dim()
        )));
    }

    let (_, h, w) = acts.dim();
    let mut cam = Array2::<f32>::zeros((h, w));

    for (a_c, g_c) in acts.outer_iter().zip(grads.outer_iter()) {
        let sum_a_g3: f32 = Zip::from(&a_c).and(&g_c).fold(0.0, |acc, &a, &g| acc + a * g * g * g);

        let weight: f32 = g_c
            .iter()
            .map(|&g| {
                let nr = g * g;
                let mut dr = 2.0 * nr + sum_a_g3;
                if dr == 0.0 {
                    dr = 1.0;
                }
                let alpha = nr / (dr + ALPHA_EPSILON);
                alpha * g.max(0.0)
            })
            .sum();

        cam.scaled_add(weight, &a_c);
    }

    cam.mapv_inplace(|v| if v.is_finite() { v.max(0.0) } else { 0.0 });
    Ok(cam)
}

/// Min-max rescale to [0, 1]. A constant map (max == min) becomes all zeros.
pub fn normalize_map(map: &Array2<f32>) -> Array2<f32> {
    let min = map.iter().copied().fold(f32::INFINITY, f32::min);
    let max = map.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    if !range.is_finite() || range <= 0.0 {
        return Array2::zeros(map.dim());
    }
    map.mapv(|v| ((v - min) / range).clamp(0.0, 1.0))
}

/// Blend the colorized importance over channel 0 of the tensor, then undo the
/// normalizer's transpose.
fn render_overlay(tensor: &NormalizedTensor, importance: &Array2<f32>, alpha: f32) -> Result<image::RgbImage> {
    let base_channel = tensor.view().index_axis(Axis(0), 0).to_owned();
    let base = colormap::grayscale(&base_channel);
    let heat = colormap::colorize(importance);

    let blended = colormap::blend(&base, &heat, alpha)?;
    Ok(ImageTransforms::undo_transpose(&blended))
}

fn argmax(values: impl Iterator<Item = f32>) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, v) in values.enumerate() {
        match best {
            Some((_, current)) if v <= current => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}
