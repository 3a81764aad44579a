use crate::analysis::PlaneLabel;
use crate::config::PlaneClassMap;
use crate::models::ExplainableModel;
use crate::utils::error::ScanError;
use crate::Result;
use std::sync::Arc;

impl PlaneClassMap {
    /// Resolve a detector class id; ids outside the map violate the
    /// detector/router contract.
    pub fn plane_for(&self, class_id: u32) -> Result<PlaneLabel> {
        if class_id == self.axial {
            Ok(PlaneLabel::Axial)
        } else if class_id == self.sagittal {
            Ok(PlaneLabel::Sagittal)
        } else {
            tracing::error!("Detector produced class id {} outside the plane map {:?}", class_id, self);
            Err(ScanError::UnknownPlane(class_id))
        }
    }
}

/// Quality and pathology classifiers trained on one plane
#[derive(Clone)]
pub struct ModelPair {
    pub quality: Arc<dyn ExplainableModel>,
    pub pathology: Arc<dyn ExplainableModel>,
}

impl ModelPair {
    pub fn new(quality: Arc<dyn ExplainableModel>, pathology: Arc<dyn ExplainableModel>) -> Self {
        Self { quality, pathology }
    }
}

/// Closed mapping from plane to its dedicated model pair
#[derive(Clone)]
pub struct PlaneRouter {
    axial: ModelPair,
    sagittal: ModelPair,
}

impl PlaneRouter {
    pub fn new(axial: ModelPair, sagittal: ModelPair) -> Self {
        Self { axial, sagittal }
    }

    pub fn select_models(&self, plane: PlaneLabel) -> &ModelPair {
        match plane {
            PlaneLabel::Axial => &self.axial,
            PlaneLabel::Sagittal => &self.sagittal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClassifierModel, LayerCapture};
    use ndarray::{Array1, Array4};

    struct Named(&'static str);

    impl ClassifierModel for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn forward(&self, _input: &Array4<f32>) -> Result<Array1<f32>> {
            Ok(Array1::zeros(2))
        }
    }

    impl ExplainableModel for Named {
        fn target_layer(&self) -> &str {
            "features"
        }

        fn capture(&self, _input: &Array4<f32>) -> Result<LayerCapture> {
            Err(ScanError::Inference("not used".into()))
        }
    }

    fn pair(quality: &'static str, pathology: &'static str) -> ModelPair {
        ModelPair::new(Arc::new(Named(quality)), Arc::new(Named(pathology)))
    }

    #[test]
    fn each_plane_gets_its_own_pair() {
        let router = PlaneRouter::new(pair("axq", "axp"), pair("sgq", "sgp"));

        let axial = router.select_models(PlaneLabel::Axial);
        assert_eq!(axial.quality.name(), "axq");
        assert_eq!(axial.pathology.name(), "axp");

        let sagittal = router.select_models(PlaneLabel::Sagittal);
        assert_eq!(sagittal.quality.name(), "sgq");
        assert_eq!(sagittal.pathology.name(), "sgp");
    }

    #[test]
    fn class_map_resolves_known_ids_only() {
        let map = PlaneClassMap::default();
        assert_eq!(map.plane_for(1).unwrap(), PlaneLabel::Sagittal);
        assert_eq!(map.plane_for(2).unwrap(), PlaneLabel::Axial);
        assert!(matches!(map.plane_for(0), Err(ScanError::UnknownPlane(0))));
        assert!(matches!(map.plane_for(3), Err(ScanError::UnknownPlane(3))));
    }
}
