pub mod classifier;
pub mod context;
pub mod detector;
pub mod router;
pub mod session;
pub mod traits;

pub use classifier::{classify, sigmoid, OnnxClassifier};
pub use context::{InferenceContext, ModelStats};
pub use detector::{select_best, OnnxDetector, RegionDetector};
pub use router::{ModelPair, PlaneRouter};
pub use traits::{ClassifierModel, DetectionModel, ExplainableModel, LayerCapture};
