pub mod cache;
pub mod export;
pub mod pipeline;
pub mod saliency;
pub mod types;

pub use cache::ResultCache;
pub use export::{Annotation, RecordExporter};
pub use pipeline::ScanPipeline;
pub use saliency::SaliencyExplainer;
pub use types::*;
