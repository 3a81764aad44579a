pub mod analysis;
pub mod config;
pub mod image;
pub mod models;
pub mod utils;
pub mod web;

// Re-export the main types
pub use analysis::{ProcessedImageRecord, ScanPipeline};
pub use config::Config;
pub use models::InferenceContext;
pub use utils::error::ScanError;

pub type Result<T> = std::result::Result<T, ScanError>;
