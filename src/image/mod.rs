pub mod colormap;
pub mod letterbox;
pub mod loader;
pub mod normalizer;
pub mod transforms;

pub use letterbox::{letterbox, Letterbox};
pub use loader::ImageLoader;
pub use normalizer::{ImageNormalizer, NormalizedTensor};
pub use transforms::ImageTransforms;
