pub mod detection;
pub mod recognition;

use image::DynamicImage;

use crate::core::errors::{DetectionResult, RecognitionResult};
use crate::core::types::RawDetection;

/// Text-detection capability: given a decoded image, report zero or more
/// rectangular text candidates in the detector's native order.
pub trait DetectText: Send + Sync {
    fn detect(&self, img: &DynamicImage) -> DetectionResult<Vec<RawDetection>>;
}

/// Text-recognition capability: convert one cropped region into a string.
pub trait RecognizeText: Send + Sync {
    fn recognize(&self, crop: &DynamicImage) -> RecognitionResult<String>;
}

// Re-export the ONNX-backed implementations
pub use detection::DetectionService;
pub use recognition::RecognitionService;
