// Library exports for the Vietnamese OCR service

pub mod api;
pub mod core;
pub mod pipeline;
pub mod services;
pub mod utils;

// Re-export commonly used types and functions
pub use crate::core::{
    config::Config,
    errors::{ConfigError, DetectionError, PipelineError, RecognitionError},
    types::{AppState, OcrBox, OcrOutcome, OcrResponse, RawDetection, Region},
};

pub use pipeline::{postprocess_regions, run_ocr, PipelineOptions};

pub use services::{DetectText, DetectionService, RecognitionService, RecognizeText};

pub use utils::Metrics;
