// Custom error types for better error handling and debugging
//
// Using thiserror for ergonomic error definitions with:
// - Context preservation
// - Type-safe error matching
// - Source error chaining

use thiserror::Error;

/// Detection service errors
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("ONNX inference failed: {0}")]
    InferenceFailed(#[from] ort::Error),

    #[error("unexpected detection output: {0}")]
    UnexpectedOutput(String),
}

/// Recognition service errors
#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("ONNX inference failed: {0}")]
    InferenceFailed(#[from] ort::Error),

    #[error("unexpected recognition output: {0}")]
    UnexpectedOutput(String),
}

/// Request pipeline errors
///
/// Decode failures are the caller's fault (bad bytes); detection failures are
/// ours. The HTTP layer uses `is_client_error` to pick the status code.
/// Recognition errors never appear here: a failing region is skipped, not
/// fatal to the request.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("text detection failed: {0}")]
    Detection(#[from] DetectionError),
}

impl PipelineError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::Decode(_))
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Confidence threshold must be in [0.0, 1.0], got {0}")]
    InvalidConfidenceThreshold(f32),

    #[error("Invalid detection config: {0}")]
    InvalidDetectionConfig(String),

    #[error("Invalid recognition config: {0}")]
    InvalidRecognitionConfig(String),
}

// Convenience type aliases for Results
pub type DetectionResult<T> = Result<T, DetectionError>;
pub type RecognitionResult<T> = Result<T, RecognitionError>;
pub type PipelineResult<T> = Result<T, PipelineError>;
