pub mod config;
pub mod errors;
pub mod types;

// Re-export commonly used items for convenience
pub use config::Config;
pub use errors::{ConfigError, DetectionError, PipelineError, RecognitionError};
pub use types::{AppState, OcrEntry, OcrOutcome, OcrResponse, RawDetection, Region};
