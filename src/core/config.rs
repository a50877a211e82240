use crate::core::errors::ConfigError;
use std::env;
use tracing::Level;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub log_level: Level,
}

/// Detection configuration
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    pub model_path: String,
    pub confidence_threshold: f32,
    pub target_size: u32,
}

/// Recognition configuration
#[derive(Debug, Clone)]
pub struct RecognitionConfig {
    pub model_path: String,
    pub charset_path: String,
    pub input_height: u32,
    pub max_width: u32,
}

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Pixel margin added around each detected box before cropping
    pub padding: u32,
    /// The bundled detector reports regions bottom-to-top; reversing presents
    /// results in reading order. Disable for detectors that already emit
    /// top-to-bottom.
    pub reverse_detection_order: bool,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub detection: DetectionConfig,
    pub recognition: RecognitionConfig,
    pub pipeline: PipelineConfig,
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::load_from_env();
        config.validate()?;
        Ok(config)
    }

    fn load_from_env() -> Self {
        // Parse log level
        let log_level = env::var("LOG_LEVEL")
            .ok()
            .and_then(|s| match s.to_lowercase().as_str() {
                "trace" => Some(Level::TRACE),
                "debug" => Some(Level::DEBUG),
                "info" => Some(Level::INFO),
                "warn" | "warning" => Some(Level::WARN),
                "error" => Some(Level::ERROR),
                _ => None,
            })
            .unwrap_or(Level::INFO);

        Self {
            server: ServerConfig {
                port: env::var("SERVER_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(8000),
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                log_level,
            },
            detection: DetectionConfig {
                model_path: env::var("DET_MODEL_PATH")
                    .unwrap_or_else(|_| "models/detection.onnx".to_string()),
                confidence_threshold: env::var("CONFIDENCE_THRESHOLD")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0.3),
                target_size: env::var("TARGET_SIZE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(640),
            },
            recognition: RecognitionConfig {
                model_path: env::var("REC_MODEL_PATH")
                    .unwrap_or_else(|_| "models/recognition.onnx".to_string()),
                charset_path: env::var("REC_CHARSET_PATH")
                    .unwrap_or_else(|_| "models/viet_charset.txt".to_string()),
                input_height: env::var("REC_INPUT_HEIGHT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(32),
                max_width: env::var("REC_MAX_WIDTH")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(512),
            },
            pipeline: PipelineConfig {
                padding: env::var("BOX_PADDING")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(4),
                reverse_detection_order: env::var("REVERSE_DETECTION_ORDER")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(true),
            },
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.detection.confidence_threshold) {
            return Err(ConfigError::InvalidConfidenceThreshold(
                self.detection.confidence_threshold,
            ));
        }

        if !(320..=2048).contains(&self.detection.target_size) {
            return Err(ConfigError::InvalidDetectionConfig(format!(
                "target_size must be between 320 and 2048, got {}",
                self.detection.target_size
            )));
        }

        if !(16..=128).contains(&self.recognition.input_height) {
            return Err(ConfigError::InvalidRecognitionConfig(format!(
                "input_height must be between 16 and 128, got {}",
                self.recognition.input_height
            )));
        }

        if self.recognition.max_width < self.recognition.input_height {
            return Err(ConfigError::InvalidRecognitionConfig(format!(
                "max_width ({}) must not be smaller than input_height ({})",
                self.recognition.max_width, self.recognition.input_height
            )));
        }

        Ok(())
    }

    pub fn server_port(&self) -> u16 {
        self.server.port
    }

    pub fn server_host(&self) -> &str {
        &self.server.host
    }

    pub fn log_level(&self) -> Level {
        self.server.log_level
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.detection.confidence_threshold
    }

    pub fn target_size(&self) -> u32 {
        self.detection.target_size
    }

    pub fn box_padding(&self) -> u32 {
        self.pipeline.padding
    }

    pub fn reverse_detection_order(&self) -> bool {
        self.pipeline.reverse_detection_order
    }
}

// Note: No Default implementation because Config::new() can fail
// Users should explicitly call Config::new()? and handle errors

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::load_from_env();
        assert!(config.validate().is_ok());
        assert_eq!(config.box_padding(), 4);
        assert!(config.reverse_detection_order());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut config = Config::load_from_env();
        config.detection.confidence_threshold = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfidenceThreshold(_))
        ));
    }

    #[test]
    fn rejects_tiny_recognition_height() {
        let mut config = Config::load_from_env();
        config.recognition.input_height = 4;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRecognitionConfig(_))
        ));
    }
}
