// Core data types shared by the pipeline and the HTTP layer

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::config::Config;
use crate::services::{DetectText, RecognizeText};
use crate::utils::Metrics;

/// Application state shared across handlers
///
/// The two model handles are process-wide singletons: each cell is set exactly
/// once by the startup task and only read afterwards. Requests arriving before
/// both cells are populated are answered with 503.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub detector: Arc<OnceCell<Arc<dyn DetectText>>>,
    pub recognizer: Arc<OnceCell<Arc<dyn RecognizeText>>>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            detector: Arc::new(OnceCell::new()),
            recognizer: Arc::new(OnceCell::new()),
            metrics: Metrics::new(),
        }
    }
}

/// A box as reported by the detection capability: min/max corners in pixel
/// coordinates of the source image, not yet padded or clamped.
#[derive(Debug, Clone)]
pub struct RawDetection {
    pub bbox: [i32; 4],
    pub confidence: f32,
}

/// Axis-aligned rectangle in image pixel coordinates, after padding/clamping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl Region {
    pub fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }

    /// A region that collapsed to zero width or height contributes no crop.
    pub fn is_degenerate(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn coordinates(&self) -> [[u32; 2]; 2] {
        [[self.x0, self.y0], [self.x1, self.y1]]
    }
}

/// One recognized text region
#[derive(Debug, Clone)]
pub struct OcrEntry {
    pub region: Region,
    pub text: String,
}

/// Outcome of running the full pipeline on one image
#[derive(Debug, Clone, Default)]
pub struct OcrOutcome {
    pub entries: Vec<OcrEntry>,
    /// Candidate regions the detector reported before degeneracy filtering
    pub regions_detected: usize,
    /// Regions dropped as degenerate or after a recognition fault
    pub regions_skipped: usize,
}

/// Wire format for a single recognized box
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrBox {
    pub coordinates: [[u32; 2]; 2],
    pub text: String,
    /// The current recognition model does not report confidence; kept optional
    /// for capabilities that do.
    pub confidence: Option<f32>,
}

/// Wire format for an OCR response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrResponse {
    pub success: bool,
    pub message: String,
    pub results: Vec<OcrBox>,
    pub total_boxes: usize,
}

impl From<OcrOutcome> for OcrResponse {
    fn from(outcome: OcrOutcome) -> Self {
        let results: Vec<OcrBox> = outcome
            .entries
            .into_iter()
            .map(|entry| OcrBox {
                coordinates: entry.region.coordinates(),
                text: entry.text,
                confidence: None,
            })
            .collect();

        Self {
            success: true,
            message: format!(
                "Successfully processed image. Found {} text regions.",
                results.len()
            ),
            total_boxes: results.len(),
            results,
        }
    }
}

/// Request body for the base64 endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Base64OcrRequest {
    pub image_base64: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate_region_detection() {
        let flat = Region { x0: 10, y0: 5, x1: 10, y1: 20 };
        assert!(flat.is_degenerate());

        // Clamping can leave x1 < x0 for boxes outside the image
        let inverted = Region { x0: 30, y0: 0, x1: 20, y1: 10 };
        assert!(inverted.is_degenerate());
        assert_eq!(inverted.width(), 0);

        let ok = Region { x0: 0, y0: 0, x1: 4, y1: 4 };
        assert!(!ok.is_degenerate());
    }

    #[test]
    fn response_from_outcome() {
        let outcome = OcrOutcome {
            entries: vec![OcrEntry {
                region: Region { x0: 1, y0: 2, x1: 3, y1: 4 },
                text: "xin chào".to_string(),
            }],
            regions_detected: 2,
            regions_skipped: 1,
        };

        let response = OcrResponse::from(outcome);
        assert!(response.success);
        assert_eq!(response.total_boxes, 1);
        assert_eq!(response.results[0].coordinates, [[1, 2], [3, 4]]);
        assert_eq!(response.results[0].text, "xin chào");
        assert!(response.results[0].confidence.is_none());
        assert!(response.message.contains("Found 1 text regions"));
    }
}
