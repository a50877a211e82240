// The detection-to-recognition pipeline
//
// bytes -> decode -> detect -> reverse/pad/clamp -> per-region crop+recognize
// -> assembled outcome. Region-level faults are skipped and logged; decode and
// detection faults abort the request.

use tracing::{debug, warn};

use crate::core::config::Config;
use crate::core::errors::PipelineResult;
use crate::core::types::{OcrEntry, OcrOutcome, RawDetection, Region};
use crate::services::{DetectText, RecognizeText};
use crate::utils::image_ops::crop_region;

/// Knobs for box post-processing
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub padding: u32,
    pub reverse_detection_order: bool,
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            padding: config.box_padding(),
            reverse_detection_order: config.reverse_detection_order(),
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            padding: 4,
            reverse_detection_order: true,
        }
    }
}

/// Reverse the detector's emission order (when configured), then pad each box
/// and clamp it to image bounds.
///
/// One output region per input detection; regions that collapse under
/// clamping are kept here and filtered at crop time.
pub fn postprocess_regions(
    mut detections: Vec<RawDetection>,
    width: u32,
    height: u32,
    opts: &PipelineOptions,
) -> Vec<Region> {
    if opts.reverse_detection_order {
        detections.reverse();
    }

    let padding = opts.padding as i64;
    detections
        .into_iter()
        .map(|d| {
            let [bx0, by0, bx1, by1] = d.bbox.map(i64::from);
            Region {
                x0: (bx0 - padding).max(0) as u32,
                y0: (by0 - padding).max(0) as u32,
                x1: (bx1 + padding).clamp(0, i64::from(width)) as u32,
                y1: (by1 + padding).clamp(0, i64::from(height)) as u32,
            }
        })
        .collect()
}

/// Run the full pipeline on one uploaded image.
pub fn run_ocr(
    detector: &dyn DetectText,
    recognizer: &dyn RecognizeText,
    bytes: &[u8],
    opts: &PipelineOptions,
) -> PipelineResult<OcrOutcome> {
    let img = image::load_from_memory(bytes)?;
    debug!("Decoded image: {}x{}", img.width(), img.height());

    let raw = detector.detect(&img)?;
    let regions_detected = raw.len();
    debug!("Detector returned {} candidate regions", regions_detected);

    let regions = postprocess_regions(raw, img.width(), img.height(), opts);

    let mut entries = Vec::with_capacity(regions.len());
    let mut regions_skipped = 0usize;

    for region in regions {
        if region.is_degenerate() {
            warn!(
                "Skipping degenerate region [{}, {}, {}, {}]",
                region.x0, region.y0, region.x1, region.y1
            );
            regions_skipped += 1;
            continue;
        }

        let crop = crop_region(&img, &region);
        match recognizer.recognize(&crop) {
            Ok(text) => entries.push(OcrEntry { region, text }),
            Err(e) => {
                // Best effort over all regions: one bad crop must not fail
                // the request.
                warn!(
                    "Recognition failed for region [{}, {}, {}, {}]: {}",
                    region.x0, region.y0, region.x1, region.y1, e
                );
                regions_skipped += 1;
            }
        }
    }

    Ok(OcrOutcome {
        entries,
        regions_detected,
        regions_skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::{DetectionResult, RecognitionError, RecognitionResult};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Detector stub returning a fixed list of boxes
    struct FixedDetector(Vec<RawDetection>);

    impl DetectText for FixedDetector {
        fn detect(&self, _img: &DynamicImage) -> DetectionResult<Vec<RawDetection>> {
            Ok(self.0.clone())
        }
    }

    /// Recognizer stub labelling each crop by its dimensions
    struct SizeRecognizer;

    impl RecognizeText for SizeRecognizer {
        fn recognize(&self, crop: &DynamicImage) -> RecognitionResult<String> {
            Ok(format!("{}x{}", crop.width(), crop.height()))
        }
    }

    /// Recognizer stub that fails on its first call only
    struct FlakyRecognizer(AtomicUsize);

    impl RecognizeText for FlakyRecognizer {
        fn recognize(&self, _crop: &DynamicImage) -> RecognitionResult<String> {
            if self.0.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(RecognitionError::UnexpectedOutput("boom".to_string()))
            } else {
                Ok("ok".to_string())
            }
        }
    }

    fn detection(bbox: [i32; 4]) -> RawDetection {
        RawDetection {
            bbox,
            confidence: 0.9,
        }
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 200, 200]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn default_opts() -> PipelineOptions {
        PipelineOptions::default()
    }

    #[test]
    fn reversal_property() {
        let raw = vec![
            detection([10, 80, 20, 90]),
            detection([10, 50, 20, 60]),
            detection([10, 10, 20, 20]),
        ];

        let regions = postprocess_regions(raw, 100, 100, &default_opts());
        // [A, B, C] in -> [C, B, A] out
        assert_eq!(regions[0].y0, 6);
        assert_eq!(regions[1].y0, 46);
        assert_eq!(regions[2].y0, 76);
    }

    #[test]
    fn reversal_can_be_disabled() {
        let raw = vec![detection([0, 40, 10, 50]), detection([0, 10, 10, 20])];
        let opts = PipelineOptions {
            padding: 0,
            reverse_detection_order: false,
        };

        let regions = postprocess_regions(raw, 100, 100, &opts);
        assert_eq!(regions[0].y0, 40);
        assert_eq!(regions[1].y0, 10);
    }

    #[test]
    fn padding_and_clamping_invariants() {
        let raw = vec![
            detection([2, 3, 98, 99]),   // pads past both borders
            detection([-5, -5, 30, 30]), // detector box partially outside
            detection([40, 40, 60, 60]), // interior box
        ];
        let width = 100;
        let height = 100;

        let regions = postprocess_regions(raw, width, height, &default_opts());
        for region in &regions {
            assert!(region.x0 < region.x1);
            assert!(region.y0 < region.y1);
            assert!(region.x1 <= width);
            assert!(region.y1 <= height);
        }

        // Interior box gets the full 4px margin (output is reversed)
        assert_eq!(regions[0], Region { x0: 36, y0: 36, x1: 64, y1: 64 });
    }

    #[test]
    fn zero_detections_yield_empty_outcome() {
        let detector = FixedDetector(vec![]);
        let outcome = run_ocr(&detector, &SizeRecognizer, &png_bytes(64, 64), &default_opts())
            .unwrap();

        assert!(outcome.entries.is_empty());
        assert_eq!(outcome.regions_detected, 0);
        assert_eq!(outcome.regions_skipped, 0);
    }

    #[test]
    fn degenerate_region_is_skipped_not_fatal() {
        // Second box sits fully left of the image; clamping collapses it
        let detector = FixedDetector(vec![
            detection([10, 10, 30, 30]),
            detection([-40, 10, -20, 30]),
        ]);
        let opts = PipelineOptions {
            padding: 0,
            reverse_detection_order: false,
        };

        let outcome = run_ocr(&detector, &SizeRecognizer, &png_bytes(64, 64), &opts).unwrap();
        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.regions_detected, 2);
        assert_eq!(outcome.regions_skipped, 1);
        assert_eq!(outcome.entries[0].text, "20x20");
    }

    #[test]
    fn recognition_fault_skips_only_that_region() {
        let detector = FixedDetector(vec![
            detection([5, 5, 25, 25]),
            detection([5, 35, 25, 55]),
        ]);
        let recognizer = FlakyRecognizer(AtomicUsize::new(0));

        let outcome =
            run_ocr(&detector, &recognizer, &png_bytes(64, 64), &default_opts()).unwrap();
        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.regions_skipped, 1);
        assert_eq!(outcome.entries[0].text, "ok");
    }

    #[test]
    fn crops_follow_padded_regions() {
        let detector = FixedDetector(vec![detection([8, 8, 24, 24])]);
        let outcome =
            run_ocr(&detector, &SizeRecognizer, &png_bytes(64, 64), &default_opts()).unwrap();

        // 16x16 box plus 4px padding on every side
        assert_eq!(outcome.entries[0].text, "24x24");
        assert_eq!(outcome.entries[0].region, Region { x0: 4, y0: 4, x1: 28, y1: 28 });
    }

    #[test]
    fn undecodable_bytes_are_a_decode_error() {
        let detector = FixedDetector(vec![]);
        let err = run_ocr(
            &detector,
            &SizeRecognizer,
            b"definitely not an image",
            &default_opts(),
        )
        .unwrap_err();

        assert!(err.is_client_error());
    }

    #[test]
    fn decode_is_idempotent() {
        let bytes = png_bytes(32, 16);
        let first = image::load_from_memory(&bytes).unwrap();
        let second = image::load_from_memory(&bytes).unwrap();

        assert_eq!(first.width(), second.width());
        assert_eq!(first.height(), second.height());
        assert_eq!(first.to_rgb8().as_raw(), second.to_rgb8().as_raw());
    }
}
