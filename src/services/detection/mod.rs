// Text detection service - DB-style ONNX model wrapped behind DetectText
//
// The model takes a normalized square input and emits a per-pixel text
// probability map. Box extraction (thresholding + connected components) and
// the map -> original-image coordinate mapping live here; everything upstream
// of the probability map is opaque.

use anyhow::{Context, Result};
use image::DynamicImage;
use ndarray::Array4;
use ort::execution_providers::CPUExecutionProvider;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use parking_lot::Mutex;
use std::path::Path;
use tracing::{debug, info, trace};

use crate::core::config::Config;
use crate::core::errors::{DetectionError, DetectionResult};
use crate::core::types::RawDetection;
use crate::services::DetectText;

/// ImageNet normalization constants expected by the model
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Connected components smaller than this are noise, not text
const MIN_REGION_PIXELS: usize = 10;

/// Connected region of above-threshold pixels in the probability map
#[derive(Debug, Clone, PartialEq)]
struct MapBox {
    min_x: usize,
    min_y: usize,
    max_x: usize,
    max_y: usize,
    confidence: f32,
}

pub struct DetectionService {
    // The session is not assumed to be safe for concurrent runs; a single
    // shared permit serializes inference across requests.
    session: Mutex<Session>,
    input_name: String,
    confidence_threshold: f32,
    target_size: u32,
}

impl DetectionService {
    pub fn new(config: &Config) -> Result<Self> {
        let model_path = Path::new(&config.detection.model_path);
        if !model_path.exists() {
            anyhow::bail!(
                "Detection model not found at: {}. Set DET_MODEL_PATH or copy the model there.",
                model_path.display()
            );
        }

        info!("Loading detection model from {}", model_path.display());

        let session = Session::builder()?
            .with_execution_providers([CPUExecutionProvider::default().build()])?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(num_cpus::get())?
            .commit_from_file(model_path)
            .context("Failed to load detection ONNX model")?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "x".to_string());

        info!(
            "Detection service initialized: input={}, threshold={:.2}, target_size={}",
            input_name,
            config.confidence_threshold(),
            config.target_size()
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            confidence_threshold: config.confidence_threshold(),
            target_size: config.target_size(),
        })
    }

    /// Resize into the top-left of a gray square of `target_size` and
    /// normalize. Returns the tensor and the scale applied to the source, so
    /// detections can be mapped back.
    fn preprocess(&self, img: &DynamicImage) -> (Array4<f32>, f32) {
        let target = self.target_size as usize;
        trace!(
            "Preprocessing image: {}x{} -> {}x{}",
            img.width(),
            img.height(),
            target,
            target
        );

        let scale = (self.target_size as f32 / img.width() as f32)
            .min(self.target_size as f32 / img.height() as f32);
        let new_w = ((img.width() as f32 * scale).round() as u32).clamp(1, self.target_size);
        let new_h = ((img.height() as f32 * scale).round() as u32).clamp(1, self.target_size);

        let resized = img.resize_exact(new_w, new_h, image::imageops::FilterType::Triangle);
        let rgb = resized.to_rgb8();

        let mut array = Array4::<f32>::zeros((1, 3, target, target));

        // Padding pixels are mid-gray in normalized space
        for c in 0..3 {
            let fill = (0.5 - MEAN[c]) / STD[c];
            for y in 0..target {
                for x in 0..target {
                    array[[0, c, y, x]] = fill;
                }
            }
        }

        for y in 0..new_h as usize {
            for x in 0..new_w as usize {
                let pixel = rgb.get_pixel(x as u32, y as u32);
                for c in 0..3 {
                    array[[0, c, y, x]] = (pixel[c] as f32 / 255.0 - MEAN[c]) / STD[c];
                }
            }
        }

        (array, scale)
    }
}

impl DetectText for DetectionService {
    fn detect(&self, img: &DynamicImage) -> DetectionResult<Vec<RawDetection>> {
        let detection_start = std::time::Instant::now();
        let (preprocessed, scale) = self.preprocess(img);
        let input_value = Value::from_array(preprocessed)?;

        // Run inference and copy the probability map out while the session is
        // held, then release the permit before postprocessing.
        let (dims, map) = {
            let mut session = self.session.lock();
            let outputs = session.run(ort::inputs![&self.input_name => input_value])?;

            let first_key = outputs
                .keys()
                .next()
                .ok_or_else(|| {
                    DetectionError::UnexpectedOutput("model produced no outputs".to_string())
                })?;
            let (shape, data) = outputs[first_key].try_extract_tensor::<f32>()?;

            let dims: Vec<usize> = shape.iter().map(|&x| x as usize).collect();
            let map: Vec<f32> = data.to_vec();
            (dims, map)
        };

        // Probability map is [1, 1, H, W] or [1, H, W]
        let (map_h, map_w) = match dims.len() {
            4 => (dims[2], dims[3]),
            3 => (dims[1], dims[2]),
            _ => {
                return Err(DetectionError::UnexpectedOutput(format!(
                    "probability map has shape {:?}",
                    dims
                )))
            }
        };
        if map.len() < map_h * map_w {
            return Err(DetectionError::UnexpectedOutput(format!(
                "probability map shorter than {}x{}",
                map_h, map_w
            )));
        }

        let map_boxes = extract_map_boxes(&map, map_w, map_h, self.confidence_threshold);

        // map space -> model input space -> original pixel space
        let sx = self.target_size as f32 / map_w as f32;
        let sy = self.target_size as f32 / map_h as f32;
        let mut detections: Vec<RawDetection> = map_boxes
            .into_iter()
            .map(|b| {
                let x0 = (b.min_x as f32 * sx / scale) as i32;
                let y0 = (b.min_y as f32 * sy / scale) as i32;
                let x1 = ((b.max_x + 1) as f32 * sx / scale) as i32;
                let y1 = ((b.max_y + 1) as f32 * sy / scale) as i32;
                RawDetection {
                    bbox: [
                        x0.clamp(0, img.width() as i32),
                        y0.clamp(0, img.height() as i32),
                        x1.clamp(0, img.width() as i32),
                        y1.clamp(0, img.height() as i32),
                    ],
                    confidence: b.confidence,
                }
            })
            .collect();

        // Native emission order of this detector is bottom-to-top
        detections.sort_by(|a, b| b.bbox[1].cmp(&a.bbox[1]));

        debug!(
            "Detection completed in {:.2}ms: {} regions above threshold {:.2}",
            detection_start.elapsed().as_secs_f64() * 1000.0,
            detections.len(),
            self.confidence_threshold
        );

        Ok(detections)
    }
}

/// Threshold the probability map and collect connected components (4-connected
/// flood fill). Components below MIN_REGION_PIXELS are dropped.
fn extract_map_boxes(map: &[f32], width: usize, height: usize, threshold: f32) -> Vec<MapBox> {
    let mut visited = vec![false; width * height];
    let mut boxes = Vec::new();

    for start_y in 0..height {
        for start_x in 0..width {
            let start_idx = start_y * width + start_x;
            if visited[start_idx] || map[start_idx] < threshold {
                continue;
            }

            let mut stack = vec![(start_x, start_y)];
            let (mut min_x, mut max_x) = (start_x, start_x);
            let (mut min_y, mut max_y) = (start_y, start_y);
            let mut pixels = 0usize;
            let mut confidence_sum = 0.0f32;

            while let Some((x, y)) = stack.pop() {
                let idx = y * width + x;
                if visited[idx] || map[idx] < threshold {
                    continue;
                }
                visited[idx] = true;
                pixels += 1;
                confidence_sum += map[idx];

                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);

                if x > 0 {
                    stack.push((x - 1, y));
                }
                if x + 1 < width {
                    stack.push((x + 1, y));
                }
                if y > 0 {
                    stack.push((x, y - 1));
                }
                if y + 1 < height {
                    stack.push((x, y + 1));
                }
            }

            if pixels >= MIN_REGION_PIXELS {
                boxes.push(MapBox {
                    min_x,
                    min_y,
                    max_x,
                    max_y,
                    confidence: confidence_sum / pixels as f32,
                });
            }
        }
    }

    boxes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_map(width: usize, height: usize) -> Vec<f32> {
        vec![0.0; width * height]
    }

    fn fill_rect(map: &mut [f32], width: usize, x0: usize, y0: usize, x1: usize, y1: usize, v: f32) {
        for y in y0..y1 {
            for x in x0..x1 {
                map[y * width + x] = v;
            }
        }
    }

    #[test]
    fn empty_map_yields_no_boxes() {
        let map = blank_map(32, 32);
        assert!(extract_map_boxes(&map, 32, 32, 0.3).is_empty());
    }

    #[test]
    fn single_blob_is_boxed() {
        let mut map = blank_map(32, 32);
        fill_rect(&mut map, 32, 4, 6, 12, 10, 0.9);

        let boxes = extract_map_boxes(&map, 32, 32, 0.3);
        assert_eq!(boxes.len(), 1);
        assert_eq!(boxes[0].min_x, 4);
        assert_eq!(boxes[0].min_y, 6);
        assert_eq!(boxes[0].max_x, 11);
        assert_eq!(boxes[0].max_y, 9);
        assert!((boxes[0].confidence - 0.9).abs() < 1e-4);
    }

    #[test]
    fn disconnected_blobs_become_separate_boxes() {
        let mut map = blank_map(40, 40);
        fill_rect(&mut map, 40, 2, 2, 8, 6, 0.8);
        fill_rect(&mut map, 40, 20, 25, 30, 30, 0.7);

        let boxes = extract_map_boxes(&map, 40, 40, 0.3);
        assert_eq!(boxes.len(), 2);
    }

    #[test]
    fn tiny_components_are_dropped() {
        let mut map = blank_map(16, 16);
        // 4 pixels, below MIN_REGION_PIXELS
        fill_rect(&mut map, 16, 1, 1, 3, 3, 0.95);

        assert!(extract_map_boxes(&map, 16, 16, 0.3).is_empty());
    }

    #[test]
    fn below_threshold_pixels_are_ignored() {
        let mut map = blank_map(16, 16);
        fill_rect(&mut map, 16, 0, 0, 16, 16, 0.2);

        assert!(extract_map_boxes(&map, 16, 16, 0.3).is_empty());
    }
}
