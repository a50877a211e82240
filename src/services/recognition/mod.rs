// Text recognition service - CTC sequence model over a Vietnamese charset
//
// Crops are resized to a fixed height, fed through the ONNX model, and the
// logits are greedy-decoded: argmax per timestep, collapse repeats, drop
// blanks. Index 0 is the CTC blank; charset entries start at index 1.

use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView};
use ndarray::Array4;
use ort::execution_providers::CPUExecutionProvider;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use parking_lot::Mutex;
use std::path::Path;
use tracing::{debug, info};

use crate::core::config::Config;
use crate::core::errors::{RecognitionError, RecognitionResult};
use crate::services::RecognizeText;

const BLANK_INDEX: usize = 0;

/// Narrower crops than this get stretched; the model cannot read a sliver
const MIN_WIDTH: u32 = 8;

pub struct RecognitionService {
    // Single shared permit: the session is not assumed thread-safe
    session: Mutex<Session>,
    input_name: String,
    charset: Vec<String>,
    input_height: u32,
    max_width: u32,
}

impl RecognitionService {
    pub fn new(config: &Config) -> Result<Self> {
        let model_path = Path::new(&config.recognition.model_path);
        if !model_path.exists() {
            anyhow::bail!(
                "Recognition model not found at: {}. Set REC_MODEL_PATH or copy the model there.",
                model_path.display()
            );
        }

        let charset_path = Path::new(&config.recognition.charset_path);
        let charset_content = std::fs::read_to_string(charset_path).with_context(|| {
            format!("Failed to read charset file: {}", charset_path.display())
        })?;
        let charset = parse_charset(&charset_content);
        if charset.is_empty() {
            anyhow::bail!("Charset file is empty: {}", charset_path.display());
        }

        info!("Loading recognition model from {}", model_path.display());

        let session = Session::builder()?
            .with_execution_providers([CPUExecutionProvider::default().build()])?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(num_cpus::get())?
            .commit_from_file(model_path)
            .context("Failed to load recognition ONNX model")?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "x".to_string());

        info!(
            "Recognition service initialized: charset_size={}, input_height={}",
            charset.len(),
            config.recognition.input_height
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            charset,
            input_height: config.recognition.input_height,
            max_width: config.recognition.max_width,
        })
    }

    /// Resize a crop to the model height, width following aspect ratio, and
    /// normalize to [0, 1] in NCHW layout.
    fn preprocess(&self, crop: &DynamicImage) -> Array4<f32> {
        let (w, h) = crop.dimensions();

        let scale = self.input_height as f32 / h as f32;
        let new_w = ((w as f32 * scale).round() as u32).clamp(MIN_WIDTH, self.max_width);

        let resized = crop.resize_exact(
            new_w,
            self.input_height,
            image::imageops::FilterType::Lanczos3,
        );
        let rgb = resized.to_rgb8();

        let mut tensor =
            Array4::<f32>::zeros((1, 3, self.input_height as usize, new_w as usize));
        for y in 0..self.input_height as usize {
            for x in 0..new_w as usize {
                let pixel = rgb.get_pixel(x as u32, y as u32);
                for c in 0..3 {
                    tensor[[0, c, y, x]] = pixel[c] as f32 / 255.0;
                }
            }
        }

        tensor
    }
}

impl RecognizeText for RecognitionService {
    fn recognize(&self, crop: &DynamicImage) -> RecognitionResult<String> {
        let tensor = self.preprocess(crop);
        let input_value = Value::from_array(tensor)?;

        // Copy the logits out while the session is held, decode afterwards
        let (dims, logits) = {
            let mut session = self.session.lock();
            let outputs = session.run(ort::inputs![&self.input_name => input_value])?;

            let first_key = outputs.keys().next().ok_or_else(|| {
                RecognitionError::UnexpectedOutput("model produced no outputs".to_string())
            })?;
            let (shape, data) = outputs[first_key].try_extract_tensor::<f32>()?;

            let dims: Vec<usize> = shape.iter().map(|&x| x as usize).collect();
            let logits: Vec<f32> = data.to_vec();
            (dims, logits)
        };

        // Logits come out as [S, 1, V], [1, S, V] or [S, V]
        let (seq_len, vocab_size) = match dims.len() {
            3 if dims[1] == 1 => (dims[0], dims[2]),
            3 => (dims[1], dims[2]),
            2 => (dims[0], dims[1]),
            _ => {
                return Err(RecognitionError::UnexpectedOutput(format!(
                    "logits have shape {:?}",
                    dims
                )))
            }
        };
        if logits.len() < seq_len * vocab_size {
            return Err(RecognitionError::UnexpectedOutput(format!(
                "logits shorter than {}x{}",
                seq_len, vocab_size
            )));
        }

        let text = ctc_decode(&self.charset, &logits, seq_len, vocab_size);
        debug!("Recognized: '{}'", text);
        Ok(text)
    }
}

/// Parse a charset file: one entry per line, CTC index = line number + 1.
/// Windows line endings are tolerated; blank lines are skipped.
fn parse_charset(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// CTC greedy decode: best class per timestep, collapse repeats, drop blanks.
fn ctc_decode(charset: &[String], logits: &[f32], seq_len: usize, vocab_size: usize) -> String {
    let mut text = String::new();
    let mut prev_idx: Option<usize> = None;

    for t in 0..seq_len {
        let offset = t * vocab_size;
        let mut best_idx = 0;
        let mut best_val = f32::NEG_INFINITY;
        for i in 0..vocab_size {
            let val = logits[offset + i];
            if val > best_val {
                best_val = val;
                best_idx = i;
            }
        }

        if best_idx != BLANK_INDEX && Some(best_idx) != prev_idx {
            match charset.get(best_idx - 1) {
                Some(entry) => text.push_str(entry),
                None => text.push('?'),
            }
        }

        prev_idx = Some(best_idx);
    }

    text
}
