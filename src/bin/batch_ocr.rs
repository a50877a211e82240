//! Batch OCR client - send every image in a directory to the API and save a
//! CSV plus a mirrored JSON summary.
//! Run with: cargo run --release --bin batch_ocr -- <input_dir> [output_csv] [api_url]

use anyhow::{bail, Context, Result};
use chrono::Local;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use viet_ocr_api::core::types::OcrResponse;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif"];

#[derive(Debug, Serialize)]
struct BatchRecord {
    filename: String,
    path: String,
    text_regions: usize,
    text: String,
    status: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: batch_ocr <input_dir> [output_csv] [api_url]");
        std::process::exit(1);
    }

    let input_dir = PathBuf::from(&args[1]);
    let output_csv = args.get(2).map(PathBuf::from).unwrap_or_else(|| {
        PathBuf::from(format!(
            "ocr_results_{}.csv",
            Local::now().format("%Y%m%d_%H%M%S")
        ))
    });
    let api_url = args
        .get(3)
        .cloned()
        .unwrap_or_else(|| "http://localhost:8000".to_string());

    if !input_dir.is_dir() {
        bail!("Directory not found: {}", input_dir.display());
    }

    let image_files = collect_images(&input_dir)?;
    if image_files.is_empty() {
        bail!("No image files found in: {}", input_dir.display());
    }

    println!("{}", "=".repeat(60));
    println!("Batch OCR Processing");
    println!("{}", "=".repeat(60));
    println!("Input directory: {}", input_dir.display());
    println!("Total images: {}", image_files.len());

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    // Refuse to start a long batch against a dead or unhealthy API
    let health = client
        .get(format!("{}/health", api_url))
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .with_context(|| format!("Cannot connect to API at {}", api_url))?;
    if !health.status().is_success() {
        bail!("API is not healthy: {}", health.status());
    }
    println!("API is ready");
    println!("{}", "-".repeat(60));

    let mut records = Vec::with_capacity(image_files.len());
    let mut successful = 0usize;
    let mut failed = 0usize;

    for (i, path) in image_files.iter().enumerate() {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        print!("[{}/{}] {} ... ", i + 1, image_files.len(), filename);

        match process_one(&client, &api_url, path).await {
            Ok(response) => {
                let text = response
                    .results
                    .iter()
                    .map(|r| r.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                println!("ok ({} regions)", response.total_boxes);
                records.push(BatchRecord {
                    filename,
                    path: path.display().to_string(),
                    text_regions: response.total_boxes,
                    text,
                    status: "success".to_string(),
                });
                successful += 1;
            }
            Err(e) => {
                println!("error: {}", e);
                records.push(BatchRecord {
                    filename,
                    path: path.display().to_string(),
                    text_regions: 0,
                    text: String::new(),
                    status: format!("error: {}", e),
                });
                failed += 1;
            }
        }
    }

    println!("{}", "-".repeat(60));
    println!("Saving results to: {}", output_csv.display());

    let mut writer = csv::Writer::from_path(&output_csv)
        .with_context(|| format!("Failed to create {}", output_csv.display()))?;
    for record in &records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    let json_path = output_csv.with_extension("json");
    let json_file = std::fs::File::create(&json_path)
        .with_context(|| format!("Failed to create {}", json_path.display()))?;
    serde_json::to_writer_pretty(json_file, &records)?;

    println!("JSON summary: {}", json_path.display());
    println!("{}", "=".repeat(60));
    println!(
        "Done: {} successful, {} failed out of {}",
        successful,
        failed,
        image_files.len()
    );

    Ok(())
}

/// Files with a recognized image extension, sorted for stable output order.
fn collect_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

async fn process_one(
    client: &reqwest::Client,
    api_url: &str,
    path: &Path,
) -> Result<OcrResponse> {
    let bytes = std::fs::read(path)?;
    let mime = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| mime_for(&ext.to_lowercase()))
        .unwrap_or("application/octet-stream");

    let part = reqwest::multipart::Part::bytes(bytes)
        .file_name(
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_string()),
        )
        .mime_str(mime)?;
    let form = reqwest::multipart::Form::new().part("file", part);

    let response = client
        .post(format!("{}/ocr", api_url))
        .multipart(form)
        .send()
        .await?;

    if !response.status().is_success() {
        bail!("HTTP {}", response.status());
    }

    Ok(response.json::<OcrResponse>().await?)
}

fn mime_for(ext: &str) -> &'static str {
    match ext {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "bmp" => "image/bmp",
        "tiff" | "tif" => "image/tiff",
        _ => "application/octet-stream",
    }
}
