//! Quick API test - health check plus both upload modes against one image.
//! Run with: cargo run --release --bin test_api -- <image_path> [api_url]

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::path::Path;

use viet_ocr_api::core::types::OcrResponse;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: test_api <image_path> [api_url]");
        std::process::exit(1);
    }

    let image_path = Path::new(&args[1]);
    let api_url = args
        .get(2)
        .cloned()
        .unwrap_or_else(|| "http://localhost:8000".to_string());

    if !image_path.exists() {
        bail!("Image file not found: {}", image_path.display());
    }

    let client = reqwest::Client::new();

    println!("{}", "=".repeat(60));
    println!("Testing Vietnamese OCR API at {}", api_url);
    println!("{}", "=".repeat(60));

    // 1. Health
    println!("\n1. Health check...");
    let health: serde_json::Value = client
        .get(format!("{}/health", api_url))
        .send()
        .await
        .with_context(|| format!("Cannot connect to API at {}", api_url))?
        .json()
        .await?;
    println!("   status: {}", health["status"]);
    println!("   models_loaded: {}", health["models_loaded"]);

    // 2. Multipart upload
    println!("\n2. File upload: {}", image_path.display());
    let bytes = std::fs::read(image_path)?;
    let part = reqwest::multipart::Part::bytes(bytes.clone())
        .file_name(
            image_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_string()),
        )
        .mime_str("image/png")?;
    let form = reqwest::multipart::Form::new().part("file", part);

    let response = client
        .post(format!("{}/ocr", api_url))
        .multipart(form)
        .send()
        .await?;
    if !response.status().is_success() {
        bail!("Upload request failed: HTTP {}", response.status());
    }
    let result: OcrResponse = response.json().await?;
    print_results(&result);

    // 3. Base64 mode
    println!("\n3. Base64 upload...");
    let body = serde_json::json!({ "image_base64": BASE64.encode(&bytes) });
    let response = client
        .post(format!("{}/ocr/base64", api_url))
        .json(&body)
        .send()
        .await?;
    if !response.status().is_success() {
        bail!("Base64 request failed: HTTP {}", response.status());
    }
    let result: OcrResponse = response.json().await?;
    let all_text: Vec<&str> = result.results.iter().map(|r| r.text.as_str()).collect();
    println!("   {} regions: {}", result.total_boxes, all_text.join(" "));

    println!("\nAll checks passed.");
    Ok(())
}

fn print_results(result: &OcrResponse) {
    println!("   {}", result.message);
    for (i, item) in result.results.iter().enumerate() {
        println!("   {}. {}", i + 1, item.text);
        println!("      coordinates: {:?}", item.coordinates);
    }
}
