// HTTP surface: route definitions and request handlers
//
// Both OCR endpoints converge on process_bytes, which runs the CPU-bound
// pipeline on the blocking pool. Handlers reject requests with 503 until the
// startup task has populated both model cells.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::core::types::{AppState, Base64OcrRequest, OcrResponse};
use crate::pipeline::{run_ocr, PipelineOptions};
use crate::services::{DetectText, RecognizeText};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/stats", get(stats_endpoint))
        .route("/ocr", post(ocr_upload))
        .route("/ocr/base64", post(ocr_base64))
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "Vietnamese OCR API",
        "status": "running",
        "endpoints": {
            "/ocr": "POST - Process an uploaded image and extract text",
            "/ocr/base64": "POST - Process a base64-encoded image",
            "/health": "GET - Check API health",
        }
    }))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "models_loaded": {
            "detector": state.detector.get().is_some(),
            "recognitor": state.recognizer.get().is_some(),
        }
    }))
}

/// Prometheus metrics endpoint
async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}

/// Detailed statistics endpoint (JSON)
async fn stats_endpoint(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    serde_json::to_value(state.metrics.snapshot())
        .map(Json)
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to serialize metrics: {}", e),
            )
        })
}

/// OCR endpoint for multipart file uploads
async fn ocr_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<OcrResponse>, (StatusCode, String)> {
    let (detector, recognizer) = loaded_models(&state)?;

    let mut file_bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let is_image = field
            .content_type()
            .map(|ct| ct.starts_with("image/"))
            .unwrap_or(false);
        if !is_image {
            warn!("Rejecting upload with content type {:?}", field.content_type());
            return Err((
                StatusCode::BAD_REQUEST,
                "File must be an image".to_string(),
            ));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("Read error: {}", e)))?;
        file_bytes = Some(data.to_vec());
    }

    let bytes = file_bytes.ok_or((
        StatusCode::BAD_REQUEST,
        "No file field in request".to_string(),
    ))?;

    process_bytes(&state, detector, recognizer, bytes)
        .await
        .map(Json)
}

/// OCR endpoint for base64-encoded images
async fn ocr_base64(
    State(state): State<AppState>,
    Json(request): Json<Base64OcrRequest>,
) -> Result<Json<OcrResponse>, (StatusCode, String)> {
    let (detector, recognizer) = loaded_models(&state)?;

    // Strip a data-URL header segment if present
    let payload = request.image_base64;
    let encoded = payload
        .split_once(',')
        .map(|(_, rest)| rest)
        .unwrap_or(payload.as_str());

    let bytes = BASE64.decode(encoded.trim()).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Invalid base64 image: {}", e),
        )
    })?;

    process_bytes(&state, detector, recognizer, bytes)
        .await
        .map(Json)
}

/// Readiness gate: both model handles must be populated.
fn loaded_models(
    state: &AppState,
) -> Result<(Arc<dyn DetectText>, Arc<dyn RecognizeText>), (StatusCode, String)> {
    match (state.detector.get(), state.recognizer.get()) {
        (Some(detector), Some(recognizer)) => Ok((detector.clone(), recognizer.clone())),
        _ => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "OCR models not initialized. Please wait for startup to complete.".to_string(),
        )),
    }
}

/// Run the pipeline on the blocking pool and map errors to HTTP statuses.
async fn process_bytes(
    state: &AppState,
    detector: Arc<dyn DetectText>,
    recognizer: Arc<dyn RecognizeText>,
    bytes: Vec<u8>,
) -> Result<OcrResponse, (StatusCode, String)> {
    let opts = PipelineOptions::from_config(&state.config);
    let start = Instant::now();

    let result = tokio::task::spawn_blocking(move || {
        run_ocr(detector.as_ref(), recognizer.as_ref(), &bytes, &opts)
    })
    .await
    .map_err(|e| {
        error!("Pipeline task panicked: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal processing failure".to_string(),
        )
    })?;

    match result {
        Ok(outcome) => {
            state.metrics.record_request(
                true,
                start.elapsed(),
                outcome.entries.len(),
                outcome.regions_skipped,
            );
            info!(
                "Processed image in {:.2}ms: {} regions ({} skipped)",
                start.elapsed().as_secs_f64() * 1000.0,
                outcome.entries.len(),
                outcome.regions_skipped
            );
            Ok(OcrResponse::from(outcome))
        }
        Err(e) if e.is_client_error() => {
            state.metrics.record_request(false, start.elapsed(), 0, 0);
            Err((StatusCode::BAD_REQUEST, e.to_string()))
        }
        Err(e) => {
            state.metrics.record_request(false, start.elapsed(), 0, 0);
            error!("OCR pipeline failed: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error processing image: {}", e),
            ))
        }
    }
}
