// Main entry point for the Vietnamese OCR service

use viet_ocr_api::{
    api,
    core::{types::AppState, Config},
    services::{DetectText, DetectionService, RecognitionService, RecognizeText},
};

use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Arc::new(Config::new()?);

    // Initialize logging
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new(format!(
        "viet_ocr_api={},ort=off",
        match config.log_level() {
            tracing::Level::TRACE => "trace",
            tracing::Level::DEBUG => "debug",
            tracing::Level::INFO => "info",
            tracing::Level::WARN => "warn",
            tracing::Level::ERROR => "error",
        }
    ));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("=== VIETNAMESE OCR API ===");
    info!(
        "Config: padding={} reverse={} threshold={:.2}",
        config.box_padding(),
        config.reverse_detection_order(),
        config.confidence_threshold()
    );

    let state = AppState::new(config.clone());

    // Load both models off the accept path; requests arriving before this
    // completes are answered with 503.
    spawn_model_init(state.clone(), config.clone());

    // Setup CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = api::router(state)
        .layer(DefaultBodyLimit::max(50 * 1024 * 1024)) // 50MB uploads
        .layer(cors);

    let addr = format!("{}:{}", config.server_host(), config.server_port());
    info!("{}", "=".repeat(60));
    info!("Server starting on http://{}", addr);
    info!("Endpoints:");
    info!("  GET  /            - Service metadata");
    info!("  GET  /health      - Health check");
    info!("  GET  /metrics     - Prometheus metrics");
    info!("  GET  /stats       - Detailed statistics");
    info!("  POST /ocr         - Process image (multipart/form-data)");
    info!("  POST /ocr/base64  - Process base64-encoded image");
    info!("{}", "=".repeat(60));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Populate the model cells from a blocking task. Load order follows the
/// reference deployment: recognition first, then detection. On failure the
/// service stays up but not ready, so callers keep seeing 503 instead of a
/// dead port.
fn spawn_model_init(state: AppState, config: Arc<Config>) {
    tokio::task::spawn_blocking(move || {
        info!("Initializing OCR models...");

        match RecognitionService::new(&config) {
            Ok(service) => {
                let _ = state
                    .recognizer
                    .set(Arc::new(service) as Arc<dyn RecognizeText>);
                info!("Recognition model loaded successfully");
            }
            Err(e) => {
                error!("Failed to load recognition model: {:#}", e);
                return;
            }
        }

        match DetectionService::new(&config) {
            Ok(service) => {
                let _ = state.detector.set(Arc::new(service) as Arc<dyn DetectText>);
                info!("Detection model loaded successfully");
            }
            Err(e) => {
                error!("Failed to load detection model: {:#}", e);
                return;
            }
        }

        info!("All models initialized successfully!");
    });
}
