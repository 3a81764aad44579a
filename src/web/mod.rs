pub mod extractors;
pub mod handlers;
pub mod middleware;

use crate::{
    analysis::{ResultCache, ScanPipeline},
    models::InferenceContext,
    utils::error::ScanError,
    Config, Result,
};
use axum::{
    extract::{DefaultBodyLimit, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer};

/// Shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub pipeline: ScanPipeline,
    pub cache: Arc<ResultCache>,
}

impl AppState {
    pub fn new(config: Config, context: Arc<InferenceContext>) -> Self {
        let pipeline = ScanPipeline::new(context, config.pipeline_config.clone());
        let cache = Arc::new(ResultCache::from_config(&config.cache_config));
        Self { config, pipeline, cache }
    }
}

pub async fn serve(config: Config) -> Result<()> {
    let model_config = config.clone();
    let context = tokio::task::spawn_blocking(move || InferenceContext::load(&model_config))
        .await
        .map_err(|e| ScanError::Internal(format!("Model loading task failed: {}", e)))??;

    let state = AppState::new(config.clone(), Arc::new(context));
    let app = create_app(state);

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .map_err(|e| ScanError::Config(format!("Invalid bind address {}: {}", config.bind_addr, e)))?;

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  POST /analyze        - JSON base64 upload");
    tracing::info!("  POST /analyze/upload - Multipart file upload");
    tracing::info!("  POST /analyze/batch  - Multipart study upload (up to {} files)", config.server_config.max_batch_files);
    tracing::info!("  GET  /health         - Health check");
    tracing::info!("  GET  /api/info       - Service information");

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ScanError::Internal(format!("Failed to bind to address {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| ScanError::Internal(format!("Server failed to start: {}", e)))?;

    Ok(())
}

pub fn create_app(state: AppState) -> Router {
    let max_request_size = state.config.server_config.max_request_size;
    let request_timeout = Duration::from_secs(state.config.server_config.request_timeout);

    Router::new()
        .route("/analyze", post(handlers::analyze_json_handler))
        .route("/analyze/upload", post(handlers::analyze_upload_handler))
        .route("/analyze/batch", post(handlers::analyze_batch_handler))
        .route("/health", get(health_handler))
        .route("/api/info", get(info_handler))
        .layer(axum::middleware::from_fn(middleware::request_logging))
        .layer(DefaultBodyLimit::max(max_request_size))
        .layer(RequestBodyLimitLayer::new(max_request_size))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "detector": state.pipeline.context().detector().model_name(),
        "cached_records": state.cache.len(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn info_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let stats = state.pipeline.context().stats(&state.config);

    Json(json!({
        "service": "Fetal Scan Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "models": stats,
        "planes": ["Sagittal", "Axial"],
        "limits": {
            "max_request_size": state.config.server_config.max_request_size,
            "max_batch_files": state.config.server_config.max_batch_files
        },
        "cache": {
            "ttl_secs": state.config.cache_config.ttl_secs,
            "max_entries": state.config.cache_config.max_entries
        }
    }))
}
