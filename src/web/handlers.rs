use crate::{
    analysis::{ProcessedImageRecord, ResultCache, ScanPipeline, ScanStatus},
    image::ImageLoader,
    utils::error::ScanError,
    web::{
        extractors::{validate_image_name, RequestId, ValidatedJson},
        AppState,
    },
    Result,
};
use axum::{
    extract::{multipart::Field, Multipart, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

const DEFAULT_IMAGE_NAME: &str = "image";

/// JSON request body (base64 mode)
#[derive(Debug, Deserialize)]
pub struct AnalyzeJsonRequest {
    /// Base64-encoded image, optionally as a data URL
    pub image: String,

    /// Name echoed back as `img_name`
    #[serde(default = "default_image_name")]
    pub name: String,

    /// Skip the result cache
    #[serde(default)]
    pub force: bool,
}

fn default_image_name() -> String {
    DEFAULT_IMAGE_NAME.to_string()
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub processing_time: f32,
    pub timestamp: String,
    pub request_id: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T, request_id: String, start_time: Instant) -> Self {
        Self {
            success: true,
            data,
            processing_time: start_time.elapsed().as_secs_f32(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            request_id,
        }
    }
}

pub async fn analyze_json_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    ValidatedJson(request): ValidatedJson<AnalyzeJsonRequest>,
) -> Result<Json<ApiResponse<Arc<ProcessedImageRecord>>>> {
    let start_time = Instant::now();

    tracing::info!(
        "Processing JSON analysis request: request_id={}, name={}, force={}",
        request_id,
        request.name,
        request.force
    );

    let bytes = ImageLoader::decode_base64(&request.image)?;
    let record = analyze_cached(&state, bytes, request.name, request.force, &request_id).await?;

    Ok(Json(ApiResponse::success(record, request_id, start_time)))
}

pub async fn analyze_upload_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<Arc<ProcessedImageRecord>>>> {
    let start_time = Instant::now();

    tracing::info!("Processing multipart analysis request: request_id={}", request_id);

    let mut upload: Option<(Vec<u8>, String)> = None;
    let mut name_override: Option<String> = None;
    let mut force = false;

    while let Some(field) = next_field(&mut multipart).await? {
        let field_name = field.name().unwrap_or("unknown").to_string();

        match field_name.as_str() {
            "file" => upload = Some(read_image_field(field).await?),
            "name" => {
                let value = field.text().await.unwrap_or_default();
                if !value.trim().is_empty() {
                    name_override = Some(value.trim().to_string());
                }
            }
            "force" => {
                let value = field.text().await.unwrap_or_default();
                force = value.parse().unwrap_or(false);
            }
            _ => {
                tracing::debug!("Ignoring unknown field: {}", field_name);
            }
        }
    }

    let (bytes, file_name) =
        upload.ok_or_else(|| ScanError::InvalidInput("No image file provided".to_string()))?;
    let name = name_override.unwrap_or(file_name);
    validate_image_name(&name).map_err(ScanError::InvalidInput)?;

    let record = analyze_cached(&state, bytes, name, force, &request_id).await?;

    Ok(Json(ApiResponse::success(record, request_id, start_time)))
}

/// One study: up to `max_batch_files` images, analyzed in order
pub async fn analyze_batch_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<Vec<ProcessedImageRecord>>>> {
    let start_time = Instant::now();
    let max_files = state.config.server_config.max_batch_files;

    tracing::info!("Processing batch analysis request: request_id={}", request_id);

    let mut files: Vec<(Vec<u8>, String)> = Vec::new();

    while let Some(field) = next_field(&mut multipart).await? {
        if field.name() != Some("files") {
            continue;
        }
        if files.len() == max_files {
            return Err(ScanError::InvalidInput(format!(
                "Too many files, at most {} per batch",
                max_files
            )));
        }

        let (bytes, name) = read_image_field(field).await?;
        validate_image_name(&name).map_err(ScanError::InvalidInput)?;
        files.push((bytes, name));
    }

    if files.is_empty() {
        return Err(ScanError::InvalidInput("No valid image files provided".to_string()));
    }

    let pipeline = state.pipeline.clone();
    let records = tokio::task::spawn_blocking(move || {
        pipeline.process_batch(files.iter().map(|(bytes, name)| (bytes.as_slice(), name.as_str())))
    })
    .await
    .map_err(|e| ScanError::Internal(format!("Analysis task failed: {}", e)))??;

    let detected = records.iter().filter(|r| r.analyzed().is_some()).count();
    tracing::info!(
        "Batch analysis completed: request_id={}, files={}, regions={}, time={:.3}s",
        request_id,
        records.len(),
        detected,
        start_time.elapsed().as_secs_f32()
    );

    Ok(Json(ApiResponse::success(records, request_id, start_time)))
}

/// Serve from the cache when possible, otherwise run the pipeline on a
/// blocking thread and remember the record.
async fn analyze_cached(
    state: &AppState,
    bytes: Vec<u8>,
    name: String,
    force: bool,
    request_id: &str,
) -> Result<Arc<ProcessedImageRecord>> {
    let key = ResultCache::key(&name, &bytes);
    if !force {
        if let Some(record) = state.cache.get(&key) {
            tracing::debug!("Cache hit for {} (request_id={})", name, request_id);
            return Ok(record);
        }
    }

    let pipeline = progress_pipeline(state, request_id);
    let record = tokio::task::spawn_blocking(move || pipeline.process(&bytes, &name))
        .await
        .map_err(|e| ScanError::Internal(format!("Analysis task failed: {}", e)))??;

    Ok(state.cache.insert(key, record))
}

/// In dev mode, stage progress is logged by a background task
fn progress_pipeline(state: &AppState, request_id: &str) -> ScanPipeline {
    if !state.config.dev_mode {
        return state.pipeline.clone();
    }

    let (status_tx, mut status_rx) = mpsc::unbounded_channel::<ScanStatus>();
    let request_id = request_id.to_string();
    tokio::spawn(async move {
        while let Some(status) = status_rx.recv().await {
            tracing::debug!(
                "Analysis progress [{}]: {} - {:.1}% - {}",
                request_id,
                status.stage,
                status.progress * 100.0,
                status.message
            );
        }
    });

    state.pipeline.clone().with_status(status_tx)
}

async fn next_field(multipart: &mut Multipart) -> Result<Option<Field<'_>>> {
    multipart
        .next_field()
        .await
        .map_err(|e| ScanError::InvalidInput(format!("Failed to read multipart field: {}", e)))
}

async fn read_image_field(field: Field<'_>) -> Result<(Vec<u8>, String)> {
    if let Some(content_type) = field.content_type() {
        if !content_type.starts_with("image/") && content_type != "application/octet-stream" {
            return Err(ScanError::UnsupportedFormat(content_type.to_string()));
        }
    }

    let name = field
        .file_name()
        .map(|n| n.to_string())
        .unwrap_or_else(default_image_name);

    let data = field
        .bytes()
        .await
        .map_err(|e| ScanError::InvalidInput(format!("Failed to read file data: {}", e)))?;

    if data.is_empty() {
        return Err(ScanError::InvalidInput(format!("Empty file: {}", name)));
    }

    tracing::debug!("Received file {}: {} bytes", name, data.len());
    Ok((data.to_vec(), name))
}
