use crate::analysis::PipelineStage;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    /// Raw backend failure, before it is attributed to a pipeline stage
    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Model inference failed during {stage} for '{image}': {message}")]
    ModelInference {
        stage: PipelineStage,
        image: String,
        message: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown plane class id {0}")]
    UnknownPlane(u32),

    #[error("File too large: {0} bytes, max allowed: {1} bytes")]
    FileTooLarge(usize, usize),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ScanError {
    /// Attach the failing stage and image name to an error raised by model code.
    ///
    /// Input errors and plane-mapping violations keep their own variant; anything
    /// else becomes `ModelInference`.
    pub fn in_stage(self, stage: PipelineStage, image: &str) -> Self {
        match self {
            ScanError::InvalidInput(_)
            | ScanError::UnknownPlane(_)
            | ScanError::ModelInference { .. } => self,
            other => ScanError::ModelInference {
                stage,
                image: image.to_string(),
                message: other.to_string(),
            },
        }
    }

    /// Name the image an input error came from
    pub fn for_image(self, image: &str) -> Self {
        match self {
            ScanError::InvalidInput(message) => ScanError::InvalidInput(format!("{}: {}", image, message)),
            other => other,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ScanError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ScanError::FileTooLarge(_, _) => StatusCode::PAYLOAD_TOO_LARGE,
            ScanError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ScanError::Base64(_) => StatusCode::BAD_REQUEST,
            ScanError::Json(_) => StatusCode::BAD_REQUEST,
            ScanError::ModelLoad(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ScanError::ModelLoad(_) => "MODEL_LOAD_ERROR",
            ScanError::ImageProcessing(_) => "IMAGE_PROCESSING_ERROR",
            ScanError::Inference(_) => "INFERENCE_ERROR",
            ScanError::ModelInference { .. } => "MODEL_INFERENCE_ERROR",
            ScanError::InvalidInput(_) => "INVALID_INPUT",
            ScanError::UnknownPlane(_) => "UNKNOWN_PLANE",
            ScanError::FileTooLarge(_, _) => "FILE_TOO_LARGE",
            ScanError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            ScanError::Config(_) => "CONFIG_ERROR",
            ScanError::Io(_) => "IO_ERROR",
            ScanError::Json(_) => "JSON_ERROR",
            ScanError::Base64(_) => "BASE64_DECODE_ERROR",
            ScanError::Ort(_) => "ORT_ERROR",
            ScanError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ScanError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_response = serde_json::json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
            }
        });

        tracing::error!("Request failed: {} ({})", self, status);

        (status, axum::Json(error_response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_stage_wraps_backend_failures() {
        let err = ScanError::Inference("shape mismatch".to_string())
            .in_stage(PipelineStage::Classified, "scan.png");

        match &err {
            ScanError::ModelInference { stage, image, message } => {
                assert_eq!(*stage, PipelineStage::Classified);
                assert_eq!(image, "scan.png");
                assert!(message.contains("shape mismatch"));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
        assert_eq!(err.error_code(), "MODEL_INFERENCE_ERROR");
        assert!(err.to_string().contains("scan.png"));
    }

    #[test]
    fn in_stage_keeps_invariant_violations() {
        let err = ScanError::UnknownPlane(7).in_stage(PipelineStage::Routed, "a.png");
        assert!(matches!(err, ScanError::UnknownPlane(7)));

        let err = ScanError::InvalidInput("empty".into()).in_stage(PipelineStage::Received, "a.png");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn for_image_names_input_errors_only() {
        let err = ScanError::InvalidInput("empty crop".into()).for_image("scan.png");
        assert_eq!(err.to_string(), "Invalid input: scan.png: empty crop");

        let err = ScanError::UnsupportedFormat("Gif".into()).for_image("scan.png");
        assert!(!err.to_string().contains("scan.png"));
    }
}
