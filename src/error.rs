use axum::http::StatusCode;
use thiserror::Error;

/// Failures of one upload-to-presentation interaction.
///
/// Each variant carries its own user-facing message, HTTP status and retry
/// policy so the UI never has to collapse them into a generic banner.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("credential error: {0}")]
    Credential(String),

    #[error("unsupported image type: {0}")]
    UnsupportedImage(String),

    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("{service} unavailable: {message}")]
    ServiceUnavailable {
        service: &'static str,
        message: String,
    },

    #[error("no text detected in the image")]
    NoTextDetected,

    #[error("translation failed: {0}")]
    TranslationFailed(String),

    #[error("{service} rejected the request: {message}")]
    Service {
        service: &'static str,
        message: String,
    },
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Credential(_) => "credential",
            PipelineError::UnsupportedImage(_) => "unsupported_image",
            PipelineError::Decode(_) => "decode",
            PipelineError::ServiceUnavailable { .. } => "service_unavailable",
            PipelineError::NoTextDetected => "no_text_detected",
            PipelineError::TranslationFailed(_) => "translation_failed",
            PipelineError::Service { .. } => "service",
        }
    }

    /// Only transient upstream failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::ServiceUnavailable { .. })
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PipelineError::Credential(_) => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::UnsupportedImage(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            PipelineError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::NoTextDetected => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::TranslationFailed(_) => StatusCode::BAD_GATEWAY,
            PipelineError::Service { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Credential(detail) => {
                format!("Failed to initialize Google Cloud clients: {}", detail)
            }
            PipelineError::UnsupportedImage(mime) => format!(
                "Unsupported file type ({}). Upload a JPG, JPEG or PNG image.",
                mime
            ),
            PipelineError::Decode(_) => {
                "The uploaded file could not be read as an image.".to_string()
            }
            PipelineError::ServiceUnavailable { service, .. } => format!(
                "The {} service is temporarily unavailable. Please try again in a moment.",
                service
            ),
            PipelineError::NoTextDetected => "No text detected in the image.".to_string(),
            PipelineError::TranslationFailed(detail) => format!("Translation failed: {}", detail),
            PipelineError::Service { message, .. } => {
                format!("Error processing image: {}", message)
            }
        }
    }
}
