use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub(crate) enum ApiResponse {
    Translated {
        original: String,
        translated: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        detected_source_language: Option<String>,
        file_name: String,
    },
    NoText {
        message: String,
    },
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
    pub(crate) kind: String,
    pub(crate) retryable: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) status: &'static str,
}
