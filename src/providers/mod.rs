use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::credentials::ServiceAccountKey;
use crate::error::PipelineError;
use crate::settings::Settings;

mod auth;
mod retry;
mod translate;
mod vision;

pub use auth::Authorizer;
pub use retry::RetryPolicy;
pub use translate::TranslateClient;
pub use vision::VisionClient;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vertex {
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
}

/// One text block reported by the OCR service. The first annotation of a
/// response covers the whole image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextAnnotation {
    pub description: String,
    pub locale: Option<String>,
    pub bounding_poly: Vec<Vertex>,
}

impl TextAnnotation {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            locale: None,
            bounding_poly: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Translation {
    pub translated_text: String,
    pub detected_source_language: Option<String>,
}

pub type DetectFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<TextAnnotation>, PipelineError>> + Send + 'a>>;
pub type TranslateFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Translation, PipelineError>> + Send + 'a>>;

pub trait TextDetector: Send + Sync {
    /// Runs text detection on PNG-encoded image bytes.
    fn detect_text<'a>(&'a self, png: &'a [u8]) -> DetectFuture<'a>;
}

pub trait TextTranslator: Send + Sync {
    /// Translates `text` into `target`; the source language is auto-detected.
    fn translate<'a>(&'a self, text: &'a str, target: &'a str) -> TranslateFuture<'a>;
}

/// Handle to the two external clients, built once at startup.
#[derive(Clone)]
pub struct ServiceClients {
    pub detector: Arc<dyn TextDetector>,
    pub translator: Arc<dyn TextTranslator>,
}

pub fn init_clients(
    key: &ServiceAccountKey,
    settings: &Settings,
) -> Result<ServiceClients, PipelineError> {
    let http = reqwest::Client::builder()
        .timeout(settings.request_timeout())
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|err| PipelineError::Credential(format!("failed to build HTTP client: {}", err)))?;
    let authorizer = Arc::new(Authorizer::new(key, &settings.oauth_scope, http.clone())?);
    let google = GoogleHttp {
        http,
        authorizer,
        retry: RetryPolicy::from_settings(settings),
    };
    Ok(ServiceClients {
        detector: Arc::new(VisionClient::new(
            google.clone(),
            settings.vision_endpoint.clone(),
        )),
        translator: Arc::new(TranslateClient::new(
            google,
            settings.translate_endpoint.clone(),
        )),
    })
}

/// Authorized JSON transport shared by the Google clients.
#[derive(Clone)]
pub(crate) struct GoogleHttp {
    http: reqwest::Client,
    authorizer: Arc<Authorizer>,
    retry: RetryPolicy,
}

impl GoogleHttp {
    /// POSTs `body` and returns the raw success body. Transient failures are
    /// retried; a non-retryable rejection is turned into an error by `reject`.
    pub(crate) async fn post_json(
        &self,
        service: &'static str,
        url: &str,
        body: &Value,
        reject: impl Fn(String) -> PipelineError,
    ) -> Result<String, PipelineError> {
        let mut attempt = 0usize;
        let mut delay = self.retry.base_delay;
        loop {
            attempt += 1;
            let can_retry = attempt <= self.retry.max_retries;

            let token = match self.authorizer.access_token().await {
                Ok(token) => token,
                Err(err) if err.is_retryable() && can_retry => {
                    delay = retry::wait_with_backoff(service, attempt, delay, None, &self.retry)
                        .await;
                    continue;
                }
                Err(err) => return Err(err),
            };

            let sent = self
                .http
                .post(url)
                .bearer_auth(token)
                .json(body)
                .send()
                .await;
            let response = match sent {
                Ok(response) => response,
                Err(err) => {
                    let unavailable = PipelineError::ServiceUnavailable {
                        service,
                        message: err.to_string(),
                    };
                    if can_retry && (err.is_timeout() || err.is_connect()) {
                        delay = retry::wait_with_backoff(service, attempt, delay, None, &self.retry)
                            .await;
                        continue;
                    }
                    return Err(unavailable);
                }
            };

            let status = response.status();
            let retry_after = retry::retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            if status.is_success() {
                return Ok(text);
            }
            let message = extract_google_error(&text).unwrap_or_else(|| status.to_string());
            let google_status = google_error_status(&text);
            if retry::is_transient(status, google_status.as_deref()) {
                if can_retry {
                    delay =
                        retry::wait_with_backoff(service, attempt, delay, retry_after, &self.retry)
                            .await;
                    continue;
                }
                return Err(PipelineError::ServiceUnavailable { service, message });
            }
            if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                self.authorizer.invalidate().await;
                return Err(PipelineError::Credential(format!(
                    "{} refused the credentials ({}): {}",
                    service, status, message
                )));
            }
            return Err(reject(format!("{} ({})", message, status)));
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<GoogleError>,
}

#[derive(Deserialize)]
struct GoogleError {
    message: Option<String>,
    status: Option<String>,
}

fn parse_google_error(body: &str) -> Option<GoogleError> {
    serde_json::from_str::<ErrorBody>(body).ok()?.error
}

/// Pulls `error.message` (and `error.status`) out of a Google API error body.
pub(crate) fn extract_google_error(body: &str) -> Option<String> {
    let error = parse_google_error(body)?;
    let message = error.message.filter(|value| !value.trim().is_empty())?;
    match error.status.filter(|value| !value.trim().is_empty()) {
        Some(status) => Some(format!("{} | status: {}", message, status)),
        None => Some(message),
    }
}

/// The canonical `error.status` code, e.g. `PERMISSION_DENIED`.
pub(crate) fn google_error_status(body: &str) -> Option<String> {
    parse_google_error(body)?
        .status
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
