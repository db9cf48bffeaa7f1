use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{GoogleHttp, TextTranslator, TranslateFuture, Translation};
use crate::error::PipelineError;

const SERVICE: &str = "translation";

/// Google Cloud Translation v2 (`language/translate/v2`) client.
#[derive(Clone)]
pub struct TranslateClient {
    google: GoogleHttp,
    endpoint: String,
}

impl TranslateClient {
    pub(crate) fn new(google: GoogleHttp, endpoint: String) -> Self {
        Self { google, endpoint }
    }
}

impl TextTranslator for TranslateClient {
    fn translate<'a>(&'a self, text: &'a str, target: &'a str) -> TranslateFuture<'a> {
        Box::pin(async move {
            // No "source": the service detects the input language itself.
            let body = json!({
                "q": [text],
                "target": target,
                "format": "text"
            });
            let response = self
                .google
                .post_json(SERVICE, &self.endpoint, &body, PipelineError::TranslationFailed)
                .await?;
            let translation = parse_translate_response(&response)?;
            debug!(
                "translated {} chars from {}",
                text.chars().count(),
                translation
                    .detected_source_language
                    .as_deref()
                    .unwrap_or("unknown")
            );
            Ok(translation)
        })
    }
}

pub(crate) fn parse_translate_response(text: &str) -> Result<Translation, PipelineError> {
    let payload: TranslateResponse = serde_json::from_str(text).map_err(|err| {
        PipelineError::TranslationFailed(format!("failed to parse translate response: {}", err))
    })?;
    let first = payload
        .data
        .translations
        .into_iter()
        .next()
        .ok_or_else(|| PipelineError::TranslationFailed("no translation returned".to_string()))?;
    Ok(Translation {
        translated_text: first.translated_text,
        detected_source_language: first.detected_source_language,
    })
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    data: TranslateData,
}

#[derive(Debug, Deserialize)]
struct TranslateData {
    #[serde(default)]
    translations: Vec<TranslationEntry>,
}

#[derive(Debug, Deserialize)]
struct TranslationEntry {
    #[serde(rename = "translatedText")]
    translated_text: String,
    #[serde(rename = "detectedSourceLanguage")]
    detected_source_language: Option<String>,
}
