use std::sync::Arc;
use tracing::{info, warn};

use crate::data::{self, DataAttachment, DecodedImage, ImagePreview};
use crate::error::PipelineError;
use crate::providers::{ServiceClients, TextDetector, TextTranslator, Translation};

/// Terminal state of one upload interaction.
///
/// `Idle` is the page before any upload; the other variants are reached from
/// `ImageUploaded -> ImageDisplayed` and end the interaction.
#[derive(Debug)]
pub enum Interaction {
    Idle,
    Presented(Presented),
    Warned {
        preview: ImagePreview,
        message: String,
    },
    ErrorDisplayed {
        preview: Option<ImagePreview>,
        error: PipelineError,
    },
}

#[derive(Debug, Clone)]
pub struct Presented {
    pub preview: ImagePreview,
    pub original: String,
    pub translated: String,
    pub detected_source_language: Option<String>,
}

/// OCR followed by translation over explicitly injected clients.
#[derive(Clone)]
pub struct Pipeline {
    detector: Arc<dyn TextDetector>,
    translator: Arc<dyn TextTranslator>,
    target_lang: String,
}

impl Pipeline {
    pub fn new(
        detector: Arc<dyn TextDetector>,
        translator: Arc<dyn TextTranslator>,
        target_lang: impl Into<String>,
    ) -> Self {
        Self {
            detector,
            translator,
            target_lang: target_lang.into(),
        }
    }

    pub fn from_clients(clients: ServiceClients, target_lang: impl Into<String>) -> Self {
        Self::new(clients.detector, clients.translator, target_lang)
    }

    pub async fn process(&self, upload: DataAttachment) -> Interaction {
        info!(
            "image uploaded: {} ({} bytes)",
            upload.name.as_deref().unwrap_or("unnamed"),
            upload.bytes.len()
        );
        let decoded = match data::decode_image(&upload) {
            Ok(decoded) => decoded,
            Err(error) => {
                warn!("failed to ingest upload: {}", error);
                return Interaction::ErrorDisplayed {
                    preview: None,
                    error,
                };
            }
        };
        let preview = decoded.preview();
        info!("image displayed: {}x{}", decoded.width, decoded.height);

        match self.recognize_and_translate(&decoded).await {
            Ok((original, translation)) => Interaction::Presented(Presented {
                preview,
                original,
                translated: translation.translated_text,
                detected_source_language: translation.detected_source_language,
            }),
            Err(PipelineError::NoTextDetected) => Interaction::Warned {
                preview,
                message: PipelineError::NoTextDetected.user_message(),
            },
            Err(error) => {
                warn!("{} failure: {}", error.kind(), error);
                Interaction::ErrorDisplayed {
                    preview: Some(preview),
                    error,
                }
            }
        }
    }

    /// Returns the recognized whole-image text and its translation.
    pub async fn recognize_and_translate(
        &self,
        image: &DecodedImage,
    ) -> Result<(String, Translation), PipelineError> {
        let annotations = self.detector.detect_text(&image.png).await?;
        let Some(first) = annotations.into_iter().next() else {
            warn!("no text detected");
            return Err(PipelineError::NoTextDetected);
        };
        info!("text detected: {} chars", first.description.chars().count());
        let translation = self
            .translator
            .translate(&first.description, &self.target_lang)
            .await?;
        info!("translation finished");
        Ok((first.description, translation))
    }
}
