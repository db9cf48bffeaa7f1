use axum::extract::Multipart;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;

use crate::data::{self, DataAttachment};
use crate::error::PipelineError;
use crate::pipeline::{Interaction, Pipeline};

const IMAGE_FIELD: &str = "image";

/// Problems with the HTTP request itself, before the pipeline runs.
#[derive(Debug)]
pub(crate) struct ServerError {
    pub(crate) status: StatusCode,
    pub(crate) message: String,
}

impl ServerError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    /// Keeps the status axum assigns, e.g. 413 past the body limit.
    fn multipart(context: &str, err: MultipartError) -> Self {
        Self {
            status: err.status(),
            message: format!("{}: {}", context, err.body_text()),
        }
    }
}

pub(crate) enum Upload {
    Accepted(DataAttachment),
    Rejected(PipelineError),
}

/// Reads the `image` field; other fields are ignored.
pub(crate) async fn read_upload(mut multipart: Multipart) -> Result<Upload, ServerError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ServerError::multipart("invalid upload", err))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let name = field.file_name().map(|value| value.to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|err| ServerError::multipart("failed to read upload", err))?;
        return Ok(match data::load_attachment_from_bytes(bytes.to_vec(), name.as_deref()) {
            Ok(attachment) => Upload::Accepted(attachment),
            Err(err) => Upload::Rejected(err),
        });
    }
    Err(ServerError::bad_request("no image uploaded"))
}

pub(crate) async fn process_upload(pipeline: &Pipeline, upload: Upload) -> Interaction {
    match upload {
        Upload::Accepted(attachment) => pipeline.process(attachment).await,
        Upload::Rejected(error) => Interaction::ErrorDisplayed {
            preview: None,
            error,
        },
    }
}

pub(crate) fn interaction_status(interaction: &Interaction) -> StatusCode {
    match interaction {
        Interaction::ErrorDisplayed { error, .. } => error.status(),
        _ => StatusCode::OK,
    }
}
