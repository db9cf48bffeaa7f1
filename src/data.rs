use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;

use crate::error::PipelineError;

pub const PNG_MIME: &str = "image/png";
pub const JPEG_MIME: &str = "image/jpeg";
pub const TEXT_MIME: &str = "text/plain";

/// Extensions offered by the upload control.
pub const ACCEPTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

#[derive(Debug, Clone)]
pub struct DataAttachment {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub name: Option<String>,
}

/// An upload decoded to a bitmap and re-encoded as PNG for the OCR call.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ImagePreview {
    pub data_url: String,
    pub width: u32,
    pub height: u32,
}

pub fn load_attachment(path: &Path) -> Result<DataAttachment, PipelineError> {
    let bytes = std::fs::read(path).map_err(|err| {
        PipelineError::Decode(format!("failed to read {}: {}", path.display(), err))
    })?;
    let name = path
        .file_name()
        .and_then(|value| value.to_str())
        .map(|value| value.to_string());
    load_attachment_from_bytes(bytes, name.as_deref())
}

pub fn load_attachment_from_bytes(
    bytes: Vec<u8>,
    name: Option<&str>,
) -> Result<DataAttachment, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::Decode("upload is empty".to_string()));
    }
    let mime = resolve_image_mime(&bytes, name)?;
    Ok(DataAttachment {
        bytes,
        mime,
        name: name.map(|value| value.to_string()),
    })
}

fn resolve_image_mime(bytes: &[u8], name: Option<&str>) -> Result<String, PipelineError> {
    if let Some(kind) = infer::get(bytes) {
        let detected = kind.mime_type();
        return match detected {
            PNG_MIME | JPEG_MIME => Ok(detected.to_string()),
            other => Err(PipelineError::UnsupportedImage(other.to_string())),
        };
    }

    let ext = name
        .and_then(|value| Path::new(value).extension())
        .and_then(|value| value.to_str())
        .map(|value| value.to_lowercase());
    match ext.as_deref().and_then(mime_from_extension) {
        Some(mime) => Ok(mime.to_string()),
        None => Err(PipelineError::UnsupportedImage(
            ext.map(|value| format!(".{}", value))
                .unwrap_or_else(|| "unknown".to_string()),
        )),
    }
}

fn mime_from_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "png" => Some(PNG_MIME),
        "jpg" | "jpeg" => Some(JPEG_MIME),
        _ => None,
    }
}

pub fn decode_image(attachment: &DataAttachment) -> Result<DecodedImage, PipelineError> {
    let format = ImageFormat::from_mime_type(&attachment.mime)
        .ok_or_else(|| PipelineError::UnsupportedImage(attachment.mime.clone()))?;
    let image = image::load_from_memory_with_format(&attachment.bytes, format)
        .map_err(|err| PipelineError::Decode(err.to_string()))?;
    let png = encode_png(&image)?;
    Ok(DecodedImage {
        width: image.width(),
        height: image.height(),
        png,
    })
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, PipelineError> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|err| PipelineError::Decode(format!("failed to re-encode as PNG: {}", err)))?;
    Ok(buffer.into_inner())
}

impl DecodedImage {
    pub fn preview(&self) -> ImagePreview {
        ImagePreview {
            data_url: format!("data:{};base64,{}", PNG_MIME, BASE64.encode(&self.png)),
            width: self.width,
            height: self.height,
        }
    }
}
