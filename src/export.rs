use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::path::{Path, PathBuf};

use crate::data::TEXT_MIME;

/// The translated text packaged as the downloadable plain-text file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextExport {
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl TextExport {
    pub fn new(text: &str, file_name: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
            mime: TEXT_MIME,
            bytes: text.as_bytes().to_vec(),
        }
    }

    /// `data:` URL used as the download link target; carries the bytes
    /// unchanged, unlike a form round trip that rewrites line breaks.
    pub fn data_url(&self) -> String {
        format!(
            "data:{};charset=utf-8;base64,{}",
            self.mime,
            BASE64.encode(&self.bytes)
        )
    }

    /// Writes the file, overwriting any previous export. A directory target
    /// receives the export under its fixed file name.
    pub fn write_to(&self, target: &Path) -> Result<PathBuf> {
        let path = if target.is_dir() {
            target.join(&self.file_name)
        } else {
            target.to_path_buf()
        };
        std::fs::write(&path, &self.bytes)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}
