use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::Mutex;

use crate::data::{DataAttachment, load_attachment_from_bytes};
use crate::error::PipelineError;
use crate::providers::{
    DetectFuture, TextAnnotation, TextDetector, TextTranslator, TranslateFuture, Translation,
};

fn sample_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        if (x + y) % 2 == 0 {
            Rgb([0, 0, 0])
        } else {
            Rgb([255, 255, 255])
        }
    })
}

pub(crate) fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    sample_image(width, height)
        .write_to(&mut buffer, ImageFormat::Png)
        .expect("encode png");
    buffer.into_inner()
}

pub(crate) fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    sample_image(width, height)
        .write_to(&mut buffer, ImageFormat::Jpeg)
        .expect("encode jpeg");
    buffer.into_inner()
}

pub(crate) fn png_upload(name: &str) -> DataAttachment {
    load_attachment_from_bytes(sample_png(12, 8), Some(name)).expect("png upload")
}

type ErrorFactory = Box<dyn Fn() -> PipelineError + Send + Sync>;

pub(crate) struct FakeDetector {
    result: Result<Vec<TextAnnotation>, ErrorFactory>,
    images: Mutex<Vec<Vec<u8>>>,
}

impl FakeDetector {
    pub(crate) fn returning(annotations: Vec<TextAnnotation>) -> Self {
        Self {
            result: Ok(annotations),
            images: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(error: impl Fn() -> PipelineError + Send + Sync + 'static) -> Self {
        Self {
            result: Err(Box::new(error)),
            images: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.images.lock().expect("detector lock").len()
    }

    pub(crate) fn last_image(&self) -> Option<Vec<u8>> {
        self.images.lock().expect("detector lock").last().cloned()
    }
}

impl TextDetector for FakeDetector {
    fn detect_text<'a>(&'a self, png: &'a [u8]) -> DetectFuture<'a> {
        self.images
            .lock()
            .expect("detector lock")
            .push(png.to_vec());
        let result = match &self.result {
            Ok(annotations) => Ok(annotations.clone()),
            Err(factory) => Err(factory()),
        };
        Box::pin(async move { result })
    }
}

pub(crate) struct FakeTranslator {
    result: Result<String, ErrorFactory>,
    seen: Mutex<Vec<(String, String)>>,
}

impl FakeTranslator {
    pub(crate) fn returning(text: &str) -> Self {
        Self {
            result: Ok(text.to_string()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(error: impl Fn() -> PipelineError + Send + Sync + 'static) -> Self {
        Self {
            result: Err(Box::new(error)),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> Vec<(String, String)> {
        self.seen.lock().expect("translator lock").clone()
    }
}

impl TextTranslator for FakeTranslator {
    fn translate<'a>(&'a self, text: &'a str, target: &'a str) -> TranslateFuture<'a> {
        self.seen
            .lock()
            .expect("translator lock")
            .push((text.to_string(), target.to_string()));
        let result = match &self.result {
            Ok(translated) => Ok(Translation {
                translated_text: translated.clone(),
                detected_source_language: Some("bn".to_string()),
            }),
            Err(factory) => Err(factory()),
        };
        Box::pin(async move { result })
    }
}
