use anyhow::{Context, Result};
use serde::Serialize;
use tera::{Context as TeraContext, Tera};

use crate::data::{ACCEPTED_EXTENSIONS, ImagePreview};
use crate::export::TextExport;
use crate::pipeline::Interaction;
use crate::settings::Settings;

const PAGE_TEMPLATE: &str = include_str!("templates/page.html.tera");

#[derive(Debug, Default, Serialize)]
struct PageView {
    accept: String,
    halted: Option<String>,
    error: Option<String>,
    warning: Option<String>,
    preview: Option<PreviewView>,
    result: Option<ResultView>,
}

#[derive(Debug, Serialize)]
struct PreviewView {
    data_url: String,
    width: u32,
    height: u32,
}

#[derive(Debug, Serialize)]
struct ResultView {
    translated: String,
    detected_source_language: Option<String>,
    file_name: String,
    download_url: String,
}

impl From<&ImagePreview> for PreviewView {
    fn from(preview: &ImagePreview) -> Self {
        Self {
            data_url: preview.data_url.clone(),
            width: preview.width,
            height: preview.height,
        }
    }
}

pub(crate) fn render_interaction(interaction: &Interaction, settings: &Settings) -> Result<String> {
    let mut view = PageView {
        accept: accept_attribute(),
        ..PageView::default()
    };
    match interaction {
        Interaction::Idle => {}
        Interaction::Presented(presented) => {
            let export = TextExport::new(&presented.translated, &settings.output_file_name);
            view.preview = Some(PreviewView::from(&presented.preview));
            view.result = Some(ResultView {
                translated: presented.translated.clone(),
                detected_source_language: presented.detected_source_language.clone(),
                file_name: export.file_name.clone(),
                download_url: export.data_url(),
            });
        }
        Interaction::Warned { preview, message } => {
            view.preview = Some(PreviewView::from(preview));
            view.warning = Some(message.clone());
        }
        Interaction::ErrorDisplayed { preview, error } => {
            view.preview = preview.as_ref().map(PreviewView::from);
            view.error = Some(error.user_message());
        }
    }
    render(&view)
}

pub(crate) fn render_halted(message: &str) -> Result<String> {
    render(&PageView {
        accept: accept_attribute(),
        halted: Some(message.to_string()),
        ..PageView::default()
    })
}

pub(crate) fn render_request_error(message: &str) -> Result<String> {
    render(&PageView {
        accept: accept_attribute(),
        error: Some(message.to_string()),
        ..PageView::default()
    })
}

fn render(view: &PageView) -> Result<String> {
    let context =
        TeraContext::from_serialize(view).with_context(|| "failed to build page context")?;
    Tera::one_off(PAGE_TEMPLATE, &context, true).with_context(|| "failed to render page template")
}

fn accept_attribute() -> String {
    ACCEPTED_EXTENSIONS
        .iter()
        .map(|ext| format!(".{}", ext))
        .collect::<Vec<_>>()
        .join(",")
}
