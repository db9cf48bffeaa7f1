use anyhow::{Context, Result, anyhow};
use std::path::Path;
use tracing::{error, info};

pub mod credentials;
pub mod data;
pub mod error;
pub mod export;
pub mod logging;
pub mod pipeline;
pub mod providers;
pub mod server;
pub mod settings;
#[cfg(test)]
mod test_util;

pub use error::PipelineError;
pub use export::TextExport;
pub use pipeline::{Interaction, Pipeline, Presented};
pub use providers::{ServiceClients, TextDetector, TextTranslator, init_clients};

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub data: Option<String>,
    pub out: Option<String>,
    pub lang: Option<String>,
    pub secrets_path: Option<String>,
    pub settings_path: Option<String>,
    pub addr: Option<String>,
}

/// Loads the service-account key and builds the external clients once.
pub fn bootstrap(
    settings: &settings::Settings,
    secrets_path: Option<&str>,
) -> Result<ServiceClients, PipelineError> {
    let path = secrets_path.unwrap_or(&settings.secrets_path);
    let key = credentials::load_service_account(Path::new(path), &settings.secrets_key)?;
    init_clients(&key, settings)
}

fn load_settings(config: &Config) -> Result<settings::Settings> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;
    if let Some(lang) = config.lang.as_deref() {
        let lang = lang.trim();
        if lang.is_empty() {
            return Err(anyhow!("target language is empty"));
        }
        settings.target_lang = lang.to_string();
    }
    Ok(settings)
}

/// One-shot translation of `config.data`. Returns the translated text, or an
/// empty string when the image holds no text.
pub async fn run(config: Config) -> Result<String> {
    let settings = load_settings(&config)?;
    let data_path = config
        .data
        .as_deref()
        .ok_or_else(|| anyhow!("--data is required"))?;

    let clients = bootstrap(&settings, config.secrets_path.as_deref())
        .with_context(|| "failed to initialize Google Cloud clients")?;
    let pipeline = Pipeline::from_clients(clients, settings.target_lang.clone());

    let upload = data::load_attachment(Path::new(data_path))?;
    match pipeline.process(upload).await {
        Interaction::Presented(presented) => {
            if let Some(out) = config.out.as_deref() {
                let export = TextExport::new(&presented.translated, &settings.output_file_name);
                let path = export.write_to(Path::new(out))?;
                info!("wrote {}", path.display());
            }
            Ok(presented.translated)
        }
        Interaction::Warned { message, .. } => {
            eprintln!("warning: {}", message);
            Ok(String::new())
        }
        Interaction::ErrorDisplayed { error, .. } => {
            let message = error.user_message();
            Err(anyhow::Error::new(error).context(message))
        }
        Interaction::Idle => Err(anyhow!("image was not processed")),
    }
}

/// Serves the upload page. A failed bootstrap keeps the server up in the
/// halted state so the error is visible instead of a dead port.
pub async fn serve(config: Config) -> Result<()> {
    let settings = load_settings(&config)?;
    let backend = match bootstrap(&settings, config.secrets_path.as_deref()) {
        Ok(clients) => server::Backend::Ready(Pipeline::from_clients(
            clients,
            settings.target_lang.clone(),
        )),
        Err(err) => {
            error!("bootstrap failed: {}", err);
            server::Backend::Halted(err)
        }
    };
    let addr = config
        .addr
        .clone()
        .unwrap_or_else(|| settings.server_addr.clone());
    server::run_server(server::ServerState::new(settings, backend), addr).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_fails_without_secret() {
        let dir = tempfile::tempdir().unwrap();
        let secrets = dir.path().join("secrets.toml");
        std::fs::write(&secrets, "[other]\nvalue = 1\n").unwrap();
        let settings = settings::Settings::default();
        let err = match bootstrap(&settings, secrets.to_str()) {
            Ok(_) => panic!("expected bootstrap failure"),
            Err(err) => err,
        };
        assert!(matches!(err, PipelineError::Credential(_)));
        assert!(
            err.user_message()
                .starts_with("Failed to initialize Google Cloud clients")
        );
    }

    #[test]
    fn empty_language_override_is_rejected() {
        let config = Config {
            lang: Some("  ".to_string()),
            ..Config::default()
        };
        assert!(load_settings(&config).is_err());
    }

    #[tokio::test]
    async fn run_requires_data() {
        let err = run(Config::default()).await.unwrap_err();
        assert!(err.to_string().contains("--data"));
    }
}
