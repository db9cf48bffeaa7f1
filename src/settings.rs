use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_addr: String,
    pub max_upload_bytes: usize,
    pub target_lang: String,
    pub output_file_name: String,
    pub vision_endpoint: String,
    pub translate_endpoint: String,
    pub oauth_scope: String,
    pub request_timeout_secs: u64,
    pub retry_max_retries: usize,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub secrets_path: String,
    pub secrets_key: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8501".to_string(),
            max_upload_bytes: 20 * 1024 * 1024,
            target_lang: "en".to_string(),
            output_file_name: "translated_text.txt".to_string(),
            vision_endpoint: "https://vision.googleapis.com/v1/images:annotate".to_string(),
            translate_endpoint: "https://translation.googleapis.com/language/translate/v2"
                .to_string(),
            oauth_scope: "https://www.googleapis.com/auth/cloud-platform".to_string(),
            request_timeout_secs: 60,
            retry_max_retries: 3,
            retry_base_delay_ms: 2000,
            retry_max_delay_ms: 60_000,
            secrets_path: "secrets.toml".to_string(),
            secrets_key: "gcp_service_account".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    server: Option<ServerSettings>,
    translation: Option<TranslationSettings>,
    output: Option<OutputSettings>,
    google: Option<GoogleSettings>,
    retry: Option<RetrySettings>,
    secrets: Option<SecretsSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSettings {
    addr: Option<String>,
    max_upload_bytes: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslationSettings {
    target_lang: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OutputSettings {
    file_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GoogleSettings {
    vision_endpoint: Option<String>,
    translate_endpoint: Option<String>,
    scope: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RetrySettings {
    max_retries: Option<usize>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SecretsSettings {
    path: Option<String>,
    key: Option<String>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    let defaults: SettingsFile =
        toml::from_str(DEFAULT_SETTINGS_TOML).with_context(|| "failed to parse default settings")?;
    settings.merge(defaults);

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            settings.merge_file(&path)?;
        }
    }

    Ok(settings)
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn merge_file(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings: {}", path.display()))?;
        let parsed: SettingsFile = toml::from_str(&content)
            .with_context(|| format!("failed to parse settings: {}", path.display()))?;
        self.merge(parsed);
        Ok(())
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(server) = incoming.server {
            merge_string(&mut self.server_addr, server.addr);
            if let Some(limit) = server.max_upload_bytes
                && limit > 0
            {
                self.max_upload_bytes = limit;
            }
        }
        if let Some(translation) = incoming.translation {
            merge_string(&mut self.target_lang, translation.target_lang);
        }
        if let Some(output) = incoming.output {
            merge_string(&mut self.output_file_name, output.file_name);
        }
        if let Some(google) = incoming.google {
            merge_string(&mut self.vision_endpoint, google.vision_endpoint);
            merge_string(&mut self.translate_endpoint, google.translate_endpoint);
            merge_string(&mut self.oauth_scope, google.scope);
            if let Some(secs) = google.timeout_secs
                && secs > 0
            {
                self.request_timeout_secs = secs;
            }
        }
        if let Some(retry) = incoming.retry {
            if let Some(max) = retry.max_retries {
                self.retry_max_retries = max;
            }
            if let Some(delay) = retry.base_delay_ms
                && delay > 0
            {
                self.retry_base_delay_ms = delay;
            }
            if let Some(delay) = retry.max_delay_ms
                && delay > 0
            {
                self.retry_max_delay_ms = delay;
            }
        }
        if let Some(secrets) = incoming.secrets {
            merge_string(&mut self.secrets_path, secrets.path);
            merge_string(&mut self.secrets_key, secrets.key);
        }
    }
}

fn merge_string(target: &mut String, incoming: Option<String>) {
    if let Some(value) = incoming
        && !value.trim().is_empty()
    {
        *target = value.trim().to_string();
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".ocr-translator-rust"))
        }
    })
}
