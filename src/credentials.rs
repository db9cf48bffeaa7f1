use serde::Deserialize;
use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::error::PipelineError;

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Service-account key as found in the secret store.
///
/// Held in memory only and handed to the clients explicitly; it is never
/// written to disk or exported through the environment.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type", default)]
    pub key_type: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub private_key: String,
    #[serde(default)]
    pub client_email: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("key_type", &self.key_type)
            .field("project_id", &self.project_id)
            .field("private_key_id", &self.private_key_id)
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    pub fn token_uri(&self) -> &str {
        self.token_uri
            .as_deref()
            .map(str::trim)
            .filter(|uri| !uri.is_empty())
            .unwrap_or(DEFAULT_TOKEN_URI)
    }

    fn validate(self) -> Result<Self, PipelineError> {
        if let Some(kind) = self.key_type.as_deref()
            && kind != "service_account"
        {
            return Err(PipelineError::Credential(format!(
                "expected a service_account key, found '{}'",
                kind
            )));
        }
        if self.client_email.trim().is_empty() {
            return Err(PipelineError::Credential(
                "service account key is missing client_email".to_string(),
            ));
        }
        if self.private_key.trim().is_empty() {
            return Err(PipelineError::Credential(
                "service account key is missing private_key".to_string(),
            ));
        }
        Ok(self)
    }
}

/// Reads the key stored under `key_name` from a TOML secrets file.
pub fn load_service_account(
    path: &Path,
    key_name: &str,
) -> Result<ServiceAccountKey, PipelineError> {
    let content = std::fs::read_to_string(path).map_err(|err| {
        PipelineError::Credential(format!(
            "failed to read secrets file {}: {}",
            path.display(),
            err
        ))
    })?;
    let key = parse_service_account(&content, key_name)?;
    debug!(
        "loaded service account {} from {}",
        key.client_email,
        path.display()
    );
    Ok(key)
}

pub fn parse_service_account(
    content: &str,
    key_name: &str,
) -> Result<ServiceAccountKey, PipelineError> {
    let table: toml::Table = toml::from_str(content)
        .map_err(|err| PipelineError::Credential(format!("failed to parse secrets: {}", err)))?;
    let value = table.get(key_name).cloned().ok_or_else(|| {
        PipelineError::Credential(format!("secret '{}' not found in secret store", key_name))
    })?;
    let key: ServiceAccountKey = value.try_into().map_err(|err| {
        PipelineError::Credential(format!("secret '{}' is malformed: {}", key_name, err))
    })?;
    key.validate()
}
