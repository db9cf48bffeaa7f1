use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::debug;

use crate::credentials::ServiceAccountKey;
use crate::error::PipelineError;

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Exchanges a signed service-account assertion for OAuth2 access tokens and
/// caches the token until shortly before it expires.
pub struct Authorizer {
    http: reqwest::Client,
    client_email: String,
    key_id: Option<String>,
    signing_key: EncodingKey,
    token_uri: String,
    scope: String,
    cached: Mutex<Option<CachedToken>>,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TokenError {
    error: Option<String>,
    error_description: Option<String>,
}

impl Authorizer {
    pub fn new(
        key: &ServiceAccountKey,
        scope: &str,
        http: reqwest::Client,
    ) -> Result<Self, PipelineError> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|err| {
            PipelineError::Credential(format!("invalid service account private key: {}", err))
        })?;
        Ok(Self {
            http,
            client_email: key.client_email.clone(),
            key_id: key.private_key_id.clone(),
            signing_key,
            token_uri: key.token_uri().to_string(),
            scope: scope.to_string(),
            cached: Mutex::new(None),
        })
    }

    pub async fn access_token(&self) -> Result<String, PipelineError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.refresh_at
        {
            return Ok(token.value.clone());
        }
        let assertion = self.assertion(OffsetDateTime::now_utc().unix_timestamp())?;
        let fetched = self.exchange(&assertion).await?;
        *cached = refresh_deadline(Instant::now(), fetched.expires_in).map(|refresh_at| {
            CachedToken {
                value: fetched.access_token.clone(),
                refresh_at,
            }
        });
        debug!("fetched access token for {}", self.client_email);
        Ok(fetched.access_token)
    }

    /// Drops the cached token so the next call signs a fresh assertion.
    pub async fn invalidate(&self) {
        self.cached.lock().await.take();
    }

    fn assertion(&self, now: i64) -> Result<String, PipelineError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key_id.clone();
        let claims = Claims {
            iss: &self.client_email,
            scope: &self.scope,
            aud: &self.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        jsonwebtoken::encode(&header, &claims, &self.signing_key)
            .map_err(|err| PipelineError::Credential(format!("failed to sign assertion: {}", err)))
    }

    async fn exchange(&self, assertion: &str) -> Result<TokenResponse, PipelineError> {
        let response = self
            .http
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion)])
            .send()
            .await
            .map_err(|err| PipelineError::ServiceUnavailable {
                service: "oauth",
                message: err.to_string(),
            })?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if status.is_success() {
            return serde_json::from_str(&text).map_err(|err| {
                PipelineError::Credential(format!("failed to parse token response: {}", err))
            });
        }
        let message = describe_token_error(&text).unwrap_or_else(|| status.to_string());
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(PipelineError::ServiceUnavailable {
                service: "oauth",
                message,
            });
        }
        Err(PipelineError::Credential(format!(
            "token exchange rejected: {}",
            message
        )))
    }
}

/// When a token issued at `now` should be replaced. `None` leaves the token
/// uncached, e.g. for a lifetime past what `Instant` can represent.
fn refresh_deadline(now: Instant, expires_in: Option<u64>) -> Option<Instant> {
    let lifetime = Duration::from_secs(expires_in.unwrap_or(3600));
    now.checked_add(lifetime.saturating_sub(REFRESH_MARGIN))
}

fn describe_token_error(body: &str) -> Option<String> {
    let parsed: TokenError = serde_json::from_str(body).ok()?;
    match (parsed.error, parsed.error_description) {
        (Some(error), Some(description)) => Some(format!("{}: {}", error, description)),
        (Some(error), None) => Some(error),
        (None, Some(description)) => Some(description),
        (None, None) => None,
    }
}
