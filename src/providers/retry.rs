use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use crate::settings::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_retries: settings.retry_max_retries,
            base_delay: Duration::from_millis(settings.retry_base_delay_ms),
            max_delay: Duration::from_millis(settings.retry_max_delay_ms),
        }
    }
}

// google.rpc canonical codes that clear up on their own.
const TRANSIENT_GOOGLE_STATUSES: &[&str] =
    &["RESOURCE_EXHAUSTED", "UNAVAILABLE", "DEADLINE_EXCEEDED"];

/// Whether a failed response is worth another attempt. `google_status` is the
/// parsed `error.status` of the body, if any.
pub(crate) fn is_transient(status: StatusCode, google_status: Option<&str>) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return true;
    }
    google_status.is_some_and(|value| TRANSIENT_GOOGLE_STATUSES.contains(&value))
}

pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("retry-after")?.to_str().ok()?.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    None
}

pub(crate) async fn wait_with_backoff(
    service: &str,
    attempt: usize,
    delay: Duration,
    retry_after: Option<Duration>,
    policy: &RetryPolicy,
) -> Duration {
    let wait = backoff_wait(delay, retry_after, policy);
    warn!(
        "{} unavailable; retrying in {:.1}s (attempt {}/{})",
        service,
        wait.as_secs_f32(),
        attempt,
        policy.max_retries
    );
    sleep(wait).await;
    next_delay(delay, policy)
}

/// The current backoff delay, stretched to a longer `Retry-After` up to the
/// configured maximum.
pub(crate) fn backoff_wait(
    delay: Duration,
    retry_after: Option<Duration>,
    policy: &RetryPolicy,
) -> Duration {
    match retry_after {
        Some(retry_after) if retry_after > delay => retry_after.min(policy.max_delay),
        _ => delay,
    }
}

pub(crate) fn next_delay(current: Duration, policy: &RetryPolicy) -> Duration {
    let next = current.saturating_mul(2).max(policy.base_delay);
    if next > policy.max_delay {
        policy.max_delay
    } else {
        next
    }
}
