use anyhow::{anyhow, Result};
use reqwest::header::HeaderMap;
use reqwest::{RequestBuilder, StatusCode};
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

pub(crate) const RATE_LIMIT_MAX_ATTEMPTS: usize = 3;
pub(crate) const RATE_LIMIT_BASE_DELAY: Duration = Duration::from_secs(1);
pub(crate) const RATE_LIMIT_MAX_DELAY: Duration = Duration::from_secs(8);

pub(crate) fn is_rate_limited(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
        return true;
    }
    if status.is_success() {
        return false;
    }
    let lower = body.to_lowercase();
    lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("too many requests")
        || lower.contains("quota")
        || lower.contains("overloaded")
}

pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("retry-after")?.to_str().ok()?.trim();
    value.parse::<u64>().ok().map(Duration::from_secs)
}

pub(crate) async fn wait_with_backoff(
    provider: &str,
    attempt: usize,
    delay: Duration,
    retry_after: Option<Duration>,
) -> Duration {
    let wait = match retry_after {
        Some(retry_after) if retry_after > delay => retry_after.min(RATE_LIMIT_MAX_DELAY),
        _ => delay,
    };
    warn!(
        "{} rate limited; retrying in {:.1}s (attempt {}/{})",
        provider,
        wait.as_secs_f32(),
        attempt,
        RATE_LIMIT_MAX_ATTEMPTS
    );
    sleep(wait).await;
    next_delay(delay)
}

pub(crate) fn next_delay(current: Duration) -> Duration {
    let next_secs = current
        .as_secs()
        .saturating_mul(2)
        .max(RATE_LIMIT_BASE_DELAY.as_secs());
    Duration::from_secs(next_secs).min(RATE_LIMIT_MAX_DELAY)
}

/// Sends the request built by `build` until it succeeds, fails with a
/// non-retryable status, or runs out of attempts. Returns the body of the
/// final successful response.
pub(crate) async fn send_with_backoff<F>(
    provider: &str,
    build: F,
    retryable: fn(StatusCode, &str) -> bool,
) -> Result<String>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0usize;
    let mut delay = RATE_LIMIT_BASE_DELAY;
    loop {
        attempt += 1;
        let response = build().send().await?;
        let status = response.status();
        let retry_after = retry_after(response.headers());
        let text = response.text().await.unwrap_or_default();
        if retryable(status, &text) && attempt < RATE_LIMIT_MAX_ATTEMPTS {
            delay = wait_with_backoff(provider, attempt, delay, retry_after).await;
            continue;
        }
        if status.is_success() {
            return Ok(text);
        }
        return Err(anyhow!("{} API error ({}): {}", provider, status, text.trim()));
    }
}
