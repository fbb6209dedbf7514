//! HTTP send loop shared by the backend adapters

use std::time::Duration;

use reqwest::{RequestBuilder, Response};
use tracing::{debug, warn};

use super::LlmError;

/// Attempts after the first one
const MAX_RETRIES: u32 = 3;

/// Delay before the first retry; doubles on every further attempt
const BASE_DELAY: Duration = Duration::from_secs(1);

/// Longest `retry-after` honored before giving up on a rate limit
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

fn backoff(attempt: u32) -> Duration {
    BASE_DELAY * 2u32.pow(attempt.saturating_sub(1))
}

/// Map a non-success response to an error
async fn failure(response: Response) -> LlmError {
    let status = response.status().as_u16();
    if status == 429 {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(BASE_DELAY);
        return LlmError::RateLimited { retry_after };
    }
    let message = response.text().await.unwrap_or_default();
    LlmError::ApiError { status, message }
}

/// Send a request, retrying transient failures
///
/// `build` runs once per attempt since sending consumes the builder. Rate
/// limits wait for `retry-after` when it is short enough, other transient
/// failures back off exponentially.
pub(crate) async fn send_with_retry<F>(build: F) -> Result<Response, LlmError>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0;
    loop {
        let error = match build().send().await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => failure(response).await,
            Err(e) => LlmError::Network(e),
        };

        if attempt >= MAX_RETRIES || !error.is_retryable() {
            debug!(attempt, %error, "send_with_retry: giving up");
            return Err(error);
        }
        attempt += 1;

        let delay = match error {
            LlmError::RateLimited { retry_after } if retry_after <= MAX_RETRY_AFTER => retry_after,
            LlmError::RateLimited { .. } => return Err(error),
            _ => backoff(attempt),
        };
        warn!(attempt, delay_ms = delay.as_millis() as u64, %error, "Retrying backend request");
        tokio::time::sleep(delay).await;
    }
}
