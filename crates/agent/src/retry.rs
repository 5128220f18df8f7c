//! Retry driver for tool-side API calls. Classification of what is worth
//! retrying lives in `mailey_core::retry`; this module adds the transport
//! error downcast and the backoff loop.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use mailey_core::retry::{is_retryable_message, is_retryable_status};

/// Backoff never sleeps longer than this, whatever the attempt count.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Classifies an `anyhow` error chain. Transport timeouts and connect
/// failures are retryable regardless of wording; HTTP errors defer to the
/// status classification; anything else falls back to message matching
/// over the whole chain.
pub fn is_retryable_error(error: &anyhow::Error) -> bool {
    if let Some(transport) = error.downcast_ref::<reqwest::Error>() {
        if transport.is_timeout() || transport.is_connect() {
            return true;
        }
        if let Some(status) = transport.status() {
            return is_retryable_status(status.as_u16());
        }
    }
    is_retryable_message(&format!("{error:#}"))
}

/// Sleep before retry `retries + 1`, doubling from `base_delay` and capped
/// at [`MAX_BACKOFF`].
pub fn backoff_delay(base_delay: Duration, retries: u32) -> Duration {
    base_delay
        .saturating_mul(2u32.saturating_pow(retries.min(16)))
        .min(MAX_BACKOFF)
}

/// Runs `operation` until it succeeds, fails permanently, or exhausts
/// `max_attempts` calls. Non-retryable errors and the final attempt's error
/// propagate unchanged.
pub async fn with_retry<T, F, Fut>(
    mut operation: F,
    max_attempts: u32,
    base_delay: Duration,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut retries = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if retries + 1 >= max_attempts || !is_retryable_error(&error) {
                    return Err(error);
                }
                let delay = backoff_delay(base_delay, retries);
                tracing::warn!(
                    event_name = "retry.backoff",
                    attempt = retries + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
                retries += 1;
            }
        }
    }
}
